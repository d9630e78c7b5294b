//! Externally sourced configuration merged into the running process.

use crate::error::{DeployError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Layered properties fetched from config centers.
///
/// Application specific properties take precedence over global ones.
#[derive(Debug, Default)]
pub struct Environment {
    external: RwLock<HashMap<String, String>>,
    app_external: RwLock<HashMap<String, String>>,
    config_centers: RwLock<Vec<String>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_external_config_map(&self, properties: HashMap<String, String>) {
        self.external.write().extend(properties);
    }

    pub fn update_app_external_config_map(&self, properties: HashMap<String, String>) {
        self.app_external.write().extend(properties);
    }

    /// Record a config center the environment was populated from
    pub fn add_config_center(&self, address: &str) {
        self.config_centers.write().push(address.to_string());
    }

    pub fn config_centers(&self) -> Vec<String> {
        self.config_centers.read().clone()
    }

    pub fn get_property(&self, key: &str) -> Option<String> {
        if let Some(value) = self.app_external.read().get(key) {
            return Some(value.clone());
        }
        self.external.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        let app = self.app_external.read();
        let global = self.external.read();
        global.len() + app.keys().filter(|k| !global.contains_key(*k)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse a `.properties` document the way Java's `Properties::load` reads it.
///
/// Keys end at the first unescaped `=`, `:` or whitespace; a key on its own maps to an
/// empty value. Lines ending in an odd number of backslashes continue on the next line.
/// `#` and `!` start comments. Only a malformed `\uXXXX` escape is rejected.
pub fn parse_properties(content: &str) -> Result<HashMap<String, String>> {
    let mut properties = HashMap::new();

    for (number, line) in logical_lines(content) {
        let (key, value) = split_entry(&line);
        properties.insert(unescape(key, number)?, unescape(value, number)?);
    }

    Ok(properties)
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0c')
}

fn continues(buffer: &str) -> bool {
    buffer.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Join continued lines, dropping comments and blank lines.
/// Each entry carries the number of the line it started on.
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (index, raw) in content.lines().enumerate() {
        let text = raw.trim_start_matches(is_blank);
        let (number, mut buffer) = match current.take() {
            Some((number, mut buffer)) => {
                buffer.push_str(text);
                (number, buffer)
            }
            None if text.is_empty() || text.starts_with(['#', '!']) => continue,
            None => (index + 1, text.to_string()),
        };

        if continues(&buffer) {
            buffer.pop();
            current = Some((number, buffer));
        } else {
            lines.push((number, buffer));
        }
    }

    lines.extend(current);
    lines
}

/// Split a logical line into its raw key and value
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (index, c) in line.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' || is_blank(c) {
            key_end = index;
            break;
        }
    }

    let rest = line[key_end..].trim_start_matches(is_blank);
    let value = match rest.strip_prefix(['=', ':']) {
        Some(value) => value.trim_start_matches(is_blank),
        None => rest,
    };
    (&line[..key_end], value)
}

fn unescape(raw: &str, number: usize) -> Result<String> {
    let malformed = || {
        DeployError::bootstrap(
            "config-center",
            format!(
                "Failed to parse configurations, line {}: malformed \\uxxxx encoding",
                number
            ),
        )
    };

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let unit = read_code_unit(&mut chars).ok_or_else(malformed)?;
                let decoded = if (0xD800..0xDC00).contains(&unit) {
                    // high surrogate, the low half must follow as another escape
                    let low = match (chars.next(), chars.next()) {
                        (Some('\\'), Some('u')) => read_code_unit(&mut chars),
                        _ => None,
                    }
                    .ok_or_else(malformed)?;
                    char::decode_utf16([unit, low]).next().and_then(|r| r.ok())
                } else {
                    char::from_u32(u32::from(unit))
                };
                out.push(decoded.ok_or_else(malformed)?);
            }
            Some(other) => out.push(other),
            // a dangling backslash at the very end is dropped
            None => {}
        }
    }
    Ok(out)
}

fn read_code_unit(chars: &mut std::str::Chars<'_>) -> Option<u16> {
    let digits: String = chars.by_ref().take(4).collect();
    if digits.len() != 4 {
        return None;
    }
    u16::from_str_radix(&digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_properties() {
        let content = "# global settings\n\
                       rpc.timeout=3000\n\
                       ! legacy comment\n\
                       \n\
                       rpc.retries : 2\n\
                       rpc.url=http://host:8080/path\n";
        let properties = parse_properties(content).unwrap();

        assert_eq!(properties.len(), 3);
        assert_eq!(properties["rpc.timeout"], "3000");
        assert_eq!(properties["rpc.retries"], "2");
        assert_eq!(properties["rpc.url"], "http://host:8080/path");
    }

    #[test]
    fn test_parse_properties_separators() {
        let content = "rpc.timeout 3000\n\
                       rpc.flag\n\
                       rpc.name = = demo\n\
                       \t  rpc.host:localhost\n";
        let properties = parse_properties(content).unwrap();

        assert_eq!(properties["rpc.timeout"], "3000");
        assert_eq!(properties["rpc.flag"], "");
        assert_eq!(properties["rpc.name"], "= demo");
        assert_eq!(properties["rpc.host"], "localhost");
    }

    #[test]
    fn test_parse_properties_continuation() {
        let content = "rpc.list=a,\\\n    b,\\\n    c\n\
                       rpc.path=C:\\\\temp\\\\\n\
                       rpc.next=1\n";
        let properties = parse_properties(content).unwrap();

        assert_eq!(properties["rpc.list"], "a,b,c");
        // an even run of backslashes does not continue the line
        assert_eq!(properties["rpc.path"], "C:\\temp\\");
        assert_eq!(properties["rpc.next"], "1");
    }

    #[test]
    fn test_parse_properties_escapes() {
        let content = "rpc\\ key\\=x=tab\\there\n\
                       rpc.greeting=caf\\u00e9 \\ud83d\\ude00\n\
                       # rpc.commented=1\n";
        let properties = parse_properties(content).unwrap();

        assert_eq!(properties.len(), 2);
        assert_eq!(properties["rpc key=x"], "tab\there");
        assert_eq!(properties["rpc.greeting"], "caf\u{e9} \u{1f600}");
    }

    #[test]
    fn test_parse_properties_rejects_malformed_unicode() {
        let err = parse_properties("rpc.timeout=3000\nrpc.name=\\u12G4\n").unwrap_err();
        assert!(matches!(err, DeployError::Bootstrap { .. }));
        assert!(err.to_string().contains("line 2"));
        assert!(parse_properties("rpc.name=\\u12").is_err());
        assert!(parse_properties("rpc.name=\\ud83d").is_err());
    }

    #[test]
    fn test_app_properties_take_precedence() {
        let environment = Environment::new();
        environment.update_external_config_map(HashMap::from([
            ("rpc.timeout".to_string(), "3000".to_string()),
            ("rpc.retries".to_string(), "2".to_string()),
        ]));
        environment.update_app_external_config_map(HashMap::from([(
            "rpc.timeout".to_string(),
            "500".to_string(),
        )]));

        assert_eq!(environment.get_property("rpc.timeout").as_deref(), Some("500"));
        assert_eq!(environment.get_property("rpc.retries").as_deref(), Some("2"));
        assert_eq!(environment.get_property("missing"), None);
        assert_eq!(environment.len(), 2);
    }
}
