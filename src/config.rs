use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Application name used when none has been configured
pub const DEFAULT_APPLICATION_NAME: &str = "default-application";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeployerConfig {
    pub application: ApplicationConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub config_centers: Vec<ConfigCenterConfig>,
    #[serde(default)]
    pub metadata_reports: Vec<MetadataReportConfig>,
    #[serde(default)]
    pub registries: Vec<RegistryConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApplicationConfig {
    /// Application name, also the group of application specific remote configuration
    #[serde(default = "default_application_name")]
    pub name: String,

    /// Where service metadata is stored
    #[serde(default)]
    pub metadata_type: MetadataType,

    /// Register the instance even when no module talks to a registry
    #[serde(default)]
    pub register_consumer_instance: bool,

    /// Interval between instance refresh ticks in milliseconds
    #[serde(default = "default_metadata_publish_delay_ms")]
    pub metadata_publish_delay_ms: u64,

    /// Install the signal based shutdown hook during initialization
    #[serde(default = "default_register_shutdown_hook")]
    pub register_shutdown_hook: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetadataType {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetricsConfig {
    /// Export the metrics service once the first module has started
    #[serde(default = "default_export_metrics_service")]
    pub export_metrics_service: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default log level for the crate (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Optional directory for a daily rolling log file
    pub directory: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConfigCenterConfig {
    /// Config center address
    pub address: String,

    /// Group of the global configuration file
    #[serde(default = "default_config_group")]
    pub group: String,

    /// Key of the global configuration file
    #[serde(default = "default_config_file")]
    pub config_file: String,

    /// Key of the application specific configuration file, falls back to `config_file`
    pub app_config_file: Option<String>,

    /// Fail the bootstrap when the config center can not be reached
    #[serde(default = "default_config_center_check")]
    pub check: bool,
}

impl ConfigCenterConfig {
    pub fn new<S: Into<String>>(address: S) -> Self {
        Self {
            address: address.into(),
            group: default_config_group(),
            config_file: default_config_file(),
            app_config_file: None,
            check: default_config_center_check(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.address.trim().is_empty()
    }

    pub fn app_config_file(&self) -> &str {
        self.app_config_file
            .as_deref()
            .filter(|file| !file.is_empty())
            .unwrap_or(&self.config_file)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetadataReportConfig {
    /// Metadata center address
    pub address: String,

    /// Optional group the metadata is stored under
    pub group: Option<String>,
}

impl MetadataReportConfig {
    pub fn new<S: Into<String>>(address: S) -> Self {
        Self {
            address: address.into(),
            group: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.address.trim().is_empty()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Registry address
    pub address: String,

    /// Use this registry as config center when none is configured (unset means yes)
    pub use_as_config_center: Option<bool>,

    /// Use this registry as metadata center when none is configured (unset means yes)
    pub use_as_metadata_center: Option<bool>,
}

impl RegistryConfig {
    pub fn new<S: Into<String>>(address: S) -> Self {
        Self {
            address: address.into(),
            use_as_config_center: None,
            use_as_metadata_center: None,
        }
    }
}

impl DeployerConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("deployer.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("application.name", default_application_name())?
            .set_default("application.metadata_type", "local")?
            .set_default("application.register_consumer_instance", false)?
            .set_default(
                "application.metadata_publish_delay_ms",
                default_metadata_publish_delay_ms(),
            )?
            .set_default(
                "application.register_shutdown_hook",
                default_register_shutdown_hook(),
            )?
            .set_default(
                "metrics.export_metrics_service",
                default_export_metrics_service(),
            )?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", "pretty")?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with DEPLOYER__ prefix
            .add_source(Environment::with_prefix("DEPLOYER").separator("__"))
            .build()?;

        let config: DeployerConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application.name.trim().is_empty() {
            return Err(ConfigError::Message(
                "Application name must not be blank".to_string(),
            ));
        }

        if self.application.metadata_publish_delay_ms == 0 {
            return Err(ConfigError::Message(
                "Metadata publish delay must be greater than 0".to_string(),
            ));
        }

        if self.registries.iter().any(|r| r.address.trim().is_empty()) {
            return Err(ConfigError::Message(
                "Registry address must not be blank".to_string(),
            ));
        }

        if self.config_centers.iter().any(|c| !c.is_valid()) {
            return Err(ConfigError::Message(
                "Config center address must not be blank".to_string(),
            ));
        }

        Ok(())
    }

    pub fn metadata_publish_delay(&self) -> Duration {
        Duration::from_millis(self.application.metadata_publish_delay_ms)
    }

    /// Whether the application name was left at its default
    pub fn has_default_application_name(&self) -> bool {
        self.application.name == DEFAULT_APPLICATION_NAME
    }
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            application: ApplicationConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
            config_centers: Vec::new(),
            metadata_reports: Vec::new(),
            registries: Vec::new(),
        }
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_application_name(),
            metadata_type: MetadataType::Local,
            register_consumer_instance: false,
            metadata_publish_delay_ms: default_metadata_publish_delay_ms(),
            register_shutdown_hook: default_register_shutdown_hook(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            export_metrics_service: default_export_metrics_service(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Pretty,
            directory: None,
        }
    }
}

// Default value functions
fn default_application_name() -> String {
    DEFAULT_APPLICATION_NAME.to_string()
}
fn default_metadata_publish_delay_ms() -> u64 {
    1000
}
fn default_register_shutdown_hook() -> bool {
    true
}
fn default_export_metrics_service() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_config_group() -> String {
    "rpc".to_string()
}
fn default_config_file() -> String {
    "rpc.properties".to_string()
}
fn default_config_center_check() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DeployerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.has_default_application_name());
        assert_eq!(config.metadata_publish_delay(), Duration::from_millis(1000));
        assert_eq!(config.application.metadata_type, MetadataType::Local);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[application]
name = "orders"
metadata_type = "remote"
metadata_publish_delay_ms = 250

[logging]
format = "json"

[[registries]]
address = "zookeeper://127.0.0.1:2181"
use_as_config_center = false

[[metadata_reports]]
address = "redis://127.0.0.1:6379"
"#
        )
        .unwrap();

        let config = DeployerConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.application.name, "orders");
        assert_eq!(config.application.metadata_type, MetadataType::Remote);
        assert_eq!(config.application.metadata_publish_delay_ms, 250);
        assert!(config.application.register_shutdown_hook);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.registries.len(), 1);
        assert_eq!(config.registries[0].use_as_config_center, Some(false));
        assert_eq!(config.registries[0].use_as_metadata_center, None);
        assert_eq!(config.metadata_reports[0].address, "redis://127.0.0.1:6379");
        assert!(config.config_centers.is_empty());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = DeployerConfig::load_from_file("/nonexistent/deployer.toml").unwrap();
        assert_eq!(config.application.name, DEFAULT_APPLICATION_NAME);
        assert!(config.metrics.export_metrics_service);
    }

    #[test]
    fn test_config_validation() {
        let mut config = DeployerConfig::default();
        config.application.metadata_publish_delay_ms = 0;
        assert!(config.validate().is_err());

        config.application.metadata_publish_delay_ms = 1000;
        config.registries.push(RegistryConfig::new(" "));
        assert!(config.validate().is_err());

        config.registries[0].address = "nacos://127.0.0.1:8848".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_file_fallback() {
        let mut center = ConfigCenterConfig::new("nacos://127.0.0.1:8848");
        assert_eq!(center.app_config_file(), "rpc.properties");

        center.app_config_file = Some("orders.properties".to_string());
        assert_eq!(center.app_config_file(), "orders.properties");
    }
}
