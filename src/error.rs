use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Illegal state: {message}")]
    IllegalState { message: String },

    #[error("Bootstrap error in {component}: {message}")]
    Bootstrap { component: String, message: String },

    #[error("Module {module} failed to start: {message}")]
    ModuleStart { module: String, message: String },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },

    #[error("System error: {message}")]
    System { message: String },
}

impl DeployError {
    pub fn illegal_state<S: Into<String>>(message: S) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    pub fn bootstrap<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Bootstrap {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn module_start<C: Into<String>, M: Into<String>>(module: C, message: M) -> Self {
        Self::ModuleStart {
            module: module.into(),
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Whether this error describes a refused lifecycle transition
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState { .. })
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
