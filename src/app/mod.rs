mod instance;
mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use orchestrator::{ApplicationDeployer, ApplicationDeployerBuilder, INTERNAL_MODULE_TIMEOUT};
pub use runtime::ShutdownHook;
pub use types::ShutdownReason;
