pub mod app;
pub mod collaborators;
pub mod config;
pub mod environment;
pub mod error;
pub mod executor;
pub mod future;
pub mod listener;
pub mod logging;
pub mod module;
pub mod once;
pub mod state;

pub use app::{ApplicationDeployer, ApplicationDeployerBuilder, ShutdownHook, ShutdownReason};
pub use collaborators::{
    Collaborators, ConfigLoader, InstancePublisher, MetadataReportFactory, MetricsService,
    ObservationRegistry, Registry, RegistryManager, RemoteConfigSource, ShutdownCallback,
};
pub use config::{DeployerConfig, LogFormat, LoggingConfig};
pub use environment::Environment;
pub use error::{DeployError, Result};
pub use executor::{ExecutorRepository, ScheduledTask};
pub use future::CompletionFuture;
pub use listener::{DeployListener, ListenerRegistry};
pub use logging::init_logging;
pub use module::{ExportedService, MockModuleDeployer, ModuleDeployer, RegisterStatedUrl};
pub use once::{OnceState, OneShot};
pub use state::{calculate_state, DeployState, StateTally};
