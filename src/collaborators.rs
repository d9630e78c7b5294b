//! Narrow interfaces to the subsystems the deployer drives but does not implement.
//!
//! Every capability is optional. A missing collaborator means the corresponding
//! bootstrap or teardown step is skipped.

use crate::config::{ConfigCenterConfig, MetadataReportConfig};
use async_trait::async_trait;
use std::sync::Arc;

/// Loads the application's local configuration
pub trait ConfigLoader: Send + Sync {
    fn load_configs(&self) -> anyhow::Result<()>;
}

/// Client of remote config centers
pub trait RemoteConfigSource: Send + Sync {
    /// Fetch the `.properties` text stored under `key` and `group`
    fn fetch_remote_config(
        &self,
        center: &ConfigCenterConfig,
        key: &str,
        group: &str,
    ) -> anyhow::Result<Option<String>>;
}

/// Metadata center clients
pub trait MetadataReportFactory: Send + Sync {
    /// Initialize reports for the given configs, returning whether any became usable
    fn init(&self, configs: &[MetadataReportConfig]) -> anyhow::Result<bool>;

    /// Destroy every report created by this factory
    fn destroy(&self) -> anyhow::Result<()>;
}

/// A single registry connection
pub trait Registry: Send + Sync {
    fn unregister(&self, url: &str) -> anyhow::Result<()>;
}

/// Owner of all registry connections
pub trait RegistryManager: Send + Sync {
    fn registry(&self, registry_url: &str) -> Option<Arc<dyn Registry>>;

    fn destroy_all(&self) -> anyhow::Result<()>;
}

/// Publishes this process as a discoverable service instance
pub trait InstancePublisher: Send + Sync {
    fn register_instance(&self) -> anyhow::Result<()>;

    fn refresh_instance(&self) -> anyhow::Result<()>;

    fn unregister_instance(&self) -> anyhow::Result<()>;
}

/// Metrics reporters, collector and the exported metrics service
pub trait MetricsService: Send + Sync {
    fn init_reporter(&self) -> anyhow::Result<()>;

    fn export(&self) -> anyhow::Result<()>;

    fn unexport(&self) -> anyhow::Result<()>;

    /// Begin collecting default samples once the application is running
    fn start_collector(&self) {}
}

/// Tracing observation hook, installed while the application initializes
pub trait ObservationRegistry: Send + Sync {
    fn init(&self) -> anyhow::Result<()>;
}

/// Work to run while the application is torn down
#[async_trait]
pub trait ShutdownCallback: Send + Sync {
    fn name(&self) -> &str;

    async fn callback(&self) -> anyhow::Result<()>;
}

/// Optional collaborators of an application deployer
#[derive(Default, Clone)]
pub struct Collaborators {
    pub config_loader: Option<Arc<dyn ConfigLoader>>,
    pub remote_config: Option<Arc<dyn RemoteConfigSource>>,
    pub metadata_reports: Option<Arc<dyn MetadataReportFactory>>,
    pub registries: Option<Arc<dyn RegistryManager>>,
    pub instance_publisher: Option<Arc<dyn InstancePublisher>>,
    pub metrics: Option<Arc<dyn MetricsService>>,
    pub observation: Option<Arc<dyn ObservationRegistry>>,
    pub shutdown_callbacks: Vec<Arc<dyn ShutdownCallback>>,
}
