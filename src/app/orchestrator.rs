use super::runtime::ShutdownHook;
use crate::collaborators::{
    Collaborators, ConfigLoader, InstancePublisher, MetadataReportFactory, MetricsService,
    ObservationRegistry, RegistryManager, RemoteConfigSource, ShutdownCallback,
};
use crate::config::DeployerConfig;
use crate::environment::Environment;
use crate::error::{DeployError, Result};
use crate::executor::{ExecutorRepository, ScheduledTask};
use crate::future::CompletionFuture;
use crate::listener::{DeployListener, ListenerRegistry};
use crate::module::ModuleDeployer;
use crate::once::OneShot;
use crate::state::DeployState;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

/// Upper bound for waiting on the internal module during start
pub const INTERNAL_MODULE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle orchestrator of one application process.
///
/// Owns the application level [`DeployState`], the modules and the start/stop entry
/// points. Four locks protect disjoint concerns:
///
/// * `start_lock` serializes `initialize` and `start`
/// * `state_lock` serializes state recomputation and transition dispatch
/// * `destroy_lock` serializes `pre_destroy` and `post_destroy`
/// * `internal_module_lock` serializes the internal module bootstrap
pub struct ApplicationDeployer {
    pub(super) id: String,
    pub(super) config: DeployerConfig,
    pub(super) environment: Environment,
    pub(super) collaborators: Collaborators,
    pub(super) listeners: ListenerRegistry,
    pub(super) executors: ExecutorRepository,
    pub(super) shutdown_hook: ShutdownHook,
    pub(super) runtime: Handle,
    pub(super) self_ref: Weak<ApplicationDeployer>,

    // Lifecycle state
    pub(super) modules: RwLock<Vec<Arc<dyn ModuleDeployer>>>,
    pub(super) state: RwLock<DeployState>,
    pub(super) last_error: RwLock<Option<String>>,
    pub(super) start_future: RwLock<CompletionFuture>,

    // One-shot flags
    pub(super) initialized: OneShot,
    pub(super) internal_module_prepared: OneShot,
    pub(super) application_instance_prepared: OneShot,
    pub(super) registered: OneShot,
    pub(super) destroyed: AtomicBool,
    pub(super) starting_modules: AtomicBool,

    // Instance refresh
    pub(super) refresh_ticks: AtomicU64,
    pub(super) service_refresh_state: AtomicI64,
    pub(super) refresh_task: Mutex<Option<ScheduledTask>>,

    // Locks
    pub(super) start_lock: tokio::sync::Mutex<()>,
    pub(super) state_lock: ReentrantMutex<()>,
    pub(super) destroy_lock: tokio::sync::Mutex<()>,
    pub(super) internal_module_lock: tokio::sync::Mutex<()>,
}

impl ApplicationDeployer {
    pub fn builder() -> ApplicationDeployerBuilder {
        ApplicationDeployerBuilder::new()
    }

    /// Unique identifier used in every log line
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &DeployerConfig {
        &self.config
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn executors(&self) -> &ExecutorRepository {
        &self.executors
    }

    pub fn shutdown_hook(&self) -> &ShutdownHook {
        &self.shutdown_hook
    }

    pub fn state(&self) -> DeployState {
        *self.state.read()
    }

    pub(super) fn set_state(&self, state: DeployState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        debug!("{} state changed: {} -> {}", self.id, previous, state);
    }

    pub fn is_pending(&self) -> bool {
        self.state() == DeployState::Pending
    }

    pub fn is_starting(&self) -> bool {
        self.state() == DeployState::Starting
    }

    pub fn is_started(&self) -> bool {
        self.state() == DeployState::Started
    }

    pub fn is_completion(&self) -> bool {
        self.state() == DeployState::Completion
    }

    pub fn is_stopping(&self) -> bool {
        self.state() == DeployState::Stopping
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == DeployState::Stopped
    }

    pub fn is_failed(&self) -> bool {
        self.state() == DeployState::Failed
    }

    /// Error that drove the application to [`DeployState::Failed`]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Completion handle of the current cycle
    pub fn start_future(&self) -> CompletionFuture {
        self.start_future.read().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.is_done()
    }

    pub fn is_internal_module_prepared(&self) -> bool {
        self.internal_module_prepared.is_done()
    }

    /// Whether the service instance has been registered
    pub fn is_registered(&self) -> bool {
        self.registered.is_done()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Number of refresh ticks that got past the destroyed check
    pub fn refresh_ticks(&self) -> u64 {
        self.refresh_ticks.load(Ordering::Acquire)
    }

    pub fn add_listener(&self, listener: Arc<dyn DeployListener>) -> bool {
        self.listeners.add(listener)
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Add a module. Modules may be added while the application is starting or
    /// running; call [`start`](Self::start) again to start them.
    pub fn add_module(&self, module: Arc<dyn ModuleDeployer>) {
        debug!("{} adding module '{}'", self.id, module.name());
        self.modules.write().push(module);
    }

    pub fn modules(&self) -> Vec<Arc<dyn ModuleDeployer>> {
        self.modules.read().clone()
    }

    pub(super) fn module_at(&self, index: usize) -> Option<Arc<dyn ModuleDeployer>> {
        self.modules.read().get(index).cloned()
    }

    pub fn internal_module(&self) -> Option<Arc<dyn ModuleDeployer>> {
        self.modules
            .read()
            .iter()
            .find(|module| module.is_internal())
            .cloned()
    }

    pub fn has_pending_module(&self) -> bool {
        self.modules.read().iter().any(|module| module.is_pending())
    }
}

/// Builder for [`ApplicationDeployer`]
pub struct ApplicationDeployerBuilder {
    config: DeployerConfig,
    collaborators: Collaborators,
    modules: Vec<Arc<dyn ModuleDeployer>>,
    listeners: Vec<Arc<dyn DeployListener>>,
    runtime: Option<Handle>,
}

impl Default for ApplicationDeployerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationDeployerBuilder {
    pub fn new() -> Self {
        Self {
            config: DeployerConfig::default(),
            collaborators: Collaborators::default(),
            modules: Vec::new(),
            listeners: Vec::new(),
            runtime: None,
        }
    }

    pub fn with_config(mut self, config: DeployerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn with_config_loader(mut self, loader: Arc<dyn ConfigLoader>) -> Self {
        self.collaborators.config_loader = Some(loader);
        self
    }

    pub fn with_remote_config(mut self, source: Arc<dyn RemoteConfigSource>) -> Self {
        self.collaborators.remote_config = Some(source);
        self
    }

    pub fn with_metadata_reports(mut self, factory: Arc<dyn MetadataReportFactory>) -> Self {
        self.collaborators.metadata_reports = Some(factory);
        self
    }

    pub fn with_registries(mut self, registries: Arc<dyn RegistryManager>) -> Self {
        self.collaborators.registries = Some(registries);
        self
    }

    pub fn with_instance_publisher(mut self, publisher: Arc<dyn InstancePublisher>) -> Self {
        self.collaborators.instance_publisher = Some(publisher);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsService>) -> Self {
        self.collaborators.metrics = Some(metrics);
        self
    }

    pub fn with_observation(mut self, observation: Arc<dyn ObservationRegistry>) -> Self {
        self.collaborators.observation = Some(observation);
        self
    }

    pub fn with_shutdown_callback(mut self, callback: Arc<dyn ShutdownCallback>) -> Self {
        self.collaborators.shutdown_callbacks.push(callback);
        self
    }

    pub fn with_module(mut self, module: Arc<dyn ModuleDeployer>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn DeployListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Runtime for background work; defaults to the current tokio runtime
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<Arc<ApplicationDeployer>> {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| {
                DeployError::system(format!("No tokio runtime available: {}", e))
            })?,
        };

        let id = format!(
            "Application[{}.{}]",
            self.config.application.name,
            uuid::Uuid::new_v4().simple()
        );

        let listeners = ListenerRegistry::new();
        for listener in self.listeners {
            listeners.add(listener);
        }

        let deployer = Arc::new_cyclic(|self_ref: &Weak<ApplicationDeployer>| ApplicationDeployer {
            id,
            config: self.config,
            environment: Environment::new(),
            collaborators: self.collaborators,
            listeners,
            executors: ExecutorRepository::new(runtime.clone()),
            shutdown_hook: ShutdownHook::new(self_ref.clone(), runtime.clone()),
            runtime,
            self_ref: self_ref.clone(),
            modules: RwLock::new(self.modules),
            state: RwLock::new(DeployState::Pending),
            last_error: RwLock::new(None),
            start_future: RwLock::new(CompletionFuture::new()),
            initialized: OneShot::new(),
            internal_module_prepared: OneShot::new(),
            application_instance_prepared: OneShot::new(),
            registered: OneShot::new(),
            destroyed: AtomicBool::new(false),
            starting_modules: AtomicBool::new(false),
            refresh_ticks: AtomicU64::new(0),
            service_refresh_state: AtomicI64::new(0),
            refresh_task: Mutex::new(None),
            start_lock: tokio::sync::Mutex::new(()),
            state_lock: ReentrantMutex::new(()),
            destroy_lock: tokio::sync::Mutex::new(()),
            internal_module_lock: tokio::sync::Mutex::new(()),
        });

        debug!("{} created", deployer.id);
        Ok(deployer)
    }
}
