use super::{ExportedService, ModuleDeployer};
use crate::app::ApplicationDeployer;
use crate::error::{DeployError, Result};
use crate::future::CompletionFuture;
use crate::state::DeployState;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// How a mock module behaves when started
#[derive(Debug, Clone, PartialEq)]
pub enum StartBehavior {
    /// Go through starting, started and completion immediately
    Complete,
    /// Stay in starting until driven by the test
    Stall,
    /// Fail immediately with the given message
    Fail(String),
}

/// Scriptable module deployer for testing without real services
pub struct MockModuleDeployer {
    name: String,
    internal: bool,
    registry_interaction: bool,
    behavior: StartBehavior,
    services: Vec<ExportedService>,
    state: RwLock<DeployState>,
    error: RwLock<Option<String>>,
    future: RwLock<Option<CompletionFuture>>,
    app: RwLock<Weak<ApplicationDeployer>>,
    start_calls: AtomicUsize,
    init_calls: AtomicUsize,
}

impl MockModuleDeployer {
    /// Create a regular module that completes as soon as it is started
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            internal: false,
            registry_interaction: false,
            behavior: StartBehavior::Complete,
            services: Vec::new(),
            state: RwLock::new(DeployState::Pending),
            error: RwLock::new(None),
            future: RwLock::new(None),
            app: RwLock::new(Weak::new()),
            start_calls: AtomicUsize::new(0),
            init_calls: AtomicUsize::new(0),
        }
    }

    /// Create the internal bootstrap module
    pub fn internal<S: Into<String>>(name: S) -> Self {
        Self {
            internal: true,
            ..Self::new(name)
        }
    }

    pub fn with_behavior(mut self, behavior: StartBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_registry_interaction(mut self, registry_interaction: bool) -> Self {
        self.registry_interaction = registry_interaction;
        self
    }

    pub fn with_exported_service(mut self, service: ExportedService) -> Self {
        self.services.push(service);
        self
    }

    /// Report transitions to `app` from now on
    pub fn attach(&self, app: &Arc<ApplicationDeployer>) {
        *self.app.write() = Arc::downgrade(app);
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Move to `state` and report it to the application
    pub fn transition(&self, state: DeployState) {
        *self.state.write() = state;
        debug!("Mock module '{}' is now {}", self.name, state);
        let app = self.app.read().upgrade();
        if let Some(app) = app {
            if let Err(e) = app.notify_module_changed(self, state) {
                warn!("Mock module '{}' state report rejected: {}", self.name, e);
            }
        }
    }

    pub fn mark_started(&self) {
        self.transition(DeployState::Started);
    }

    pub fn mark_completed(&self) {
        self.transition(DeployState::Completion);
        if let Some(future) = self.future.read().as_ref() {
            future.complete(true);
        }
    }

    pub fn mark_failed<S: Into<String>>(&self, message: S) {
        *self.error.write() = Some(message.into());
        self.transition(DeployState::Failed);
        if let Some(future) = self.future.read().as_ref() {
            future.complete(false);
        }
    }

    pub fn mark_stopped(&self) {
        self.transition(DeployState::Stopped);
    }
}

#[async_trait]
impl ModuleDeployer for MockModuleDeployer {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_internal(&self) -> bool {
        self.internal
    }

    fn state(&self) -> DeployState {
        *self.state.read()
    }

    fn error(&self) -> Option<String> {
        self.error.read().clone()
    }

    fn has_registry_interaction(&self) -> bool {
        self.registry_interaction
    }

    fn exported_services(&self) -> Vec<ExportedService> {
        self.services.clone()
    }

    async fn initialize(&self) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn start(&self) -> Result<CompletionFuture> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if matches!(self.state(), DeployState::Starting | DeployState::Started) {
            if let Some(future) = self.future.read().clone() {
                return Ok(future);
            }
        }

        let future = CompletionFuture::new();
        *self.future.write() = Some(future.clone());

        match &self.behavior {
            StartBehavior::Complete => {
                self.transition(DeployState::Starting);
                self.mark_started();
                self.mark_completed();
            }
            StartBehavior::Stall => {
                self.transition(DeployState::Starting);
            }
            StartBehavior::Fail(message) => {
                self.mark_failed(message.clone());
                return Err(DeployError::module_start(self.name.clone(), message.clone()));
            }
        }

        Ok(future)
    }
}
