//! Independently deployable units of an application.

pub mod mock;

use crate::error::Result;
use crate::future::CompletionFuture;
use crate::state::DeployState;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use mock::MockModuleDeployer;

/// A provider URL registered with one registry
#[derive(Debug)]
pub struct RegisterStatedUrl {
    pub registry_url: String,
    pub provider_url: String,
    registered: AtomicBool,
}

impl RegisterStatedUrl {
    pub fn new<S: Into<String>>(registry_url: S, provider_url: S, registered: bool) -> Self {
        Self {
            registry_url: registry_url.into(),
            provider_url: provider_url.into(),
            registered: AtomicBool::new(registered),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::Release);
    }
}

/// A service exported by a module together with its registrations
#[derive(Debug, Clone)]
pub struct ExportedService {
    pub service_key: String,
    pub urls: Vec<Arc<RegisterStatedUrl>>,
}

/// Deployer of one module.
///
/// The module owns its own transitions. It reports every change to the application
/// through [`ApplicationDeployer::notify_module_changed`](crate::app::ApplicationDeployer::notify_module_changed)
/// and must not call back into `ApplicationDeployer::start` from `start`.
#[async_trait]
pub trait ModuleDeployer: Send + Sync {
    fn name(&self) -> &str;

    /// Bootstrap-only module started before every other module
    fn is_internal(&self) -> bool {
        false
    }

    fn state(&self) -> DeployState;

    /// Last error of a failed module
    fn error(&self) -> Option<String>;

    /// Whether the module registers or subscribes with a registry
    fn has_registry_interaction(&self) -> bool {
        false
    }

    fn exported_services(&self) -> Vec<ExportedService> {
        Vec::new()
    }

    async fn initialize(&self) -> Result<()>;

    /// Begin starting the module. The returned future resolves when it settles.
    ///
    /// Calling `start` on a module that is already starting returns the future of
    /// the running cycle.
    fn start(&self) -> Result<CompletionFuture>;

    fn is_pending(&self) -> bool {
        self.state() == DeployState::Pending
    }

    fn is_starting(&self) -> bool {
        self.state() == DeployState::Starting
    }

    fn is_started(&self) -> bool {
        self.state() == DeployState::Started
    }

    fn is_completion(&self) -> bool {
        self.state() == DeployState::Completion
    }

    fn is_stopping(&self) -> bool {
        self.state() == DeployState::Stopping
    }

    fn is_stopped(&self) -> bool {
        self.state() == DeployState::Stopped
    }

    fn is_failed(&self) -> bool {
        self.state() == DeployState::Failed
    }
}
