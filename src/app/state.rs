use super::ApplicationDeployer;
use crate::error::Result;
use crate::future::CompletionFuture;
use crate::module::ModuleDeployer;
use crate::state::{calculate_state, DeployState};
use tracing::{debug, error, info, warn};

impl ApplicationDeployer {
    /// Aggregate state of all modules
    pub fn calculate_state(&self) -> DeployState {
        let modules = self.modules.read();
        calculate_state(modules.iter().map(|module| Some(module.state())))
    }

    /// Entry point for modules reporting a transition.
    ///
    /// Recomputes the application state and, while the application is starting,
    /// starts any module that is still pending.
    pub fn notify_module_changed(
        &self,
        module: &dyn ModuleDeployer,
        module_state: DeployState,
    ) -> Result<()> {
        self.check_state(module, module_state)?;
        self.start_pending_modules_if_idle();
        Ok(())
    }

    /// Recompute the application state and dispatch the matching transition
    pub fn check_state(&self, module: &dyn ModuleDeployer, module_state: DeployState) -> Result<()> {
        let _guard = self.state_lock.lock();

        if !module.is_internal() && module_state == DeployState::Started {
            if let Err(e) = self.prepare_application_instance(module) {
                self.on_failed(
                    format!("{} failed to prepare application instance", self.id),
                    Some(&e.to_string()),
                );
                return Err(e);
            }
        }

        match self.calculate_state() {
            DeployState::Started => self.on_started(),
            DeployState::Completion => {
                // a module may settle without the aggregate ever being observed as started
                if self.is_starting() {
                    self.on_started();
                }
                self.on_completion();
            }
            DeployState::Starting => self.on_starting(),
            DeployState::Stopping => self.on_stopping(),
            DeployState::Stopped => self.on_stopped(),
            // already reported
            DeployState::Failed if self.is_failed() => {}
            DeployState::Failed => {
                let modules = self.modules();
                let failed = modules
                    .iter()
                    .find(|m| m.is_failed() && m.error().is_some())
                    .or_else(|| modules.iter().find(|m| m.is_failed()));
                let (name, cause) = match failed {
                    Some(m) => (m.name().to_string(), m.error()),
                    None => ("<unknown>".to_string(), None),
                };
                self.on_failed(
                    format!("{} found failed module: {}", self.id, name),
                    cause.as_deref(),
                );
            }
            // can not go back to pending from another state
            DeployState::Pending | DeployState::Unknown => {}
        }

        Ok(())
    }

    /// Start modules that appeared while no module start loop is running
    fn start_pending_modules_if_idle(&self) {
        if !self.is_starting()
            || self.starting_modules.load(std::sync::atomic::Ordering::Acquire)
            || !self.has_pending_module()
        {
            return;
        }

        let Some(app) = self.self_ref.upgrade() else {
            return;
        };

        debug!("{} found pending module after state change", self.id);
        self.runtime.spawn(async move {
            if let Err(e) = app.start().await {
                warn!("{} failed to start pending modules: {}", app.id, e);
            }
        });
    }

    pub(super) fn on_initialize(&self) {
        self.listeners
            .notify("initialize", |listener| listener.on_initialize(self));
    }

    pub(super) fn on_starting(&self) {
        let _guard = self.state_lock.lock();
        // pending -> starting, started -> starting, completion -> starting
        if !(self.is_pending() || self.is_started() || self.is_completion()) {
            return;
        }
        self.set_state(DeployState::Starting);
        let superseded = {
            let mut future = self.start_future.write();
            std::mem::replace(&mut *future, CompletionFuture::new())
        };
        // waiters on an unfinished cycle are released, the new cycle reports separately
        superseded.complete(false);
        info!("{} is starting.", self.id);
        self.listeners
            .notify("starting", |listener| listener.on_starting(self));
    }

    pub(super) fn on_started(&self) {
        let _guard = self.state_lock.lock();
        if !self.is_starting() {
            return;
        }
        self.set_state(DeployState::Started);
        if let Some(metrics) = &self.collaborators.metrics {
            metrics.start_collector();
        }
        info!("{} is ready.", self.id);

        if self.is_registered() {
            if let Some(publisher) = &self.collaborators.instance_publisher {
                if let Err(e) = publisher.refresh_instance() {
                    error!("{} refresh instance and metadata error: {:#}", self.id, e);
                }
            }
        }
        self.listeners
            .notify("started", |listener| listener.on_started(self));
    }

    pub(super) fn on_completion(&self) {
        let _guard = self.state_lock.lock();
        if self.is_started() {
            self.set_state(DeployState::Completion);
            info!("{} has completed.", self.id);
            self.listeners
                .notify("completion", |listener| listener.on_completion(self));
        }
        self.complete_start_future(true);
    }

    pub(super) fn on_stopping(&self) {
        let _guard = self.state_lock.lock();
        if !(self.is_stopping() || self.is_stopped()) {
            self.set_state(DeployState::Stopping);
            info!("{} is stopping.", self.id);
            self.listeners
                .notify("stopping", |listener| listener.on_stopping(self));
        }
        self.complete_start_future(false);
    }

    pub(super) fn on_stopped(&self) {
        let _guard = self.state_lock.lock();
        if !self.is_stopped() {
            self.set_state(DeployState::Stopped);
            info!("{} has stopped.", self.id);
            self.listeners
                .notify("stopped", |listener| listener.on_stopped(self));
        }
        self.complete_start_future(false);
    }

    pub(super) fn on_failed(&self, message: String, cause: Option<&str>) {
        let _guard = self.state_lock.lock();
        let detail = match cause {
            Some(cause) => format!("{}: {}", message, cause),
            None => message,
        };
        self.set_state(DeployState::Failed);
        *self.last_error.write() = Some(detail.clone());
        error!("{}", detail);
        self.listeners
            .notify("failed", |listener| listener.on_failed(self, &detail));
        self.complete_start_future(false);
    }

    fn complete_start_future(&self, success: bool) {
        let future = self.start_future.read().clone();
        if future.complete(success) {
            debug!("{} start future completed: {}", self.id, success);
        }
    }
}
