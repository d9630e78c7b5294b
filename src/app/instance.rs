use super::ApplicationDeployer;
use crate::error::{DeployError, Result};
use crate::module::ModuleDeployer;
use std::ops::ControlFlow;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, error, info};

/// Refresh interval in ticks until the application has completed
const SETTLING_REFRESH_INTERVAL: u64 = 30;

/// Back-off while services are being refreshed elsewhere
const BUSY_REFRESH_INTERVAL: u64 = 5;

impl ApplicationDeployer {
    /// Runs once, when the first non-internal module reports STARTED
    pub(super) fn prepare_application_instance(&self, module: &dyn ModuleDeployer) -> Result<()> {
        if self.application_instance_prepared.is_done() {
            return Ok(());
        }

        self.export_metrics_service();

        if module.has_registry_interaction() && self.config.has_default_application_name() {
            return Err(DeployError::illegal_state(
                "Application name must be set when registry is enabled.",
            ));
        }

        let should_register =
            self.config.application.register_consumer_instance || module.has_registry_interaction();
        if should_register && self.application_instance_prepared.try_begin() {
            self.application_instance_prepared.complete();
            self.register_service_instance();
        }
        Ok(())
    }

    fn export_metrics_service(&self) {
        if !self.config.metrics.export_metrics_service {
            return;
        }
        if let Some(metrics) = &self.collaborators.metrics {
            if let Err(e) = metrics.export() {
                error!("{} export metrics service error: {:#}", self.id, e);
            }
        }
    }

    pub(super) fn unexport_metrics_service(&self) {
        if let Some(metrics) = &self.collaborators.metrics {
            if let Err(e) = metrics.unexport() {
                debug!("{} unexport metrics service error: {:#}", self.id, e);
            }
        }
    }

    /// Register the application instance and schedule periodic refresh.
    ///
    /// Only the first call has an effect.
    pub fn register_service_instance(&self) {
        if !self.registered.try_begin() {
            return;
        }
        self.registered.complete();

        if let Some(publisher) = &self.collaborators.instance_publisher {
            match publisher.register_instance() {
                Ok(()) => info!("{} registered application instance", self.id),
                Err(e) => error!("{} register instance error: {:#}", self.id, e),
            }
        }

        if self.is_destroyed() {
            return;
        }

        let app = self.self_ref.clone();
        let task = self.executors.schedule_with_fixed_delay(
            "instance-refresh",
            Duration::ZERO,
            self.config.metadata_publish_delay(),
            move || match app.upgrade() {
                Some(app) => {
                    app.on_refresh_tick();
                    ControlFlow::Continue(())
                }
                None => ControlFlow::Break(()),
            },
        );

        let previous = self.refresh_task.lock().replace(task);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    /// One tick of the refresh schedule. Returns whether a refresh was attempted.
    pub fn on_refresh_tick(&self) -> bool {
        if self.is_destroyed() {
            return false;
        }

        let tick = self.refresh_ticks.fetch_add(1, Ordering::AcqRel) + 1;
        let refreshing = self.service_refresh_state.load(Ordering::Acquire);
        if !should_refresh(tick, self.is_completion(), refreshing) {
            return false;
        }

        if self.is_destroyed() || !self.is_registered() {
            return false;
        }
        let Some(publisher) = &self.collaborators.instance_publisher else {
            return false;
        };

        if let Err(e) = publisher.refresh_instance() {
            if !self.is_destroyed() {
                error!("{} refresh instance and metadata error: {:#}", self.id, e);
            }
        }
        true
    }

    /// Refresh the registered instance right away
    pub fn refresh_service_instance(&self) {
        if !self.is_registered() {
            return;
        }
        if let Some(publisher) = &self.collaborators.instance_publisher {
            if let Err(e) = publisher.refresh_instance() {
                error!("{} refresh instance and metadata error: {:#}", self.id, e);
            }
        }
    }

    /// Mark a service update in progress elsewhere
    pub fn increase_service_refresh_count(&self) {
        self.service_refresh_state.fetch_add(1, Ordering::AcqRel);
    }

    pub fn decrease_service_refresh_count(&self) {
        self.service_refresh_state.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn service_refresh_count(&self) -> i64 {
        self.service_refresh_state.load(Ordering::Acquire)
    }

    /// Announce that a module has exported its services
    pub fn export_metadata_service(&self) {
        let _guard = self.state_lock.lock();
        if !(self.is_starting() || self.is_started() || self.is_completion()) {
            return;
        }
        self.listeners
            .notify("module started", |listener| listener.on_module_started(self));
    }
}

pub(super) fn should_refresh(tick: u64, completion: bool, refreshing: i64) -> bool {
    if tick % SETTLING_REFRESH_INTERVAL != 0 && !completion {
        return false;
    }
    if refreshing != 0 && tick % BUSY_REFRESH_INTERVAL != 0 {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_refresh_while_settling() {
        let refreshed: Vec<u64> = (1..=90).filter(|&t| should_refresh(t, false, 0)).collect();
        assert_eq!(refreshed, vec![30, 60, 90]);
    }

    #[test]
    fn test_should_refresh_after_completion() {
        assert!((1..=10).all(|t| should_refresh(t, true, 0)));
    }

    #[test]
    fn test_should_refresh_backs_off_while_busy() {
        let refreshed: Vec<u64> = (1..=12).filter(|&t| should_refresh(t, true, 2)).collect();
        assert_eq!(refreshed, vec![5, 10]);

        // settling ticks must also hit the busy interval
        assert!(should_refresh(30, false, 1));
        assert!(!should_refresh(29, false, 1));
    }
}
