use super::{ApplicationDeployer, ShutdownReason};
use crate::error::{DeployError, Result};
use crate::module::RegisterStatedUrl;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info};

/// Upper bound for a single shutdown callback
const SHUTDOWN_CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

impl ApplicationDeployer {
    /// Stop the application: [`pre_destroy`](Self::pre_destroy) then
    /// [`post_destroy`](Self::post_destroy)
    pub async fn stop(&self) {
        self.shutdown(ShutdownReason::UserRequest).await;
    }

    pub async fn shutdown(&self, reason: ShutdownReason) {
        info!("{} shutdown initiated: {}", self.id, reason);
        self.pre_destroy().await;
        self.post_destroy().await;
    }

    /// Take the application offline. Safe to call more than once.
    pub async fn pre_destroy(&self) {
        let _guard = self.destroy_lock.lock().await;
        if self.is_stopping() || self.is_stopped() {
            return;
        }

        self.destroyed.store(true, Ordering::Release);
        self.on_stopping();
        self.offline();
        self.unregister_service_instance();
        self.unexport_metrics_service();
        self.shutdown_hook.unregister();

        let task = self.refresh_task.lock().take();
        if let Some(task) = task {
            task.cancel();
        }
    }

    /// Release resources after the application went offline.
    ///
    /// A failing step moves the application to FAILED and skips the remaining steps.
    pub async fn post_destroy(&self) {
        let _guard = self.destroy_lock.lock().await;
        if self.is_stopped() {
            return;
        }
        self.destroyed.store(true, Ordering::Release);

        if let Err(e) = self.release_resources().await {
            self.on_failed(
                format!("{} an error occurred when stopping application", self.id),
                Some(&e.to_string()),
            );
        }
    }

    async fn release_resources(&self) -> Result<()> {
        if let Some(registries) = &self.collaborators.registries {
            registries
                .destroy_all()
                .map_err(|e| DeployError::component("registry", format!("{:#}", e)))?;
        }

        if let Some(metadata_reports) = &self.collaborators.metadata_reports {
            metadata_reports
                .destroy()
                .map_err(|e| DeployError::component("metadata-report", format!("{:#}", e)))?;
        }

        for callback in &self.collaborators.shutdown_callbacks {
            debug!("{} running shutdown callback '{}'", self.id, callback.name());
            match timeout(SHUTDOWN_CALLBACK_TIMEOUT, callback.callback()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Shutdown callback '{}' failed: {:#}", callback.name(), e);
                    return Err(DeployError::component(
                        callback.name(),
                        format!("{:#}", e),
                    ));
                }
                Err(_) => {
                    error!("Shutdown callback '{}' timed out", callback.name());
                    return Err(DeployError::timeout(
                        format!("shutdown callback '{}'", callback.name()),
                        SHUTDOWN_CALLBACK_TIMEOUT,
                    ));
                }
            }
        }

        self.executors.destroy_all();
        self.on_stopped();
        Ok(())
    }

    /// Unregister every registered provider URL of every module
    fn offline(&self) {
        for module in self.modules() {
            for service in module.exported_services() {
                for url in service.urls.iter().filter(|url| url.is_registered()) {
                    if let Err(e) = self.offline_url(url) {
                        error!(
                            "{} failed to unregister service {} from {}: {:#}",
                            self.id, service.service_key, url.registry_url, e
                        );
                    }
                }
            }
        }
    }

    fn offline_url(&self, url: &RegisterStatedUrl) -> anyhow::Result<()> {
        let registries = self
            .collaborators
            .registries
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no registry manager available"))?;
        let registry = registries
            .registry(&url.registry_url)
            .ok_or_else(|| anyhow::anyhow!("registry {} not found", url.registry_url))?;

        registry.unregister(&url.provider_url)?;
        url.set_registered(false);
        Ok(())
    }

    fn unregister_service_instance(&self) {
        if !self.is_registered() {
            return;
        }
        if let Some(publisher) = &self.collaborators.instance_publisher {
            match publisher.unregister_instance() {
                Ok(()) => info!("{} unregistered application instance", self.id),
                Err(e) => error!("{} unregister instance error: {:#}", self.id, e),
            }
        }
    }
}
