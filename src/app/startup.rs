use super::{ApplicationDeployer, INTERNAL_MODULE_TIMEOUT};
use crate::collaborators::RemoteConfigSource;
use crate::config::{ConfigCenterConfig, MetadataReportConfig, MetadataType};
use crate::environment::parse_properties;
use crate::error::{DeployError, Result};
use crate::future::CompletionFuture;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};

impl ApplicationDeployer {
    /// Initialize the application. Side effects run at most once.
    pub async fn initialize(&self) -> Result<()> {
        if self.initialized.is_done() {
            return Ok(());
        }

        let _guard = self.start_lock.lock().await;
        self.initialize_locked().await.map_err(|e| {
            self.on_failed(
                format!("{} initialize failure", self.id),
                Some(&e.to_string()),
            );
            e
        })
    }

    /// Caller must hold `start_lock`
    pub(super) async fn initialize_locked(&self) -> Result<()> {
        // double check under the start lock
        if self.initialized.is_done() || !self.initialized.try_begin() {
            return Ok(());
        }

        info!("Initializing {}", self.id);
        match self.bootstrap().await {
            Ok(()) => {
                self.initialized.complete();
                info!("{} has been initialized!", self.id);
                Ok(())
            }
            Err(e) => {
                self.initialized.abandon();
                Err(e)
            }
        }
    }

    async fn bootstrap(&self) -> Result<()> {
        self.on_initialize();

        if self.config.application.register_shutdown_hook {
            self.shutdown_hook.register();
        }

        self.start_config_center()?;
        self.load_application_configs()?;

        for module in self.modules() {
            module.initialize().await.map_err(|e| {
                error!("Failed to initialize module '{}': {}", module.name(), e);
                e
            })?;
        }

        if let Some(metrics) = &self.collaborators.metrics {
            metrics
                .init_reporter()
                .map_err(|e| DeployError::bootstrap("metrics", format!("{:#}", e)))?;
        }

        if let Some(observation) = &self.collaborators.observation {
            observation
                .init()
                .map_err(|e| DeployError::bootstrap("observation", format!("{:#}", e)))?;
        }

        self.start_metadata_center()
    }

    /// Start all pending modules.
    ///
    /// Returns the completion future of the current cycle, or an already resolved
    /// future when there was nothing to start.
    pub async fn start(&self) -> Result<CompletionFuture> {
        let _guard = self.start_lock.lock().await;

        if self.state().is_terminal() {
            return Err(DeployError::illegal_state(format!(
                "{} is stopping or stopped, can not start again",
                self.id
            )));
        }

        match self.start_locked().await {
            Ok(future) => Ok(future),
            Err(e) => {
                self.on_failed(format!("{} start failure", self.id), Some(&e.to_string()));
                Err(e)
            }
        }
    }

    async fn start_locked(&self) -> Result<CompletionFuture> {
        let has_pending_module = self.has_pending_module();

        if self.is_starting() {
            // a start cycle is running, pick up modules added in the meantime
            if has_pending_module {
                self.start_modules().await?;
            }
            return Ok(self.start_future());
        }

        if (self.is_started() || self.is_completion()) && !has_pending_module {
            return Ok(CompletionFuture::resolved(false));
        }

        self.on_starting();
        self.initialize_locked().await?;
        self.start_modules().await?;

        Ok(self.start_future())
    }

    async fn start_modules(&self) -> Result<()> {
        self.starting_modules.store(true, Ordering::Release);
        self.prepare_internal_module().await;
        let result = self.start_pending_modules();
        self.starting_modules.store(false, Ordering::Release);
        result
    }

    /// Walk the live module list so modules added while starting are picked up
    fn start_pending_modules(&self) -> Result<()> {
        let mut index = 0;
        while let Some(module) = self.module_at(index) {
            index += 1;
            if !module.is_pending() {
                continue;
            }

            debug!("{} starting module '{}'", self.id, module.name());
            module.start().map_err(|e| {
                error!("{} failed to start module '{}': {}", self.id, module.name(), e);
                e
            })?;
        }
        Ok(())
    }

    /// Start the internal module and wait for it, bounded by [`INTERNAL_MODULE_TIMEOUT`].
    ///
    /// Failures are logged and leave the module unprepared so a later start retries.
    pub async fn prepare_internal_module(&self) {
        if self.internal_module_prepared.is_done() {
            return;
        }

        let _guard = self.internal_module_lock.lock().await;
        if self.internal_module_prepared.is_done() || !self.internal_module_prepared.try_begin() {
            return;
        }

        let module = match self.internal_module() {
            Some(module) if !module.is_completion() => module,
            // nothing to wait for
            _ => {
                self.internal_module_prepared.complete();
                return;
            }
        };

        let outcome = match module.start() {
            Ok(future) => tokio::time::timeout(INTERNAL_MODULE_TIMEOUT, future.wait())
                .await
                .map_err(|_| DeployError::timeout("internal module startup", INTERNAL_MODULE_TIMEOUT)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(true) => {
                self.internal_module_prepared.complete();
                debug!("{} internal module '{}' is ready", self.id, module.name());
            }
            Ok(false) => {
                self.internal_module_prepared.abandon();
                warn!(
                    "{} wait for internal module '{}' failed: module did not complete",
                    self.id,
                    module.name()
                );
            }
            Err(e) => {
                self.internal_module_prepared.abandon();
                warn!(
                    "{} wait for internal module '{}' failed: {}",
                    self.id,
                    module.name(),
                    e
                );
            }
        }
    }

    fn start_config_center(&self) -> Result<()> {
        let mut centers = self.config.config_centers.clone();
        if centers.is_empty() {
            centers = self.registries_as_config_centers();
        }
        if centers.is_empty() {
            debug!("{} has no config center", self.id);
            return Ok(());
        }

        let Some(source) = self.collaborators.remote_config.clone() else {
            warn!(
                "{} has {} config center(s) but no remote config source",
                self.id,
                centers.len()
            );
            return Ok(());
        };

        for center in centers.iter().filter(|center| center.is_valid()) {
            self.prepare_environment(source.as_ref(), center)?;
        }
        Ok(())
    }

    /// Registries double as config centers unless they opt out
    fn registries_as_config_centers(&self) -> Vec<ConfigCenterConfig> {
        self.config
            .registries
            .iter()
            .filter(|registry| registry.use_as_config_center != Some(false))
            .map(|registry| ConfigCenterConfig {
                check: false,
                ..ConfigCenterConfig::new(registry.address.clone())
            })
            .collect()
    }

    fn prepare_environment(
        &self,
        source: &dyn RemoteConfigSource,
        center: &ConfigCenterConfig,
    ) -> Result<()> {
        let app_config_file = center.app_config_file();
        let app_name = &self.config.application.name;

        let fetched = source
            .fetch_remote_config(center, &center.config_file, &center.group)
            .and_then(|global| {
                let app = source.fetch_remote_config(center, &app_config_file, app_name)?;
                Ok((global, app))
            });

        let (global, app) = match fetched {
            Ok(content) => content,
            Err(e) if !center.check => {
                warn!(
                    "The configuration center failed to initialize, {}: {:#}",
                    center.address, e
                );
                return Ok(());
            }
            Err(e) => {
                return Err(DeployError::bootstrap(
                    "config-center",
                    format!("{}: {:#}", center.address, e),
                ))
            }
        };

        if global.is_some() {
            info!(
                "Got global remote configuration from config center with key-{} and group-{}",
                center.config_file, center.group
            );
        }
        if app.is_some() {
            info!(
                "Got application specific remote configuration from config center with key {} and group {}",
                app_config_file, app_name
            );
        }

        let global = parse_properties(global.as_deref().unwrap_or_default())?;
        let app = parse_properties(app.as_deref().unwrap_or_default())?;

        self.environment.update_external_config_map(global);
        self.environment.update_app_external_config_map(app);
        self.environment.add_config_center(&center.address);
        Ok(())
    }

    fn load_application_configs(&self) -> Result<()> {
        if let Some(loader) = &self.collaborators.config_loader {
            loader
                .load_configs()
                .map_err(|e| DeployError::bootstrap("config-loader", format!("{:#}", e)))?;
        }
        Ok(())
    }

    fn start_metadata_center(&self) -> Result<()> {
        let mut configs = self.config.metadata_reports.clone();
        if configs.is_empty() && self.collaborators.metadata_reports.is_some() {
            configs = self.registries_as_metadata_centers();
        }

        if configs.is_empty() {
            if self.config.application.metadata_type == MetadataType::Remote {
                return Err(DeployError::bootstrap(
                    "metadata-center",
                    "No MetadataConfig found, Metadata Center address is required when 'metadata=remote' is enabled.",
                ));
            }
            return Ok(());
        }

        let valid: Vec<MetadataReportConfig> =
            configs.iter().filter(|c| c.is_valid()).cloned().collect();

        let initialized = match &self.collaborators.metadata_reports {
            Some(factory) if !valid.is_empty() => factory
                .init(&valid)
                .map_err(|e| DeployError::bootstrap("metadata-center", format!("{:#}", e)))?,
            _ => false,
        };

        if !initialized {
            return Err(DeployError::bootstrap(
                "metadata-center",
                format!(
                    "{} MetadataConfigs found, but none of them is valid.",
                    configs.len()
                ),
            ));
        }

        info!("{} started {} metadata report(s)", self.id, valid.len());
        Ok(())
    }

    /// Registries double as metadata centers unless they opt out
    fn registries_as_metadata_centers(&self) -> Vec<MetadataReportConfig> {
        self.config
            .registries
            .iter()
            .filter(|registry| registry.use_as_metadata_center != Some(false))
            .map(|registry| MetadataReportConfig::new(registry.address.clone()))
            .collect()
    }
}
