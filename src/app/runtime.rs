use super::{ApplicationDeployer, ShutdownReason};
use parking_lot::Mutex;
use std::sync::Weak;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Process signal hook that stops the application on SIGINT or SIGTERM
pub struct ShutdownHook {
    app: Weak<ApplicationDeployer>,
    runtime: Handle,
    token: Mutex<Option<CancellationToken>>,
}

impl ShutdownHook {
    pub(super) fn new(app: Weak<ApplicationDeployer>, runtime: Handle) -> Self {
        Self {
            app,
            runtime,
            token: Mutex::new(None),
        }
    }

    /// Install the signal handlers. Returns false if already registered.
    pub fn register(&self) -> bool {
        let mut slot = self.token.lock();
        if slot.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let app = self.app.clone();

        self.runtime.spawn(async move {
            let reason = tokio::select! {
                _ = cancelled.cancelled() => return,
                reason = wait_for_signal() => reason,
            };

            let Some(reason) = reason else {
                return;
            };
            if let Some(app) = app.upgrade() {
                app.shutdown(reason).await;
            }
        });

        *slot = Some(token);
        debug!("Shutdown hook registered");
        true
    }

    /// Remove the signal handlers. Returns false if not registered.
    pub fn unregister(&self) -> bool {
        match self.token.lock().take() {
            Some(token) => {
                token.cancel();
                debug!("Shutdown hook unregistered");
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.token.lock().is_some()
    }
}

async fn wait_for_signal() -> Option<ShutdownReason> {
    // Handle SIGTERM (systemd stop) - Unix only
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                return tokio::select! {
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        Some(ShutdownReason::Signal("SIGTERM".to_string()))
                    }
                    result = tokio::signal::ctrl_c() => ctrl_c_reason(result),
                };
            }
            Err(e) => warn!("Failed to register SIGTERM handler: {}", e),
        }
    }

    ctrl_c_reason(tokio::signal::ctrl_c().await)
}

fn ctrl_c_reason(result: std::io::Result<()>) -> Option<ShutdownReason> {
    match result {
        Ok(()) => {
            info!("Received SIGINT signal (Ctrl+C)");
            Some(ShutdownReason::Signal("SIGINT".to_string()))
        }
        Err(e) => {
            warn!("Failed to register SIGINT handler: {}", e);
            None
        }
    }
}
