//! Lifecycle observers of an application.

use crate::app::ApplicationDeployer;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::error;

/// Observer of application lifecycle transitions.
///
/// Callbacks run synchronously on the thread performing the transition, in
/// registration order. An error is logged by the caller and never stops the
/// transition or the remaining listeners.
#[allow(unused_variables)]
pub trait DeployListener: Send + Sync {
    fn on_initialize(&self, app: &ApplicationDeployer) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_starting(&self, app: &ApplicationDeployer) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_started(&self, app: &ApplicationDeployer) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_completion(&self, app: &ApplicationDeployer) -> anyhow::Result<()> {
        Ok(())
    }

    /// A module finished starting and its metadata may be exported
    fn on_module_started(&self, app: &ApplicationDeployer) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_stopping(&self, app: &ApplicationDeployer) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_stopped(&self, app: &ApplicationDeployer) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_failed(&self, app: &ApplicationDeployer, cause: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Ordered set of listeners
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Arc<dyn DeployListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener. Adding the same instance twice is a no-op.
    pub fn add(&self, listener: Arc<dyn DeployListener>) -> bool {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    pub fn remove(&self, listener: &Arc<dyn DeployListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Invoke `callback` on every listener, isolating failures.
    ///
    /// Returns the number of listeners that failed.
    pub fn notify<F>(&self, event: &str, callback: F) -> usize
    where
        F: Fn(&dyn DeployListener) -> anyhow::Result<()>,
    {
        // snapshot so listeners may register further listeners
        let listeners: Vec<_> = self.listeners.read().clone();
        let mut failures = 0;
        for listener in &listeners {
            if let Err(e) = callback(listener.as_ref()) {
                failures += 1;
                error!("An exception occurred when handle {} event: {:#}", event, e);
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OrderedListener {
        order: Arc<parking_lot::Mutex<Vec<&'static str>>>,
        name: &'static str,
        fail: bool,
    }

    impl DeployListener for OrderedListener {}

    fn ordered(
        order: &Arc<parking_lot::Mutex<Vec<&'static str>>>,
        name: &'static str,
        fail: bool,
    ) -> Arc<OrderedListener> {
        Arc::new(OrderedListener {
            order: Arc::clone(order),
            name,
            fail,
        })
    }

    fn visit(
        listener: &dyn DeployListener,
        listeners: &[Arc<OrderedListener>],
    ) -> anyhow::Result<()> {
        let target = listener as *const dyn DeployListener as *const ();
        let found = listeners
            .iter()
            .find(|p| Arc::as_ptr(p) as *const () == target)
            .expect("unknown listener");
        found.order.lock().push(found.name);
        if found.fail {
            anyhow::bail!("{} refused", found.name);
        }
        Ok(())
    }

    #[test]
    fn test_notify_in_registration_order_with_isolation() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let listeners = vec![
            ordered(&order, "first", false),
            ordered(&order, "second", true),
            ordered(&order, "third", false),
        ];

        let registry = ListenerRegistry::new();
        for p in &listeners {
            registry.add(p.clone());
        }

        let failures = registry.notify("test", |l| visit(l, &listeners));
        assert_eq!(failures, 1);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_add_is_idempotent_per_instance() {
        struct Noop;
        impl DeployListener for Noop {}

        let registry = ListenerRegistry::new();
        let listener: Arc<dyn DeployListener> = Arc::new(Noop);
        assert!(registry.add(Arc::clone(&listener)));
        assert!(!registry.add(Arc::clone(&listener)));
        assert!(registry.add(Arc::new(Noop)));
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(&listener));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_notify_empty_registry() {
        let registry = ListenerRegistry::new();
        let calls = AtomicUsize::new(0);
        let failures = registry.notify("test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(failures, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }
}
