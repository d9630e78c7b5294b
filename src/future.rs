use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Single-resolution handle for the outcome of one start/stop cycle.
///
/// Clones share the same cycle; a new cycle gets a fresh handle.
#[derive(Clone)]
pub struct CompletionFuture {
    slot: Arc<watch::Sender<Option<bool>>>,
}

impl Default for CompletionFuture {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionFuture {
    /// Create an unresolved handle
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            slot: Arc::new(sender),
        }
    }

    /// Create a handle that is already resolved
    pub fn resolved(success: bool) -> Self {
        let future = Self::new();
        future.complete(success);
        future
    }

    /// Resolve the handle. Returns `false` if it had already been resolved.
    pub fn complete(&self, success: bool) -> bool {
        self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(success);
            true
        })
    }

    /// Outcome if resolved
    pub fn result(&self) -> Option<bool> {
        *self.slot.borrow()
    }

    pub fn is_done(&self) -> bool {
        self.result().is_some()
    }

    /// Wait until the cycle is resolved
    pub async fn wait(&self) -> bool {
        let mut receiver = self.slot.subscribe();
        let outcome = match receiver.wait_for(|slot| slot.is_some()).await {
            Ok(slot) => (*slot).unwrap_or(false),
            Err(_) => false,
        };
        outcome
    }

    /// Whether both handles belong to the same cycle
    pub fn same_cycle(&self, other: &CompletionFuture) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for CompletionFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionFuture")
            .field("result", &self.result())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_resolves_once() {
        let future = CompletionFuture::new();
        assert_eq!(future.result(), None);

        assert!(future.complete(true));
        assert!(!future.complete(false));
        assert_eq!(future.result(), Some(true));
    }

    #[test]
    fn test_clones_share_cycle() {
        let future = CompletionFuture::new();
        let clone = future.clone();
        assert!(future.same_cycle(&clone));
        assert!(!future.same_cycle(&CompletionFuture::new()));

        clone.complete(false);
        assert_eq!(future.result(), Some(false));
    }

    #[tokio::test]
    async fn test_wait_for_resolution() {
        let future = CompletionFuture::new();
        let waiter = future.clone();

        let handle = tokio::spawn(async move { waiter.wait().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        future.complete(true);

        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_after_handle_dropped() {
        let future = CompletionFuture::new();
        let waiter = {
            let clone = future.clone();
            tokio::spawn(async move { clone.wait().await })
        };
        tokio::task::yield_now().await;
        future.complete(false);
        drop(future);

        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_on_resolved() {
        assert!(!CompletionFuture::resolved(false).wait().await);
        assert!(CompletionFuture::resolved(true).wait().await);
    }
}
