//! One-shot flags with an explicit `unset -> in-progress -> done` progression.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnceState {
    Unset,
    InProgress,
    Done,
}

impl OnceState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => OnceState::Unset,
            1 => OnceState::InProgress,
            _ => OnceState::Done,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            OnceState::Unset => 0,
            OnceState::InProgress => 1,
            OnceState::Done => 2,
        }
    }
}

/// Guards an action that must run at most once to completion.
///
/// Only the caller that wins [`OneShot::try_begin`] may run the action; it then
/// either [`complete`](OneShot::complete)s the flag or
/// [`abandon`](OneShot::abandon)s it so a later caller can retry.
#[derive(Debug)]
pub struct OneShot {
    state: AtomicU8,
}

impl Default for OneShot {
    fn default() -> Self {
        Self::new()
    }
}

impl OneShot {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(0),
        }
    }

    pub fn state(&self) -> OnceState {
        OnceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_done(&self) -> bool {
        self.state() == OnceState::Done
    }

    /// Claim the action. Returns `false` if it is already running or done.
    pub fn try_begin(&self) -> bool {
        self.transition(OnceState::Unset, OnceState::InProgress)
    }

    /// Mark the claimed action as done
    pub fn complete(&self) {
        self.state
            .store(OnceState::Done.as_u8(), Ordering::Release);
    }

    /// Give up a claimed action so it can be attempted again
    pub fn abandon(&self) -> bool {
        self.transition(OnceState::InProgress, OnceState::Unset)
    }

    fn transition(&self, from: OnceState, to: OnceState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_single_winner() {
        let flag = OneShot::new();
        assert!(flag.try_begin());
        assert!(!flag.try_begin());
        assert_eq!(flag.state(), OnceState::InProgress);

        flag.complete();
        assert!(flag.is_done());
        assert!(!flag.try_begin());
        assert!(!flag.abandon());
    }

    #[test]
    fn test_abandon_allows_retry() {
        let flag = OneShot::new();
        assert!(flag.try_begin());
        assert!(flag.abandon());
        assert_eq!(flag.state(), OnceState::Unset);
        assert!(flag.try_begin());
    }

    #[test]
    fn test_concurrent_claims() {
        let flag = Arc::new(OneShot::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let flag = Arc::clone(&flag);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    if flag.try_begin() {
                        winners.fetch_add(1, Ordering::SeqCst);
                        flag.complete();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(flag.is_done());
    }
}
