//! Deployment states and the aggregation of module states into one
//! application-level state.

use std::fmt;

/// Lifecycle state of an application or of one of its modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployState {
    Pending,
    Starting,
    Started,
    Completion,
    Stopping,
    Stopped,
    Failed,
    Unknown,
}

impl DeployState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployState::Pending => "PENDING",
            DeployState::Starting => "STARTING",
            DeployState::Started => "STARTED",
            DeployState::Completion => "COMPLETION",
            DeployState::Stopping => "STOPPING",
            DeployState::Stopped => "STOPPED",
            DeployState::Failed => "FAILED",
            DeployState::Unknown => "UNKNOWN",
        }
    }

    /// States from which a dead process can not be started again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeployState::Stopping | DeployState::Stopped | DeployState::Failed
        )
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-state counts of a set of modules
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StateTally {
    pub total: usize,
    pub pending: usize,
    pub starting: usize,
    pub started: usize,
    pub completion: usize,
    pub stopping: usize,
    pub stopped: usize,
    pub failed: usize,
}

impl StateTally {
    /// Count module states. `None` stands for a module without a deployer and
    /// counts as pending; `Unknown` only counts towards the total.
    pub fn from_states<I>(states: I) -> Self
    where
        I: IntoIterator<Item = Option<DeployState>>,
    {
        let mut tally = StateTally::default();
        for state in states {
            match state {
                None | Some(DeployState::Pending) => tally.pending += 1,
                Some(DeployState::Starting) => tally.starting += 1,
                Some(DeployState::Completion) => tally.completion += 1,
                Some(DeployState::Started) => tally.started += 1,
                Some(DeployState::Stopping) => tally.stopping += 1,
                Some(DeployState::Stopped) => tally.stopped += 1,
                Some(DeployState::Failed) => tally.failed += 1,
                Some(DeployState::Unknown) => {}
            }
            tally.total += 1;
        }
        tally
    }

    /// Resolve the tally to one state. Rules are checked in order, first match wins.
    pub fn resolve(&self) -> DeployState {
        if self.failed > 0 {
            return DeployState::Failed;
        }
        if self.pending == self.total {
            return DeployState::Pending;
        }
        if self.completion == self.total {
            return DeployState::Completion;
        }
        if self.stopped == self.total {
            return DeployState::Stopped;
        }
        // a pending module drags the whole application back to starting
        if self.starting > 0 || self.pending > 0 {
            return DeployState::Starting;
        }
        if self.stopping > 0 || self.stopped > 0 {
            return DeployState::Stopping;
        }
        if self.started > 0 {
            return DeployState::Started;
        }
        DeployState::Unknown
    }
}

/// Aggregate module states into the application state
pub fn calculate_state<I>(states: I) -> DeployState
where
    I: IntoIterator<Item = Option<DeployState>>,
{
    StateTally::from_states(states).resolve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn aggregate(states: &[DeployState]) -> DeployState {
        calculate_state(states.iter().copied().map(Some))
    }

    /// Straight-line restatement of the precedence table
    fn reference(states: &[Option<DeployState>]) -> DeployState {
        let count = |s: DeployState| states.iter().filter(|x| **x == Some(s)).count();
        let pending = count(DeployState::Pending) + states.iter().filter(|x| x.is_none()).count();
        let total = states.len();
        if count(DeployState::Failed) > 0 {
            DeployState::Failed
        } else if pending == total {
            DeployState::Pending
        } else if count(DeployState::Completion) == total {
            DeployState::Completion
        } else if count(DeployState::Stopped) == total {
            DeployState::Stopped
        } else if count(DeployState::Starting) > 0 || pending > 0 {
            DeployState::Starting
        } else if count(DeployState::Stopping) > 0 || count(DeployState::Stopped) > 0 {
            DeployState::Stopping
        } else if count(DeployState::Started) > 0 {
            DeployState::Started
        } else {
            DeployState::Unknown
        }
    }

    fn module_state() -> impl Strategy<Value = Option<DeployState>> {
        prop_oneof![
            Just(None),
            Just(Some(DeployState::Pending)),
            Just(Some(DeployState::Starting)),
            Just(Some(DeployState::Started)),
            Just(Some(DeployState::Completion)),
            Just(Some(DeployState::Stopping)),
            Just(Some(DeployState::Stopped)),
            Just(Some(DeployState::Failed)),
            Just(Some(DeployState::Unknown)),
        ]
    }

    proptest! {
        #[test]
        fn aggregate_matches_precedence_table(states in prop::collection::vec(module_state(), 0..12)) {
            prop_assert_eq!(calculate_state(states.clone()), reference(&states));
        }

        #[test]
        fn any_failure_is_fatal(mut states in prop::collection::vec(module_state(), 0..12), at in 0usize..12) {
            let at = at.min(states.len());
            states.insert(at, Some(DeployState::Failed));
            prop_assert_eq!(calculate_state(states), DeployState::Failed);
        }
    }

    #[test]
    fn test_empty_module_set_is_pending() {
        assert_eq!(aggregate(&[]), DeployState::Pending);
    }

    #[test]
    fn test_pending_beats_started() {
        use DeployState::*;
        assert_eq!(aggregate(&[Pending, Started, Started]), Starting);
    }

    #[test]
    fn test_failure_beats_everything() {
        use DeployState::*;
        assert_eq!(aggregate(&[Failed, Failed]), Failed);
        assert_eq!(aggregate(&[Failed, Started, Started]), Failed);
        assert_eq!(aggregate(&[Completion, Completion, Failed]), Failed);
    }

    #[test]
    fn test_stopped_and_pending_resolves_to_starting() {
        use DeployState::*;
        assert_eq!(aggregate(&[Stopped, Pending]), Starting);
    }

    #[test]
    fn test_uniform_states() {
        use DeployState::*;
        assert_eq!(aggregate(&[Pending, Pending]), Pending);
        assert_eq!(aggregate(&[Completion, Completion]), Completion);
        assert_eq!(aggregate(&[Stopped, Stopped]), Stopped);
        assert_eq!(aggregate(&[Started, Started]), Started);
    }

    #[test]
    fn test_mixed_states() {
        use DeployState::*;
        assert_eq!(aggregate(&[Started, Completion]), Started);
        assert_eq!(aggregate(&[Stopping, Completion]), Stopping);
        assert_eq!(aggregate(&[Stopped, Started]), Stopping);
        assert_eq!(aggregate(&[Starting, Stopping]), Starting);
        assert_eq!(aggregate(&[Unknown, Completion]), Unknown);
    }

    #[test]
    fn test_module_without_deployer_counts_as_pending() {
        let states = vec![None, Some(DeployState::Started)];
        let tally = StateTally::from_states(states.clone());
        assert_eq!(tally.pending, 1);
        assert_eq!(tally.total, 2);
        assert_eq!(calculate_state(states), DeployState::Starting);
    }

    #[test]
    fn test_terminal_states() {
        assert!(DeployState::Stopping.is_terminal());
        assert!(DeployState::Stopped.is_terminal());
        assert!(DeployState::Failed.is_terminal());
        assert!(!DeployState::Completion.is_terminal());
        assert_eq!(DeployState::Completion.to_string(), "COMPLETION");
    }
}
