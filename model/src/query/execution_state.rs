use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Display,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    #[default]
    Unstarted, // Handle created, waiting for a pool worker
    Running,           // Session opened on the remote engine
    Succeeded,         // Final batch transcoded
    Failed,            // Session could not be opened or the engine reported a failure
    Aborted,           // Session closed by the caller
    Gone,              // Remote engine lost the statement
    ExecutorException, // Interrupted or unclassified local failure
}

#[derive(PartialEq)]
pub enum StateTransitionType {
    Valid,
    Invalid,
}

impl ExecutionState {
    pub fn transitions(&self) -> Vec<ExecutionState> {
        match self {
            ExecutionState::Unstarted => vec![
                ExecutionState::Running,
                ExecutionState::Failed,
                ExecutionState::ExecutorException,
            ],
            ExecutionState::Running => vec![
                ExecutionState::Succeeded,
                ExecutionState::Failed,
                ExecutionState::Aborted,
                ExecutionState::Gone,
                ExecutionState::ExecutorException,
            ],
            // Terminal states have no valid next states
            ExecutionState::Succeeded
            | ExecutionState::Failed
            | ExecutionState::Aborted
            | ExecutionState::Gone
            | ExecutionState::ExecutorException => vec![],
        }
    }

    pub fn invalid_transitions(&self) -> Vec<ExecutionState> {
        let valid = self.transitions();
        ExecutionState::iter()
            .filter(|s| *s != *self && !valid.contains(s))
            .collect()
    }

    pub fn can_transition_to(&self, next: ExecutionState) -> bool {
        self.transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::arb_state_sequence;
    use proptest::proptest;

    #[test]
    fn only_success_and_failures_are_terminal() {
        let terminal: Vec<_> = ExecutionState::iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![
                ExecutionState::Succeeded,
                ExecutionState::Failed,
                ExecutionState::Aborted,
                ExecutionState::Gone,
                ExecutionState::ExecutorException,
            ]
        );
    }

    #[test]
    fn unstarted_cannot_skip_to_aborted() {
        assert!(!ExecutionState::Unstarted.can_transition_to(ExecutionState::Aborted));
        assert!(ExecutionState::Unstarted.can_transition_to(ExecutionState::Failed));
    }

    #[test]
    fn renders_wire_names() {
        assert_eq!(ExecutionState::ExecutorException.to_string(), "EXECUTOR_EXCEPTION");
        assert_eq!(
            "GONE".parse::<ExecutionState>().unwrap(),
            ExecutionState::Gone
        );
    }

    proptest! {
        #[test]
        fn valid_sequences_end_terminal(states in arb_state_sequence(StateTransitionType::Valid)) {
            for pair in states.windows(2) {
                assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
            }
            assert!(states.last().unwrap().is_terminal());
        }

        #[test]
        fn invalid_sequences_end_with_bad_step(states in arb_state_sequence(StateTransitionType::Invalid)) {
            let n = states.len();
            assert!(n >= 2);
            assert!(!states[n - 2].can_transition_to(states[n - 1]));
        }
    }
}
