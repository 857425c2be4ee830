//! Run lifecycle:
//! Planning → Generating → Validating → (Retrying ⇄ Generating) → Composing → Finalizing → Done,
//! with Failed reachable from every non-terminal state.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Planning,
    Generating,
    Validating,
    Retrying,
    Composing,
    Finalizing,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn can_move_to(self, next: RunState) -> bool {
        use RunState::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Planning, Generating)
                | (Generating, Validating)
                | (Validating, Retrying)
                | (Validating, Composing)
                | (Retrying, Generating)
                | (Composing, Finalizing)
                | (Finalizing, Done)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("illegal run transition {from:?} → {to:?}")]
pub struct IllegalTransition {
    pub from: RunState,
    pub to: RunState,
}

#[derive(Debug, Clone)]
pub struct RunStateMachine {
    design_id: String,
    state: RunState,
    history: Vec<RunState>,
}

impl RunStateMachine {
    pub fn new(design_id: impl Into<String>) -> Self {
        Self {
            design_id: design_id.into(),
            state: RunState::Planning,
            history: vec![RunState::Planning],
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn transition(&mut self, next: RunState) -> Result<(), IllegalTransition> {
        if !self.state.can_move_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        info!(design_id = %self.design_id, from = ?self.state, to = ?next, "run state");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Moves to `Failed` unless the run already ended.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            let _ = self.transition(RunState::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RunState::*;

    #[test]
    fn test_happy_path_with_one_retry() {
        let mut sm = RunStateMachine::new("d");
        for s in [Generating, Validating, Retrying, Generating, Validating, Composing, Finalizing, Done] {
            sm.transition(s).unwrap();
        }
        assert_eq!(sm.state(), Done);
        assert_eq!(sm.history().len(), 9);
    }

    #[test]
    fn test_skipping_validation_is_illegal() {
        let mut sm = RunStateMachine::new("d");
        sm.transition(Generating).unwrap();
        let err = sm.transition(Composing).unwrap_err();
        assert_eq!(err.from, Generating);
        assert_eq!(sm.state(), Generating);
    }

    #[test]
    fn test_failed_reachable_from_any_live_state() {
        for path in [vec![], vec![Generating], vec![Generating, Validating, Composing]] {
            let mut sm = RunStateMachine::new("d");
            for s in path {
                sm.transition(s).unwrap();
            }
            sm.fail();
            assert_eq!(sm.state(), Failed);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut sm = RunStateMachine::new("d");
        sm.fail();
        assert!(sm.transition(Generating).is_err());
        sm.fail();
        assert_eq!(sm.history(), &[Planning, Failed]);
    }
}
