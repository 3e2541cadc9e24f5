//! State machine for one target's upload run
//!
//! `Idle → Enumerating → Uploading → Finalizing → Advanced` on success,
//! `Uploading | Finalizing → Failed` on error. An empty candidate set goes
//! straight from `Enumerating` to `Advanced`. The machine lives in memory for
//! the duration of the run; the progress marker is the only persisted state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upload run state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Idle,
    Enumerating,
    Uploading,
    Finalizing,
    Advanced,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Advanced | RunState::Failed)
    }

    fn can_transition_to(self, to: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, to),
            (Idle, Enumerating)
                | (Enumerating, Uploading)
                | (Enumerating, Advanced)
                | (Enumerating, Failed)
                | (Uploading, Finalizing)
                | (Uploading, Failed)
                | (Finalizing, Advanced)
                | (Finalizing, Failed)
        )
    }
}

/// State transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub from: RunState,
    pub to: RunState,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Tracks the state of a single target run
#[derive(Debug, Clone)]
pub struct RunStateMachine {
    target: String,
    current_state: RunState,
    transitions: Vec<StateTransition>,
    error: Option<String>,
}

impl RunStateMachine {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            current_state: RunState::Idle,
            transitions: Vec::new(),
            error: None,
        }
    }

    /// Move to `to`; illegal transitions are ignored and logged
    ///
    /// Returns whether the transition was applied.
    pub fn transition(&mut self, to: RunState) -> bool {
        self.transition_with(to, None)
    }

    /// Move to `Failed`, recording the reason
    pub fn fail(&mut self, reason: &str) -> bool {
        let applied = self.transition_with(RunState::Failed, Some(reason.to_string()));
        if applied {
            self.error = Some(reason.to_string());
        }
        applied
    }

    fn transition_with(&mut self, to: RunState, detail: Option<String>) -> bool {
        if !self.current_state.can_transition_to(to) {
            tracing::warn!(
                target_name = %self.target,
                from = ?self.current_state,
                to = ?to,
                "ignoring illegal run state transition"
            );
            return false;
        }

        tracing::debug!(target_name = %self.target, from = ?self.current_state, to = ?to, "run state");
        self.transitions.push(StateTransition {
            from: self.current_state,
            to,
            timestamp: Utc::now(),
            detail,
        });
        self.current_state = to;
        true
    }

    pub fn get_state(&self) -> RunState {
        self.current_state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn get_last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Milliseconds between the first and last transition
    pub fn get_elapsed_time(&self) -> i64 {
        match (self.transitions.first(), self.transitions.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_milliseconds(),
            _ => 0,
        }
    }

    /// Get transition history as human-readable string
    pub fn get_history(&self) -> String {
        self.transitions
            .iter()
            .map(|t| {
                let detail = t
                    .detail
                    .as_ref()
                    .map(|d| format!(" ({})", d))
                    .unwrap_or_default();
                format!("{}: {:?} → {:?}{}", t.timestamp.to_rfc3339(), t.from, t.to, detail)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_machine() {
        let machine = RunStateMachine::new("python");

        assert_eq!(machine.get_state(), RunState::Idle);
        assert!(!machine.get_state().is_terminal());
        assert!(machine.transitions().is_empty());
    }

    #[test]
    fn test_full_successful_run() {
        let mut machine = RunStateMachine::new("debian12");

        assert!(machine.transition(RunState::Enumerating));
        assert!(machine.transition(RunState::Uploading));
        assert!(machine.transition(RunState::Finalizing));
        assert!(machine.transition(RunState::Advanced));

        assert_eq!(machine.get_state(), RunState::Advanced);
        assert!(machine.get_state().is_terminal());
        assert_eq!(machine.transitions().len(), 4);
    }

    #[test]
    fn test_empty_run_skips_upload_states() {
        let mut machine = RunStateMachine::new("gems");

        machine.transition(RunState::Enumerating);
        assert!(machine.transition(RunState::Advanced));
    }

    #[test]
    fn test_fail_records_error() {
        let mut machine = RunStateMachine::new("rocky8");
        machine.transition(RunState::Enumerating);
        machine.transition(RunState::Uploading);

        assert!(machine.fail("scp exited with status 1"));

        assert_eq!(machine.get_state(), RunState::Failed);
        assert_eq!(machine.get_last_error(), Some("scp exited with status 1"));
    }

    #[test]
    fn test_illegal_transition_is_ignored() {
        let mut machine = RunStateMachine::new("python");

        assert!(!machine.transition(RunState::Advanced));
        assert_eq!(machine.get_state(), RunState::Idle);

        machine.transition(RunState::Enumerating);
        machine.transition(RunState::Advanced);
        assert!(!machine.fail("too late"));
        assert_eq!(machine.get_state(), RunState::Advanced);
    }

    #[test]
    fn test_get_history() {
        let mut machine = RunStateMachine::new("python");
        machine.transition(RunState::Enumerating);
        machine.transition(RunState::Uploading);
        machine.fail("twine exited with status 1");

        let history = machine.get_history();
        assert!(history.contains("Idle → Enumerating"));
        assert!(history.contains("Uploading → Failed (twine exited with status 1)"));
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&RunState::Finalizing).unwrap();
        assert_eq!(json, r#""FINALIZING""#);
    }
}
