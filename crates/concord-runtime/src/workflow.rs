use std::fmt;

use serde::{Deserialize, Serialize};

/// A deterministic identifier for a workflow run — the same inputs always
/// produce the same id, so a second trigger for work already in flight
/// coalesces onto the original run instead of starting a duplicate (§4.5
/// invariant: "idempotent workflow IDs").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn single_issue_sync(project: &str, issue: &str) -> Self {
        Self(format!("single-issue-sync:{project}:{issue}"))
    }

    pub fn project_sync(project: &str) -> Self {
        Self(format!("project-sync:{project}"))
    }

    pub fn full_orchestration(tick: &str) -> Self {
        Self(format!("full-orchestration:{tick}"))
    }

    pub fn data_reconciliation(project: &str) -> Self {
        Self(format!("data-reconciliation:{project}"))
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowState::Pending => "pending",
            WorkflowState::Running => "running",
            WorkflowState::Completed => "completed",
            WorkflowState::Failed => "failed",
            WorkflowState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("invalid transition: cannot apply {event} in state {state}")]
    InvalidTransition { state: WorkflowState, event: &'static str },
    #[error("workflow cancelled")]
    Cancelled,
    #[error("workflow timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

/// Minimal deterministic state machine every workflow transitions through.
/// Transition history is retained for replay/debugging, mirroring the
/// teacher's agent state machine (§4.5).
#[derive(Debug, Clone)]
pub struct WorkflowStateMachine {
    current: WorkflowState,
    history: Vec<(WorkflowState, WorkflowState)>,
}

impl WorkflowStateMachine {
    pub fn new() -> Self {
        Self {
            current: WorkflowState::Pending,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.current
    }

    pub fn start(&mut self) -> Result<(), WorkflowError> {
        self.transition(WorkflowState::Running, "start")
    }

    pub fn complete(&mut self) -> Result<(), WorkflowError> {
        self.transition(WorkflowState::Completed, "complete")
    }

    pub fn fail(&mut self) -> Result<(), WorkflowError> {
        self.transition(WorkflowState::Failed, "fail")
    }

    pub fn cancel(&mut self) -> Result<(), WorkflowError> {
        self.transition(WorkflowState::Cancelled, "cancel")
    }

    fn transition(&mut self, next: WorkflowState, event: &'static str) -> Result<(), WorkflowError> {
        let allowed = matches!(
            (self.current, next),
            (WorkflowState::Pending, WorkflowState::Running)
                | (WorkflowState::Running, WorkflowState::Completed)
                | (WorkflowState::Running, WorkflowState::Failed)
                | (WorkflowState::Running, WorkflowState::Cancelled)
                | (WorkflowState::Pending, WorkflowState::Cancelled)
        );
        if !allowed {
            return Err(WorkflowError::InvalidTransition {
                state: self.current,
                event,
            });
        }
        self.history.push((self.current, next));
        self.current = next;
        Ok(())
    }
}

impl Default for WorkflowStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_id_is_deterministic() {
        assert_eq!(
            WorkflowId::single_issue_sync("PROJ", "PROJ-1"),
            WorkflowId::single_issue_sync("PROJ", "PROJ-1")
        );
    }

    #[test]
    fn different_issues_produce_different_ids() {
        assert_ne!(
            WorkflowId::single_issue_sync("PROJ", "PROJ-1"),
            WorkflowId::single_issue_sync("PROJ", "PROJ-2")
        );
    }

    #[test]
    fn valid_lifecycle_transitions() {
        let mut sm = WorkflowStateMachine::new();
        sm.start().unwrap();
        assert_eq!(sm.state(), WorkflowState::Running);
        sm.complete().unwrap();
        assert_eq!(sm.state(), WorkflowState::Completed);
    }

    #[test]
    fn cannot_complete_before_starting() {
        let mut sm = WorkflowStateMachine::new();
        assert!(sm.complete().is_err());
    }

    #[test]
    fn cannot_restart_completed_workflow() {
        let mut sm = WorkflowStateMachine::new();
        sm.start().unwrap();
        sm.complete().unwrap();
        assert!(sm.start().is_err());
    }

    #[test]
    fn pending_workflow_can_be_cancelled() {
        let mut sm = WorkflowStateMachine::new();
        sm.cancel().unwrap();
        assert_eq!(sm.state(), WorkflowState::Cancelled);
    }
}
