// State machines for update and change-event workflows. Transition
// legality is enforced here; the store consults these tables before
// persisting any status change.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of times a failed update may re-enter analysis.
pub const MAX_RETRIES: u32 = 3;

/// KnowledgeUpdate workflow:
/// detected -> analyzing -> {approved, failed}; approved -> updating;
/// updating -> {completed, failed}; failed -> analyzing (bounded retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Detected,
    Analyzing,
    Approved,
    Updating,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, next),
            (Detected, Analyzing)
                | (Analyzing, Approved)
                | (Analyzing, Failed)
                | (Approved, Updating)
                | (Updating, Completed)
                | (Updating, Failed)
                | (Failed, Analyzing)
        )
    }

    /// Completed is terminal; failed is terminal for pending-work purposes
    /// but may re-enter analysis under the retry cap.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }

    pub fn name(self) -> &'static str {
        match self {
            WorkflowStatus::Detected => "detected",
            WorkflowStatus::Analyzing => "analyzing",
            WorkflowStatus::Approved => "approved",
            WorkflowStatus::Updating => "updating",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detected" => Ok(WorkflowStatus::Detected),
            "analyzing" => Ok(WorkflowStatus::Analyzing),
            "approved" => Ok(WorkflowStatus::Approved),
            "updating" => Ok(WorkflowStatus::Updating),
            "completed" => Ok(WorkflowStatus::Completed),
            "failed" => Ok(WorkflowStatus::Failed),
            other => Err(format!("unknown workflow status: {}", other)),
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// ChangeEvent processing: a linear pipeline with no back-edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Detected,
    Classified,
    ImpactAssessed,
    Processed,
    Completed,
}

impl ProcessingStatus {
    pub fn next(self) -> Option<ProcessingStatus> {
        use ProcessingStatus::*;
        match self {
            Detected => Some(Classified),
            Classified => Some(ImpactAssessed),
            ImpactAssessed => Some(Processed),
            Processed => Some(Completed),
            Completed => None,
        }
    }

    pub fn can_transition_to(self, next: ProcessingStatus) -> bool {
        self.next() == Some(next)
    }

    pub fn name(self) -> &'static str {
        match self {
            ProcessingStatus::Detected => "detected",
            ProcessingStatus::Classified => "classified",
            ProcessingStatus::ImpactAssessed => "impact_assessed",
            ProcessingStatus::Processed => "processed",
            ProcessingStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_legal_transitions() {
        use WorkflowStatus::*;
        assert!(Detected.can_transition_to(Analyzing));
        assert!(Analyzing.can_transition_to(Approved));
        assert!(Analyzing.can_transition_to(Failed));
        assert!(Approved.can_transition_to(Updating));
        assert!(Updating.can_transition_to(Completed));
        assert!(Updating.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Analyzing));
    }

    #[test]
    fn test_workflow_illegal_transitions() {
        use WorkflowStatus::*;
        assert!(!Detected.can_transition_to(Completed));
        assert!(!Detected.can_transition_to(Updating));
        assert!(!Completed.can_transition_to(Analyzing));
        assert!(!Approved.can_transition_to(Approved));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn test_processing_is_linear() {
        use ProcessingStatus::*;
        let mut status = Detected;
        let expected = [Classified, ImpactAssessed, Processed, Completed];
        for next in expected {
            assert!(status.can_transition_to(next));
            assert!(!next.can_transition_to(status), "no back-edges");
            status = next;
        }
        assert_eq!(Completed.next(), None);
    }

    #[test]
    fn test_status_round_trips_through_names() {
        for status in [
            WorkflowStatus::Detected,
            WorkflowStatus::Analyzing,
            WorkflowStatus::Approved,
            WorkflowStatus::Updating,
            WorkflowStatus::Completed,
            WorkflowStatus::Failed,
        ] {
            assert_eq!(status.name().parse::<WorkflowStatus>().unwrap(), status);
        }
    }
}
