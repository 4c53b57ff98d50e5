//! Long running bulk task outcomes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status of a server side bulk task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Enqueued,
    Running,
    Complete,
    Failed,
    CancelRequested,
    Cancelled,
    Dead,
}

impl TaskStatus {
    /// Every status other than ENQUEUED and RUNNING ends polling
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Enqueued | TaskStatus::Running)
    }

    pub fn is_success(&self) -> bool {
        *self == TaskStatus::Complete
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Enqueued => "ENQUEUED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Complete => "COMPLETE",
            TaskStatus::Failed => "FAILED",
            TaskStatus::CancelRequested => "CANCEL_REQUESTED",
            TaskStatus::Cancelled => "CANCELLED",
            TaskStatus::Dead => "DEAD",
        }
    }
}

/// Summary the platform attaches once a task has finished
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResultSummary {
    #[serde(default)]
    pub processed_issue_ids: Vec<String>,
    /// Failure messages keyed by issue id
    #[serde(default)]
    pub failed: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub total_issue_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub progress_percent: u8,
    #[serde(default)]
    pub result: Option<TaskResultSummary>,
}

impl TaskOutcome {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Human readable failure messages, one per failed issue message
    pub fn failure_messages(&self) -> Vec<String> {
        match &self.result {
            Some(summary) => summary
                .failed
                .iter()
                .flat_map(|(issue_id, messages)| {
                    messages.iter().map(move |m| format!("{}: {}", issue_id, m))
                })
                .collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub message: String,
}

impl OutcomeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of initiating a bulk move or edit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    pub task_id: Option<String>,
    #[serde(default)]
    pub errors: Vec<OutcomeError>,
    pub status_code: Option<u16>,
}

impl SubmissionOutcome {
    pub fn accepted(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            errors: Vec::new(),
            status_code: None,
        }
    }

    pub fn rejected(status_code: u16, messages: Vec<String>) -> Self {
        Self {
            task_id: None,
            errors: messages.into_iter().map(OutcomeError::new).collect(),
            status_code: Some(status_code),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.task_id.is_some() && self.errors.is_empty()
    }
}

/// Outcome of a pure validation check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<OutcomeError>,
}

impl OperationOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![OutcomeError::new(message)],
        }
    }
}
