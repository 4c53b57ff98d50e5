use bulkops_core::models::{CompletionState, StepName, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum BulkOpsEvent {
    Workflow(WorkflowEvent),
    Mapping(MappingEvent),
    Task(TaskEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub model: String,
    pub event_type: WorkflowEventType,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEventType {
    StepChanged {
        step: StepName,
        state: CompletionState,
    },
    /// Debounced; carries the model timestamp at delivery
    ModelUpdated { updated_at: DateTime<Utc> },
}

impl WorkflowEvent {
    pub fn step_changed(model: &str, step: StepName, state: CompletionState) -> Self {
        Self {
            model: model.to_string(),
            event_type: WorkflowEventType::StepChanged { step, state },
            timestamp: Utc::now(),
        }
    }

    pub fn model_updated(model: &str, updated_at: DateTime<Utc>) -> Self {
        Self {
            model: model.to_string(),
            event_type: WorkflowEventType::ModelUpdated { updated_at },
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingEvent {
    pub event_type: MappingEventType,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MappingEventType {
    AutoMapped {
        original_count: u64,
        new_count: u64,
        unmapped: usize,
    },
    Mapped {
        source_project_id: String,
        source_issue_type_id: String,
        target_issue_type_id: String,
    },
    Cleared,
    /// Deferred step notification that survived the staleness check
    StepNotified {
        selection_uuid: Option<Uuid>,
        all_mapped: bool,
    },
}

impl MappingEvent {
    pub fn new(event_type: MappingEventType) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub event_type: TaskEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEventType {
    Submitted,
    Rejected { status_code: u16, messages: Vec<String> },
    Progress { status: TaskStatus, progress_percent: u8 },
    Finished { status: TaskStatus },
    Abandoned,
}

impl TaskEvent {
    pub fn submitted(task_id: String) -> Self {
        Self {
            event_type: TaskEventType::Submitted,
            task_id: Some(task_id),
            timestamp: Utc::now(),
        }
    }

    pub fn rejected(status_code: u16, messages: Vec<String>) -> Self {
        Self {
            event_type: TaskEventType::Rejected {
                status_code,
                messages,
            },
            task_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn progress(task_id: String, status: TaskStatus, progress_percent: u8) -> Self {
        Self {
            event_type: TaskEventType::Progress {
                status,
                progress_percent,
            },
            task_id: Some(task_id),
            timestamp: Utc::now(),
        }
    }

    pub fn finished(task_id: String, status: TaskStatus) -> Self {
        Self {
            event_type: TaskEventType::Finished { status },
            task_id: Some(task_id),
            timestamp: Utc::now(),
        }
    }

    pub fn abandoned(task_id: String) -> Self {
        Self {
            event_type: TaskEventType::Abandoned,
            task_id: Some(task_id),
            timestamp: Utc::now(),
        }
    }
}
