pub mod adf;
pub mod config;
pub mod field;
pub mod issue;
pub mod selection;
pub mod step;
pub mod task;

pub use adf::{text_to_adf, AdfDocument};
pub use config::{
    AllowedIssueTypeMapping, BulkOperationRules, Config, ImportConfig, IssueTypeMappingStrategy,
    JiraConfig, LoggingConfig, SubtaskMoveStrategy, TaskConfig, WorkflowConfig,
};
pub use field::{
    AllowedValue, DefaultFieldValue, EditValue, EditableField, FieldMappingInfo, FieldMetadata,
    FieldSchema, FieldShape, TargetFieldValue,
};
pub use issue::{
    count_issue_types, count_projects, IssueStatus, IssueType, Project, ProjectCategory,
    ProjectRef, SubtaskRef, WorkItem,
};
pub use selection::{IssueSelectionState, SelectionValidity};
pub use step::{BulkOperationMode, CompletionState, StepName};
pub use task::{
    OperationOutcome, OutcomeError, SubmissionOutcome, TaskOutcome, TaskResultSummary, TaskStatus,
};
