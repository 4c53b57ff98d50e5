//! Workflow steps and operation modes

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkOperationMode {
    Move,
    Edit,
    Import,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    Filter,
    IssueSelection,
    TargetProjectSelection,
    IssueTypeMapping,
    FieldMapping,
    EditFields,
    MoveOrEdit,
    FileUpload,
    ProjectAndIssueTypeSelection,
    ColumnMapping,
    ImportIssues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompletionState {
    #[default]
    Incomplete,
    Complete,
}

impl CompletionState {
    pub fn from_bool(complete: bool) -> Self {
        if complete {
            CompletionState::Complete
        } else {
            CompletionState::Incomplete
        }
    }

    pub fn is_complete(&self) -> bool {
        *self == CompletionState::Complete
    }
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Filter => "filter",
            StepName::IssueSelection => "issue-selection",
            StepName::TargetProjectSelection => "target-project-selection",
            StepName::IssueTypeMapping => "issue-type-mapping",
            StepName::FieldMapping => "field-mapping",
            StepName::EditFields => "edit-fields",
            StepName::MoveOrEdit => "move-or-edit",
            StepName::FileUpload => "file-upload",
            StepName::ProjectAndIssueTypeSelection => "project-and-issue-type-selection",
            StepName::ColumnMapping => "column-mapping",
            StepName::ImportIssues => "import-issues",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BulkOperationMode {
    /// Ordered steps a given mode must complete before execution
    pub fn step_sequence(&self) -> Vec<StepName> {
        match self {
            BulkOperationMode::Move => vec![
                StepName::Filter,
                StepName::IssueSelection,
                StepName::TargetProjectSelection,
                StepName::IssueTypeMapping,
                StepName::FieldMapping,
                StepName::MoveOrEdit,
            ],
            BulkOperationMode::Edit => vec![
                StepName::Filter,
                StepName::IssueSelection,
                StepName::EditFields,
                StepName::MoveOrEdit,
            ],
            BulkOperationMode::Import => vec![
                StepName::FileUpload,
                StepName::ProjectAndIssueTypeSelection,
                StepName::ColumnMapping,
                StepName::ImportIssues,
            ],
        }
    }
}
