//! Jira REST API wire types

use bulkops_core::models::{
    AllowedValue, EditableField, FieldMetadata, IssueStatus, IssueType, Project, ProjectCategory,
    ProjectRef, SubtaskRef, TaskOutcome, TaskResultSummary, TaskStatus, WorkItem,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fields requested when searching for issues
pub const ISSUE_FIELDS: [&str; 6] = ["summary", "project", "issuetype", "status", "labels", "subtasks"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraIssueType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub hierarchy_level: i32,
    #[serde(default)]
    pub subtask: bool,
}

impl From<JiraIssueType> for IssueType {
    fn from(t: JiraIssueType) -> Self {
        IssueType {
            id: t.id,
            name: t.name,
            hierarchy_level: t.hierarchy_level,
            subtask: t.subtask,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraProjectCategory {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraProject {
    pub id: String,
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub project_category: Option<JiraProjectCategory>,
    #[serde(default)]
    pub issue_types: Vec<JiraIssueType>,
}

impl From<JiraProject> for Project {
    fn from(p: JiraProject) -> Self {
        Project {
            id: p.id,
            key: p.key,
            name: p.name,
            category: p.project_category.map(|c| ProjectCategory {
                id: c.id,
                name: c.name,
            }),
            issue_types: p.issue_types.into_iter().map(IssueType::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraStatusCategory {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraStatus {
    pub name: String,
    pub status_category: JiraStatusCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraSubtask {
    pub id: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraFields {
    #[serde(default)]
    pub summary: String,
    pub project: JiraProject,
    pub issuetype: JiraIssueType,
    pub status: JiraStatus,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub subtasks: Vec<JiraSubtask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraIssue {
    pub id: String,
    pub key: String,
    pub fields: JiraFields,
}

impl From<JiraIssue> for WorkItem {
    fn from(issue: JiraIssue) -> Self {
        let project: Project = issue.fields.project.into();
        WorkItem {
            id: issue.id,
            key: issue.key,
            summary: issue.fields.summary,
            project: ProjectRef {
                id: project.id,
                key: project.key,
                name: project.name,
                category: project.category,
            },
            issue_type: issue.fields.issuetype.into(),
            status: IssueStatus {
                name: issue.fields.status.name,
                category_key: issue.fields.status.status_category.key,
            },
            labels: issue.fields.labels,
            subtasks: issue
                .fields
                .subtasks
                .into_iter()
                .map(|s| SubtaskRef { id: s.id, key: s.key })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest<'a> {
    pub jql: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<&'a str>,
    pub max_results: u32,
    pub fields: &'a [&'a str],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    #[serde(default)]
    pub issues: Vec<JiraIssue>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSearchPage {
    #[serde(default)]
    pub values: Vec<JiraProject>,
    #[serde(default = "default_true")]
    pub is_last: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMetaFieldsPage {
    #[serde(default, alias = "values")]
    pub fields: Vec<FieldMetadata>,
    #[serde(default)]
    pub start_at: usize,
    #[serde(default)]
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraFieldOption {
    pub option_id: serde_json::Value,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraBulkEditField {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub field_options: Vec<JiraFieldOption>,
}

impl From<JiraBulkEditField> for EditableField {
    fn from(f: JiraBulkEditField) -> Self {
        EditableField {
            id: f.id,
            name: f.name,
            field_type: f.field_type,
            allowed_values: f
                .field_options
                .into_iter()
                .map(|o| AllowedValue {
                    id: match o.option_id {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    },
                    name: o.value,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkEditableFieldsResponse {
    #[serde(default)]
    pub fields: Vec<JiraBulkEditField>,
    #[serde(default)]
    pub ending_before: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub task_id: String,
}

/// Body returned by GET /rest/api/3/bulk/queue/{taskId}
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTaskProgress {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub progress_percent: u8,
    #[serde(default)]
    pub processed_accessible_issues: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub failed_accessible_issues: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub total_issue_count: usize,
}

impl From<BulkTaskProgress> for TaskOutcome {
    fn from(p: BulkTaskProgress) -> Self {
        let result = if p.status.is_terminal() || p.processed_accessible_issues.is_some() {
            Some(TaskResultSummary {
                processed_issue_ids: p
                    .processed_accessible_issues
                    .unwrap_or_default()
                    .into_iter()
                    .map(|id| match id {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
                failed: p.failed_accessible_issues,
                total_issue_count: p.total_issue_count,
            })
        } else {
            None
        };

        TaskOutcome {
            task_id: p.task_id,
            status: p.status,
            progress_percent: p.progress_percent,
            result,
        }
    }
}

/// Standard Jira error body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    #[serde(default)]
    pub error_messages: Vec<String>,
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
}

impl ErrorResponse {
    pub fn into_messages(self) -> Vec<String> {
        let mut messages = self.error_messages;
        messages.extend(
            self.errors
                .into_iter()
                .map(|(field, message)| format!("{}: {}", field, message)),
        );
        messages
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParseRequest<'a> {
    pub queries: [&'a str; 1],
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedQueryWire {
    pub query: String,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParseResponse {
    #[serde(default)]
    pub queries: Vec<ParsedQueryWire>,
}
