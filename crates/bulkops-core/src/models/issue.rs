//! Work item, project and issue type snapshots

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Issue type as referenced by work items and projects
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct IssueType {
    pub id: String,
    pub name: String,
    /// 0 for standard issue types, -1 for subtasks, 1 and above for epics and beyond
    pub hierarchy_level: i32,
    #[serde(default)]
    pub subtask: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ProjectCategory {
    pub id: String,
    pub name: String,
}

/// Lightweight project reference carried by a work item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ProjectRef {
    pub id: String,
    pub key: String,
    pub name: String,
    pub category: Option<ProjectCategory>,
}

/// Project with the issue types it offers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub key: String,
    pub name: String,
    pub category: Option<ProjectCategory>,
    #[serde(default)]
    pub issue_types: Vec<IssueType>,
}

impl Project {
    pub fn to_ref(&self) -> ProjectRef {
        ProjectRef {
            id: self.id.clone(),
            key: self.key.clone(),
            name: self.name.clone(),
            category: self.category.clone(),
        }
    }

    pub fn find_issue_type(&self, issue_type_id: &str) -> Option<&IssueType> {
        self.issue_types.iter().find(|t| t.id == issue_type_id)
    }

    pub fn find_issue_type_by_name(&self, name: &str) -> Option<&IssueType> {
        self.issue_types.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueStatus {
    pub name: String,
    /// Status category key, e.g. "new", "indeterminate" or "done"
    pub category_key: String,
}

impl IssueStatus {
    pub fn is_done(&self) -> bool {
        self.category_key == "done"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubtaskRef {
    pub id: String,
    pub key: String,
}

/// Immutable snapshot of an issue as returned by the platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkItem {
    pub id: String,
    pub key: String,
    pub summary: String,
    pub project: ProjectRef,
    pub issue_type: IssueType,
    pub status: IssueStatus,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub subtasks: Vec<SubtaskRef>,
}

impl WorkItem {
    pub fn has_subtasks(&self) -> bool {
        !self.subtasks.is_empty()
    }

    /// Key of the project the issue key belongs to, e.g. "ABC" for "ABC-12"
    pub fn project_key_from_issue_key(&self) -> &str {
        self.key.split('-').next().unwrap_or(&self.key)
    }
}

/// Number of distinct projects across the items
pub fn count_projects(items: &[WorkItem]) -> usize {
    items
        .iter()
        .map(|item| item.project.id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Number of distinct issue types across the items
pub fn count_issue_types(items: &[WorkItem]) -> usize {
    items
        .iter()
        .map(|item| item.issue_type.id.as_str())
        .collect::<HashSet<_>>()
        .len()
}
