//! The collaborator seam the engine talks to

use crate::bulk::{BulkEditRequest, BulkMoveRequest};
use crate::error::Result;
use async_trait::async_trait;
use bulkops_core::models::{EditableField, FieldMetadata, IssueType, Project, TaskOutcome, WorkItem};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssuePage {
    pub items: Vec<WorkItem>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub query: String,
    pub errors: Vec<String>,
}

impl ParsedQuery {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Work item, project and bulk task operations against the platform
#[async_trait]
pub trait JiraGateway: Send + Sync {
    async fn get_issue(&self, id_or_key: &str) -> Result<WorkItem>;

    async fn search_issues(&self, jql: &str, page_token: Option<&str>) -> Result<IssuePage>;

    async fn get_project(&self, id_or_key: &str) -> Result<Project>;

    async fn search_projects(&self, query: &str) -> Result<Vec<Project>>;

    async fn get_issue_types(&self) -> Result<Vec<IssueType>>;

    /// Creation metadata for the fields of one issue type in one project
    async fn get_create_field_metadata(
        &self,
        project_id: &str,
        issue_type_id: &str,
    ) -> Result<Vec<FieldMetadata>>;

    async fn get_bulk_editable_fields(&self, issue_ids: &[String]) -> Result<Vec<EditableField>>;

    /// Returns the id of the queued task
    async fn submit_bulk_move(&self, request: &BulkMoveRequest) -> Result<String>;

    /// Returns the id of the queued task
    async fn submit_bulk_edit(&self, request: &BulkEditRequest) -> Result<String>;

    /// `None` while the outcome is not yet available
    async fn get_task_outcome(&self, task_id: &str) -> Result<Option<TaskOutcome>>;

    async fn parse_query(&self, jql: &str) -> Result<ParsedQuery>;
}

/// Follows search pages until exhausted or `limit` items are collected
pub async fn collect_issues(gateway: &dyn JiraGateway, jql: &str, limit: usize) -> Result<Vec<WorkItem>> {
    let mut items = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = gateway.search_issues(jql, page_token.as_deref()).await?;
        items.extend(page.items);
        debug!("Collected {} issues so far", items.len());

        if items.len() >= limit {
            items.truncate(limit);
            break;
        }
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(items)
}
