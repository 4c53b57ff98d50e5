//! In-memory gateway and fixtures for unit tests

use async_trait::async_trait;
use bulkops_core::models::{
    EditableField, FieldMetadata, FieldSchema, IssueStatus, IssueType, Project, ProjectRef,
    SubtaskRef, TaskOutcome, TaskStatus, WorkItem,
};
use bulkops_jira::{
    BulkEditRequest, BulkMoveRequest, GatewayError, IssuePage, JiraGateway, ParsedQuery, Result,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn transient_error(message: &str) -> GatewayError {
    GatewayError::Server {
        status: 503,
        message: message.to_string(),
    }
}

pub fn issue_type(id: &str, name: &str, hierarchy_level: i32) -> IssueType {
    IssueType {
        id: id.to_string(),
        name: name.to_string(),
        hierarchy_level,
        subtask: hierarchy_level < 0,
    }
}

pub fn project(id: &str, key: &str, issue_types: Vec<IssueType>) -> Project {
    Project {
        id: id.to_string(),
        key: key.to_string(),
        name: format!("{} project", key),
        category: None,
        issue_types,
    }
}

pub fn project_ref(id: &str, key: &str) -> ProjectRef {
    ProjectRef {
        id: id.to_string(),
        key: key.to_string(),
        name: format!("{} project", key),
        category: None,
    }
}

pub fn work_item(id: &str, project: &ProjectRef, issue_type: &IssueType) -> WorkItem {
    WorkItem {
        id: id.to_string(),
        key: format!("{}-{}", project.key, id),
        summary: format!("Work item {}", id),
        project: project.clone(),
        issue_type: issue_type.clone(),
        status: IssueStatus {
            name: "To Do".to_string(),
            category_key: "new".to_string(),
        },
        labels: Vec::new(),
        subtasks: Vec::new(),
    }
}

pub fn with_subtasks(mut item: WorkItem, subtasks: &[&WorkItem]) -> WorkItem {
    item.subtasks = subtasks
        .iter()
        .map(|s| SubtaskRef {
            id: s.id.clone(),
            key: s.key.clone(),
        })
        .collect();
    item
}

pub fn required_field(id: &str, field_type: &str) -> FieldMetadata {
    FieldMetadata {
        id: id.to_string(),
        key: id.to_string(),
        name: id.to_string(),
        required: true,
        has_default_value: false,
        schema: FieldSchema {
            field_type: field_type.to_string(),
            ..FieldSchema::default()
        },
        allowed_values: Vec::new(),
    }
}

pub fn outcome(task_id: &str, status: TaskStatus, progress_percent: u8) -> TaskOutcome {
    TaskOutcome {
        task_id: task_id.to_string(),
        status,
        progress_percent,
        result: None,
    }
}

/// Scriptable gateway; every list is consumed front to back
#[derive(Default)]
pub struct FakeGateway {
    pub issues: Mutex<Vec<WorkItem>>,
    pub issue_delays: Mutex<HashMap<String, Duration>>,
    pub projects: Mutex<Vec<Project>>,
    pub project_failures: Mutex<u32>,
    pub project_calls: AtomicUsize,
    pub field_metadata: Mutex<HashMap<(String, String), Vec<FieldMetadata>>>,
    pub metadata_delay: Mutex<Option<Duration>>,
    pub metadata_failures: Mutex<u32>,
    pub metadata_calls: AtomicUsize,
    pub editable_fields: Mutex<Vec<EditableField>>,
    pub submit_results: Mutex<VecDeque<Result<String>>>,
    pub submit_calls: AtomicUsize,
    pub submitted_moves: Mutex<Vec<BulkMoveRequest>>,
    pub submitted_edits: Mutex<Vec<BulkEditRequest>>,
    pub outcomes: Mutex<VecDeque<Result<Option<TaskOutcome>>>>,
    pub poll_calls: AtomicUsize,
    pub parse_errors: Mutex<Vec<String>>,
    pub searched_queries: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issues(self, issues: Vec<WorkItem>) -> Self {
        *self.issues.lock().unwrap() = issues;
        self
    }

    pub fn with_projects(self, projects: Vec<Project>) -> Self {
        *self.projects.lock().unwrap() = projects;
        self
    }

    pub fn with_field_metadata(self, project_id: &str, issue_type_id: &str, fields: Vec<FieldMetadata>) -> Self {
        self.field_metadata
            .lock()
            .unwrap()
            .insert((project_id.to_string(), issue_type_id.to_string()), fields);
        self
    }

    pub fn with_outcomes(self, outcomes: Vec<Result<Option<TaskOutcome>>>) -> Self {
        *self.outcomes.lock().unwrap() = outcomes.into();
        self
    }

    pub fn with_submit_results(self, results: Vec<Result<String>>) -> Self {
        *self.submit_results.lock().unwrap() = results.into();
        self
    }

    fn next_submit_result(&self) -> Result<String> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submit_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("10641".to_string()))
    }
}

#[async_trait]
impl JiraGateway for FakeGateway {
    async fn get_issue(&self, id_or_key: &str) -> Result<WorkItem> {
        let delay = self.issue_delays.lock().unwrap().get(id_or_key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.issues
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id == id_or_key || i.key == id_or_key)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(id_or_key.to_string()))
    }

    async fn search_issues(&self, jql: &str, _page_token: Option<&str>) -> Result<IssuePage> {
        self.searched_queries.lock().unwrap().push(jql.to_string());
        Ok(IssuePage {
            items: self.issues.lock().unwrap().clone(),
            next_page_token: None,
        })
    }

    async fn get_project(&self, id_or_key: &str) -> Result<Project> {
        self.project_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.project_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(transient_error("project lookup unavailable"));
            }
        }
        self.projects
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id_or_key || p.key == id_or_key)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(id_or_key.to_string()))
    }

    async fn search_projects(&self, _query: &str) -> Result<Vec<Project>> {
        Ok(self.projects.lock().unwrap().clone())
    }

    async fn get_issue_types(&self) -> Result<Vec<IssueType>> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .iter()
            .flat_map(|p| p.issue_types.clone())
            .collect())
    }

    async fn get_create_field_metadata(&self, project_id: &str, issue_type_id: &str) -> Result<Vec<FieldMetadata>> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.metadata_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut failures = self.metadata_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(transient_error("metadata unavailable"));
            }
        }
        Ok(self
            .field_metadata
            .lock()
            .unwrap()
            .get(&(project_id.to_string(), issue_type_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_bulk_editable_fields(&self, _issue_ids: &[String]) -> Result<Vec<EditableField>> {
        Ok(self.editable_fields.lock().unwrap().clone())
    }

    async fn submit_bulk_move(&self, request: &BulkMoveRequest) -> Result<String> {
        self.submitted_moves.lock().unwrap().push(request.clone());
        self.next_submit_result()
    }

    async fn submit_bulk_edit(&self, request: &BulkEditRequest) -> Result<String> {
        self.submitted_edits.lock().unwrap().push(request.clone());
        self.next_submit_result()
    }

    async fn get_task_outcome(&self, _task_id: &str) -> Result<Option<TaskOutcome>> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn parse_query(&self, jql: &str) -> Result<ParsedQuery> {
        Ok(ParsedQuery {
            query: jql.to_string(),
            errors: self.parse_errors.lock().unwrap().clone(),
        })
    }
}
