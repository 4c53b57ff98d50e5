//! Import session over the import step sequence

use bulkops_core::import::{ColumnMatcher, ImportTable};
use bulkops_core::models::{
    BulkOperationMode, CompletionState, FieldMetadata, ImportConfig, IssueType, Project, StepName,
};
use bulkops_jira::{GatewayError, JiraGateway};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::event_manager::EventManager;
use crate::workflow::{StepWorkflowModel, WorkflowError};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Import data error: {0}")]
    Data(#[from] bulkops_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("No file loaded")]
    NoFile,

    #[error("No project and issue type selected")]
    NoTarget,

    #[error("Issue type {issue_type_id} is not available in project {project_key}")]
    UnknownIssueType {
        project_key: String,
        issue_type_id: String,
    },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;

pub struct ImportSession {
    gateway: Arc<dyn JiraGateway>,
    config: ImportConfig,
    workflow: StepWorkflowModel,
    table: Option<ImportTable>,
    target: Option<(Project, IssueType)>,
    fields: Vec<FieldMetadata>,
    matcher: ColumnMatcher,
}

impl ImportSession {
    pub fn new(
        gateway: Arc<dyn JiraGateway>,
        config: ImportConfig,
        events: Arc<EventManager>,
        debounce: Duration,
    ) -> Result<Self> {
        Ok(Self {
            gateway,
            config,
            workflow: StepWorkflowModel::for_mode(BulkOperationMode::Import, events, debounce)?,
            table: None,
            target: None,
            fields: Vec::new(),
            matcher: ColumnMatcher::default(),
        })
    }

    pub fn workflow(&self) -> &StepWorkflowModel {
        &self.workflow
    }

    pub fn table(&self) -> Option<&ImportTable> {
        self.table.as_ref()
    }

    pub fn matcher(&self) -> &ColumnMatcher {
        &self.matcher
    }

    pub fn fields(&self) -> &[FieldMetadata] {
        &self.fields
    }

    /// Parses file content; the upload step completes only when at least one row was read
    pub async fn load_file(&mut self, file_name: &str, content: &str) -> Result<&ImportTable> {
        self.workflow
            .set_completion_state(StepName::FileUpload, CompletionState::Incomplete)
            .await?;
        self.table = None;

        let table = ImportTable::parse(file_name, content, &self.config)?;
        if !table.skipped_rows.is_empty() {
            tracing::warn!(
                "{}: skipped rows at lines {:?}",
                file_name,
                table.skipped_rows
            );
        }
        tracing::info!("Loaded {} with {} rows", file_name, table.issue_count());

        self.workflow
            .set_completion_state(
                StepName::FileUpload,
                CompletionState::from_bool(table.issue_count() > 0),
            )
            .await?;

        if self.target.is_some() {
            self.matcher = ColumnMatcher::auto_match(&table.header, &self.fields);
        }
        let table = self.table.insert(table);
        if self.target.is_some() {
            let complete = self
                .matcher
                .all_mandatory_fields_have_column_mappings(&self.fields);
            self.workflow
                .set_completion_state(StepName::ProjectAndIssueTypeSelection, CompletionState::Complete)
                .await?;
            self.workflow
                .set_completion_state(StepName::ColumnMapping, CompletionState::from_bool(complete))
                .await?;
        }
        Ok(table)
    }

    pub async fn load_path(&mut self, path: &Path) -> Result<&ImportTable> {
        let content = tokio::fs::read_to_string(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.load_file(&file_name, &content).await
    }

    /// Fetches the creation fields of the chosen type and auto matches them to columns
    pub async fn select_target(&mut self, project_id: &str, issue_type_id: &str) -> Result<&ColumnMatcher> {
        let table = self.table.as_ref().ok_or(ImportError::NoFile)?;

        let project = self.gateway.get_project(project_id).await?;
        let issue_type = project
            .find_issue_type(issue_type_id)
            .cloned()
            .ok_or_else(|| ImportError::UnknownIssueType {
                project_key: project.key.clone(),
                issue_type_id: issue_type_id.to_string(),
            })?;

        let fields = self
            .gateway
            .get_create_field_metadata(&project.id, &issue_type.id)
            .await?;
        self.matcher = ColumnMatcher::auto_match(&table.header, &fields);
        tracing::info!(
            "Matched {} of {} fields for {} {}",
            self.matcher.matches().count(),
            fields.len(),
            project.key,
            issue_type.name
        );
        self.fields = fields;
        self.target = Some((project, issue_type));

        self.workflow
            .set_completion_state(StepName::ProjectAndIssueTypeSelection, CompletionState::Incomplete)
            .await?;
        self.workflow
            .set_completion_state(StepName::ProjectAndIssueTypeSelection, CompletionState::Complete)
            .await?;
        self.update_column_step().await?;
        Ok(&self.matcher)
    }

    pub async fn select_column(&mut self, field_key: &str, column_name: &str) -> Result<()> {
        let table = self.table.as_ref().ok_or(ImportError::NoFile)?;
        if table.column_index(column_name).is_none() {
            return Err(ImportError::UnknownColumn(column_name.to_string()));
        }
        let field = self
            .fields
            .iter()
            .find(|f| f.key == field_key)
            .ok_or_else(|| ImportError::UnknownField(field_key.to_string()))?;

        self.matcher.select_column(field, column_name);
        self.update_column_step().await
    }

    pub async fn clear_column(&mut self, field_key: &str) -> Result<()> {
        self.matcher.clear_field(field_key);
        self.update_column_step().await
    }

    async fn update_column_step(&self) -> Result<()> {
        let complete = self.target.is_some()
            && self
                .matcher
                .all_mandatory_fields_have_column_mappings(&self.fields);
        self.workflow
            .set_completion_state(StepName::ColumnMapping, CompletionState::from_bool(complete))
            .await?;
        Ok(())
    }

    pub fn field_values(&self, row_index: usize) -> Result<serde_json::Map<String, serde_json::Value>> {
        let table = self.table.as_ref().ok_or(ImportError::NoFile)?;
        Ok(table.field_values_for_row(row_index, &self.matcher)?)
    }

    /// Marks the final step complete once every earlier step is
    pub async fn signal_import_complete(&self) -> Result<bool> {
        if self.target.is_none() {
            return Err(ImportError::NoTarget);
        }
        let missing = self
            .workflow
            .incomplete_upstream_steps(StepName::ImportIssues)
            .await?;
        if !missing.is_empty() {
            tracing::warn!("Import signalled with incomplete steps: {:?}", missing);
            return Ok(false);
        }
        self.workflow
            .set_completion_state(StepName::ImportIssues, CompletionState::Complete)
            .await?;
        Ok(true)
    }
}
