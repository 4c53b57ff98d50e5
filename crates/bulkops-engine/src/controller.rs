//! Bulk move and bulk edit controllers
//!
//! Each controller owns one workflow model and wires the selection, the
//! resolvers and the task orchestrator to its steps.

use bulkops_core::models::{
    BulkOperationMode, CompletionState, Config, DefaultFieldValue, EditValue, EditableField,
    IssueSelectionState, OperationOutcome, Project, SelectionValidity, StepName,
    SubmissionOutcome, SubtaskMoveStrategy, TaskOutcome, WorkItem,
};
use bulkops_core::selection::build_selection;
use bulkops_core::RuleEnforcer;
use bulkops_jira::{
    collect_issues, BulkEditRequest, GatewayError, JiraGateway, TargetMandatoryFields,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::event_manager::EventManager;
use crate::fields::{FieldResolverError, TargetFieldResolver};
use crate::generation::GenerationTracker;
use crate::mapping::{AutoMapReport, IssueTypeMappingResolver, MappingError};
use crate::orchestrator::{BulkRequest, OrchestratorError, PollHandle, TaskOrchestrator};
use crate::payload::{build_move_request, EditRequestBuilder, PayloadError};
use crate::retry::retry_transient;
use crate::selection::expand_with_subtasks;
use crate::workflow::{StepWorkflowModel, WorkflowError};

/// Upper bound on the issues a search collects
pub const SEARCH_LIMIT: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Field error: {0}")]
    Fields(#[from] FieldResolverError),

    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    #[error("Task error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Invalid query: {}", .0.join("; "))]
    InvalidQuery(Vec<String>),

    #[error("Destination project {0} does not exist")]
    DestinationProjectNotFound(String),

    #[error("Project {0} is not a valid target for the selected work items")]
    TargetProjectNotAllowed(String),

    #[error("No target project selected")]
    NoTargetProject,

    #[error("Work item {0} is not part of the selection")]
    NotInSelection(String),

    #[error("Issue type {0} is not available in the target project")]
    UnknownTargetIssueType(String),

    #[error("Field {0} can not be bulk edited")]
    UnknownField(String),

    #[error("Selection was replaced by a newer one")]
    SelectionSuperseded,

    #[error("Steps not complete: {}", .0.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "))]
    StepsIncomplete(Vec<StepName>),
}

pub type Result<T> = std::result::Result<T, ControllerError>;

/// Augments, validates and runs a query, completing the filter step on success
async fn run_search(
    gateway: &dyn JiraGateway,
    rules: &RuleEnforcer,
    workflow: &StepWorkflowModel,
    jql: &str,
    mode: BulkOperationMode,
) -> Result<Vec<WorkItem>> {
    let augmented = rules.augment_query(jql, mode);
    let parsed = gateway.parse_query(&augmented).await?;
    if !parsed.is_valid() {
        workflow
            .set_completion_state(StepName::Filter, CompletionState::Incomplete)
            .await?;
        return Err(ControllerError::InvalidQuery(parsed.errors));
    }

    let items = collect_issues(gateway, &augmented, SEARCH_LIMIT).await?;
    tracing::info!("Query matched {} work items", items.len());
    workflow
        .set_completion_state(StepName::Filter, CompletionState::Complete)
        .await?;
    Ok(items)
}

async fn ensure_upstream_complete(workflow: &StepWorkflowModel, step: StepName) -> Result<()> {
    let missing = workflow.incomplete_upstream_steps(step).await?;
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ControllerError::StepsIncomplete(missing))
    }
}

/// Waits for a task and completes the final step when it succeeded
async fn await_and_complete(
    orchestrator: &TaskOrchestrator,
    workflow: &StepWorkflowModel,
    task_id: &str,
    cancel: CancellationToken,
) -> Result<Option<TaskOutcome>> {
    let outcome = orchestrator.await_completion(task_id, cancel).await?;
    if let Some(outcome) = &outcome {
        workflow
            .set_completion_state(
                StepName::MoveOrEdit,
                CompletionState::from_bool(outcome.status.is_success()),
            )
            .await?;
        for message in outcome.failure_messages() {
            tracing::warn!("Task {}: {}", task_id, message);
        }
    }
    Ok(outcome)
}

pub struct BulkMoveController {
    gateway: Arc<dyn JiraGateway>,
    rules: Arc<RuleEnforcer>,
    workflow: StepWorkflowModel,
    generations: GenerationTracker,
    selection_requests: GenerationTracker,
    mappings: IssueTypeMappingResolver,
    fields: TargetFieldResolver,
    orchestrator: TaskOrchestrator,
    metadata_retry_limit: u32,
    metadata_retry_delay: Duration,
    selection: Arc<RwLock<IssueSelectionState>>,
    in_play: Arc<RwLock<Vec<WorkItem>>>,
    target_project: Arc<RwLock<Option<Project>>>,
}

impl BulkMoveController {
    pub fn new(gateway: Arc<dyn JiraGateway>, config: &Config, events: Arc<EventManager>) -> Result<Self> {
        let rules = Arc::new(RuleEnforcer::new(config.rules.clone()));
        let generations = GenerationTracker::new();
        let workflow = StepWorkflowModel::for_mode(
            BulkOperationMode::Move,
            events.clone(),
            Duration::from_millis(config.workflow.debounce_ms),
        )?;
        let mappings = IssueTypeMappingResolver::new(
            rules.clone(),
            generations.clone(),
            events.clone(),
            Duration::from_millis(config.workflow.mapping_notification_delay_ms),
        );
        let fields = TargetFieldResolver::new(gateway.clone(), generations.clone())
            .with_retry(
                config.tasks.metadata_retry_limit,
                Duration::from_millis(config.tasks.metadata_retry_delay_ms),
            )
            .with_unsupported_fields_shown(config.workflow.show_unsupported_fields);
        let orchestrator = TaskOrchestrator::new(gateway.clone(), events, &config.tasks);

        Ok(Self {
            gateway,
            rules,
            workflow,
            generations,
            selection_requests: GenerationTracker::new(),
            mappings,
            fields,
            orchestrator,
            metadata_retry_limit: config.tasks.metadata_retry_limit,
            metadata_retry_delay: Duration::from_millis(config.tasks.metadata_retry_delay_ms),
            selection: Arc::new(RwLock::new(IssueSelectionState::empty())),
            in_play: Arc::new(RwLock::new(Vec::new())),
            target_project: Arc::new(RwLock::new(None)),
        })
    }

    pub fn workflow(&self) -> &StepWorkflowModel {
        &self.workflow
    }

    pub fn mappings(&self) -> &IssueTypeMappingResolver {
        &self.mappings
    }

    pub fn fields(&self) -> &TargetFieldResolver {
        &self.fields
    }

    pub fn rules(&self) -> &RuleEnforcer {
        &self.rules
    }

    pub async fn search(&self, jql: &str) -> Result<Vec<WorkItem>> {
        run_search(
            self.gateway.as_ref(),
            &self.rules,
            &self.workflow,
            jql,
            BulkOperationMode::Move,
        )
        .await
    }

    pub async fn selection(&self) -> IssueSelectionState {
        self.selection.read().await.clone()
    }

    /// Items the move will carry: the selection plus subtasks when they move explicitly
    pub async fn in_play_items(&self) -> Vec<WorkItem> {
        self.in_play.read().await.clone()
    }

    pub async fn target_project(&self) -> Option<Project> {
        self.target_project.read().await.clone()
    }

    /// Replaces the selection and invalidates everything derived from the previous one.
    ///
    /// A call overtaken by a newer one while fetching subtasks writes nothing and
    /// fails with [`ControllerError::SelectionSuperseded`].
    pub async fn set_selection(&self, items: Vec<WorkItem>) -> Result<IssueSelectionState> {
        let state = build_selection(items, BulkOperationMode::Move, self.rules.rules());
        let request = self.selection_requests.advance();
        self.generations.advance();

        let in_play = match self.rules.rules().subtask_move_strategy {
            SubtaskMoveStrategy::MoveSubtasksExplicitlyWithParents if state.is_valid() => {
                expand_with_subtasks(self.gateway.as_ref(), &state.items).await
            }
            _ => state.items.clone(),
        };
        if !self.selection_requests.is_current(request) {
            tracing::debug!("Dropping selection of {} items, a newer one was set", state.items.len());
            return Err(ControllerError::SelectionSuperseded);
        }

        if !state.is_valid() {
            tracing::info!("Selection invalid: {}", state.validity.describe());
        }
        *self.selection.write().await = state.clone();
        *self.in_play.write().await = in_play;

        self.workflow
            .set_completion_state(StepName::IssueSelection, CompletionState::Incomplete)
            .await?;
        if state.is_valid() {
            self.workflow
                .set_completion_state(StepName::IssueSelection, CompletionState::Complete)
                .await?;
            self.recheck_target_project(&state.items).await?;
        }
        Ok(state)
    }

    /// Keeps the chosen target when it still fits a new selection and remaps against it
    async fn recheck_target_project(&self, items: &[WorkItem]) -> Result<()> {
        let Some(project) = self.target_project().await else {
            return Ok(());
        };
        if self
            .rules
            .filter_target_projects(items, vec![project.clone()])
            .is_empty()
        {
            tracing::info!("Target project {} does not fit the new selection", project.key);
            *self.target_project.write().await = None;
            self.mappings.clear().await;
            return Ok(());
        }

        self.workflow
            .set_completion_state(StepName::TargetProjectSelection, CompletionState::Complete)
            .await?;
        self.remap().await?;
        Ok(())
    }

    /// Candidate target projects for the current selection
    pub async fn target_project_candidates(&self, query: &str) -> Result<Vec<Project>> {
        let candidates = self.gateway.search_projects(query).await?;
        let items = self.selection.read().await.items.clone();
        Ok(self.rules.filter_target_projects(&items, candidates))
    }

    pub async fn set_target_project(&self, project_id: &str) -> Result<AutoMapReport> {
        let project = self.gateway.get_project(project_id).await?;
        let items = self.selection.read().await.items.clone();
        let allowed = self
            .rules
            .filter_target_projects(&items, vec![project.clone()]);
        if allowed.is_empty() {
            self.workflow
                .set_completion_state(StepName::TargetProjectSelection, CompletionState::Incomplete)
                .await?;
            return Err(ControllerError::TargetProjectNotAllowed(project.key));
        }

        tracing::info!("Target project set to {}", project.key);
        *self.target_project.write().await = Some(project);
        self.workflow
            .set_completion_state(StepName::TargetProjectSelection, CompletionState::Incomplete)
            .await?;
        self.workflow
            .set_completion_state(StepName::TargetProjectSelection, CompletionState::Complete)
            .await?;
        self.remap().await
    }

    /// Clears and auto maps, then schedules the mapping step update and refreshes fields
    async fn remap(&self) -> Result<AutoMapReport> {
        let generation = self.generations.advance();
        let project = self
            .target_project
            .read()
            .await
            .clone()
            .ok_or(ControllerError::NoTargetProject)?;
        let items = self.in_play_items().await;

        self.mappings.clear().await;
        let report = self.mappings.auto_map(&items, &project).await;
        tracing::info!(
            "Auto mapping: {} -> {}, {} unmapped",
            report.original_count,
            report.new_count,
            report.unmapped.len()
        );

        let selection_uuid = Some(self.selection.read().await.uuid);
        self.mappings
            .schedule_step_notification(generation, self.workflow.clone(), items, selection_uuid);
        self.refresh_field_mappings().await?;
        Ok(report)
    }

    pub async fn map_issue_type(
        &self,
        source_project_id: &str,
        source_issue_type_id: &str,
        target_issue_type_id: &str,
    ) -> Result<()> {
        let project = self
            .target_project()
            .await
            .ok_or(ControllerError::NoTargetProject)?;
        let target = project
            .find_issue_type(target_issue_type_id)
            .cloned()
            .ok_or_else(|| ControllerError::UnknownTargetIssueType(target_issue_type_id.to_string()))?;

        let items = self.in_play_items().await;
        let pair = IssueTypeMappingResolver::source_pairs(&items)
            .into_iter()
            .find(|p| p.project.id == source_project_id && p.issue_type.id == source_issue_type_id)
            .ok_or_else(|| {
                ControllerError::NotInSelection(format!("{}/{}", source_project_id, source_issue_type_id))
            })?;

        self.mappings.map_issue_type(&pair, &target).await?;
        let all_mapped = self.mappings.are_all_issue_types_mapped(&items).await;
        self.workflow
            .set_completion_state(StepName::IssueTypeMapping, CompletionState::from_bool(all_mapped))
            .await?;
        self.refresh_field_mappings().await?;
        Ok(())
    }

    /// Re-derives the mandatory fields for the mapped target types
    pub async fn refresh_field_mappings(&self) -> Result<bool> {
        let generation = self.generations.current();
        let project = self
            .target_project()
            .await
            .ok_or(ControllerError::NoTargetProject)?;
        let target_ids = self.mappings.snapshot().await.target_issue_type_ids();

        let refreshed = self.fields.refresh(&project.id, &target_ids, generation).await?;
        if refreshed {
            self.update_field_step().await?;
        }
        Ok(refreshed)
    }

    async fn update_field_step(&self) -> Result<()> {
        let mapped = self.mappings.are_all_issue_types_mapped(&self.in_play_items().await).await;
        let complete = mapped && self.fields.are_all_field_values_set().await;
        self.workflow
            .set_completion_state(StepName::FieldMapping, CompletionState::from_bool(complete))
            .await?;
        Ok(())
    }

    pub async fn select_default_value(&self, issue_type_id: &str, field_id: &str, value: DefaultFieldValue) -> Result<()> {
        self.fields
            .on_select_default_value(issue_type_id, field_id, value)
            .await?;
        self.update_field_step().await
    }

    pub async fn select_text_value(&self, issue_type_id: &str, field_id: &str, text: &str) -> Result<()> {
        self.fields
            .on_select_text_value(issue_type_id, field_id, text)
            .await?;
        self.update_field_step().await
    }

    pub async fn deselect_default_value(&self, issue_type_id: &str, field_id: &str) -> Result<()> {
        self.fields
            .on_deselect_default_value(issue_type_id, field_id)
            .await?;
        self.update_field_step().await
    }

    pub async fn retain_field_value(&self, issue_type_id: &str, field_id: &str, retain: bool) -> Result<()> {
        self.fields
            .on_select_retain_field_value(issue_type_id, field_id, retain)
            .await?;
        self.update_field_step().await
    }

    /// Builds and submits a move of `items` to the destination project
    pub async fn initiate_bulk_move(
        &self,
        destination_project_id: &str,
        items: &[WorkItem],
        field_defaults_by_target_type: &HashMap<String, TargetMandatoryFields>,
        send_bulk_notification: bool,
    ) -> Result<SubmissionOutcome> {
        let gateway = self.gateway.as_ref();
        let what = format!("destination project {}", destination_project_id);
        let lookup = retry_transient(self.metadata_retry_limit, self.metadata_retry_delay, &what, move || {
            gateway.get_project(destination_project_id)
        })
        .await;
        match lookup {
            Ok(_) => {}
            Err(GatewayError::NotFound(_)) => {
                return Err(ControllerError::DestinationProjectNotFound(
                    destination_project_id.to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        }

        let mapping = self.mappings.snapshot().await;
        let build = build_move_request(
            destination_project_id,
            items,
            &mapping,
            field_defaults_by_target_type,
            send_bulk_notification,
        )?;
        for skipped in &build.skipped {
            tracing::warn!(
                "Issue {} moves to {} only; {} was ignored",
                skipped.issue_id,
                skipped.kept_target,
                skipped.rejected_target
            );
        }

        Ok(self.orchestrator.submit(&BulkRequest::Move(build.request)).await)
    }

    /// Submits the move described by the completed steps
    pub async fn execute(&self, send_bulk_notification: bool) -> Result<SubmissionOutcome> {
        ensure_upstream_complete(&self.workflow, StepName::MoveOrEdit).await?;
        let project = self
            .target_project()
            .await
            .ok_or(ControllerError::NoTargetProject)?;
        let items = self.in_play_items().await;
        let defaults = self.fields.field_defaults_by_target_type().await;

        self.initiate_bulk_move(&project.id, &items, &defaults, send_bulk_notification)
            .await
    }

    pub async fn poll_outcome(&self, task_id: &str) -> Result<Option<TaskOutcome>> {
        Ok(self.orchestrator.poll_outcome(task_id).await?)
    }

    pub async fn await_task(&self, task_id: &str, cancel: CancellationToken) -> Result<Option<TaskOutcome>> {
        await_and_complete(&self.orchestrator, &self.workflow, task_id, cancel).await
    }

    pub fn spawn_poll(&self, task_id: &str) -> PollHandle {
        self.orchestrator.spawn_poll(task_id)
    }
}

pub struct BulkEditController {
    gateway: Arc<dyn JiraGateway>,
    rules: Arc<RuleEnforcer>,
    workflow: StepWorkflowModel,
    orchestrator: TaskOrchestrator,
    selection: Arc<RwLock<IssueSelectionState>>,
    editable_fields: Arc<RwLock<Vec<EditableField>>>,
    edits: Arc<RwLock<EditRequestBuilder>>,
}

impl BulkEditController {
    pub fn new(gateway: Arc<dyn JiraGateway>, config: &Config, events: Arc<EventManager>) -> Result<Self> {
        let workflow = StepWorkflowModel::for_mode(
            BulkOperationMode::Edit,
            events.clone(),
            Duration::from_millis(config.workflow.debounce_ms),
        )?;
        let orchestrator = TaskOrchestrator::new(gateway.clone(), events, &config.tasks);

        Ok(Self {
            gateway,
            rules: Arc::new(RuleEnforcer::new(config.rules.clone())),
            workflow,
            orchestrator,
            selection: Arc::new(RwLock::new(IssueSelectionState::empty())),
            editable_fields: Arc::new(RwLock::new(Vec::new())),
            edits: Arc::new(RwLock::new(EditRequestBuilder::new())),
        })
    }

    pub fn workflow(&self) -> &StepWorkflowModel {
        &self.workflow
    }

    pub async fn search(&self, jql: &str) -> Result<Vec<WorkItem>> {
        run_search(
            self.gateway.as_ref(),
            &self.rules,
            &self.workflow,
            jql,
            BulkOperationMode::Edit,
        )
        .await
    }

    /// Replaces the selection, reloads the editable fields and drops pending edits
    pub async fn set_selection(&self, items: Vec<WorkItem>) -> Result<IssueSelectionState> {
        let state = build_selection(items, BulkOperationMode::Edit, self.rules.rules());

        let fields = if state.is_valid() {
            let ids: Vec<String> = state.items.iter().map(|i| i.id.clone()).collect();
            let fields = self.gateway.get_bulk_editable_fields(&ids).await?;
            self.rules.filter_edit_fields(fields)
        } else {
            Vec::new()
        };

        *self.selection.write().await = state.clone();
        *self.editable_fields.write().await = fields;
        *self.edits.write().await = EditRequestBuilder::new();

        self.workflow
            .set_completion_state(StepName::IssueSelection, CompletionState::Incomplete)
            .await?;
        if state.is_valid() {
            self.workflow
                .set_completion_state(StepName::IssueSelection, CompletionState::Complete)
                .await?;
        } else if state.validity != SelectionValidity::NoItemsSelected {
            tracing::info!("Selection invalid: {}", state.validity.describe());
        }
        Ok(state)
    }

    pub async fn editable_fields(&self) -> Vec<EditableField> {
        self.editable_fields.read().await.clone()
    }

    /// Validates and records an edit; a failed validation leaves the edits untouched
    pub async fn set_field_value(&self, field_id: &str, value: EditValue) -> Result<OperationOutcome> {
        let field = self
            .editable_fields
            .read()
            .await
            .iter()
            .find(|f| f.id == field_id)
            .cloned()
            .ok_or_else(|| ControllerError::UnknownField(field_id.to_string()))?;

        let other_values: HashMap<String, EditValue> = self
            .edits
            .read()
            .await
            .edits()
            .iter()
            .filter(|(f, _)| f.id != field_id)
            .map(|(f, v)| (f.id.clone(), v.clone()))
            .collect();

        let outcome = self.rules.validate_field_value(&field, &value, &other_values);
        if !outcome.success {
            return Ok(outcome);
        }

        self.edits.write().await.set_field(field, value);
        self.update_edit_step().await?;
        Ok(outcome)
    }

    pub async fn clear_field_value(&self, field_id: &str) -> Result<bool> {
        let removed = self.edits.write().await.remove_field(field_id);
        self.update_edit_step().await?;
        Ok(removed)
    }

    async fn update_edit_step(&self) -> Result<()> {
        let has_edits = !self.edits.read().await.is_empty();
        self.workflow
            .set_completion_state(StepName::EditFields, CompletionState::from_bool(has_edits))
            .await?;
        Ok(())
    }

    pub async fn build_edit_request(&self, send_bulk_notification: bool) -> BulkEditRequest {
        let items = self.selection.read().await.items.clone();
        self.edits.read().await.build(&items, send_bulk_notification)
    }

    pub async fn initiate_bulk_edit(&self, edit_request: &BulkEditRequest) -> SubmissionOutcome {
        self.orchestrator
            .submit(&BulkRequest::Edit(edit_request.clone()))
            .await
    }

    pub async fn execute(&self, send_bulk_notification: bool) -> Result<SubmissionOutcome> {
        ensure_upstream_complete(&self.workflow, StepName::MoveOrEdit).await?;
        let request = self.build_edit_request(send_bulk_notification).await;
        Ok(self.initiate_bulk_edit(&request).await)
    }

    pub async fn poll_outcome(&self, task_id: &str) -> Result<Option<TaskOutcome>> {
        Ok(self.orchestrator.poll_outcome(task_id).await?)
    }

    pub async fn await_task(&self, task_id: &str, cancel: CancellationToken) -> Result<Option<TaskOutcome>> {
        await_and_complete(&self.orchestrator, &self.workflow, task_id, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use bulkops_core::models::{AllowedValue, TaskStatus};
    use std::sync::atomic::Ordering;

    fn config() -> Config {
        let mut config = Config::default();
        config.rules.allow_moves_from_multiple_projects = true;
        config
    }

    #[tokio::test]
    async fn test_invalid_query_keeps_filter_incomplete() {
        let gateway = Arc::new(FakeGateway::new());
        *gateway.parse_errors.lock().unwrap() = vec!["Unexpected token".to_string()];
        let controller = BulkMoveController::new(gateway, &config(), Arc::new(EventManager::new())).unwrap();

        assert!(matches!(
            controller.search("project = ").await,
            Err(ControllerError::InvalidQuery(_))
        ));
        assert!(!controller.workflow().is_complete(StepName::Filter).await.unwrap());
    }

    #[tokio::test]
    async fn test_search_uses_augmented_query() {
        let p = project_ref("1", "ABC");
        let gateway = Arc::new(FakeGateway::new().with_issues(vec![work_item("1", &p, &issue_type("10", "Story", 0))]));
        let controller = BulkMoveController::new(gateway.clone(), &config(), Arc::new(EventManager::new())).unwrap();

        let items = controller.search("project = ABC").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(
            gateway.searched_queries.lock().unwrap()[0],
            "statusCategory != Done and project = ABC"
        );
        assert!(controller.workflow().is_complete(StepName::Filter).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_destination_project() {
        let gateway = Arc::new(FakeGateway::new());
        let controller = BulkMoveController::new(gateway, &config(), Arc::new(EventManager::new())).unwrap();
        let p = project_ref("1", "ABC");
        let items = vec![work_item("1", &p, &issue_type("10", "Story", 0))];

        assert!(matches!(
            controller.initiate_bulk_move("404", &items, &HashMap::new(), false).await,
            Err(ControllerError::DestinationProjectNotFound(id)) if id == "404"
        ));
    }

    #[tokio::test]
    async fn test_execute_requires_upstream_steps() {
        let gateway = Arc::new(FakeGateway::new());
        let controller = BulkMoveController::new(gateway.clone(), &config(), Arc::new(EventManager::new())).unwrap();

        match controller.execute(false).await {
            Err(ControllerError::StepsIncomplete(steps)) => {
                assert_eq!(steps.first(), Some(&StepName::Filter));
                assert_eq!(steps.len(), 5);
            }
            other => panic!("unexpected {:?}", other.map(|o| o.task_id)),
        }
        assert!(gateway.submitted_moves.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_selection_invalidates_mapping_steps() {
        let p = project_ref("1", "ABC");
        let story = issue_type("10", "Story", 0);
        let target = project("2", "XYZ", vec![issue_type("20", "Story", 0)]);
        let gateway = Arc::new(FakeGateway::new().with_projects(vec![target]));
        let controller = BulkMoveController::new(gateway, &config(), Arc::new(EventManager::new())).unwrap();

        controller.set_selection(vec![work_item("1", &p, &story)]).await.unwrap();
        controller.set_target_project("2").await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(controller.workflow().is_complete(StepName::IssueTypeMapping).await.unwrap());
        assert!(controller.workflow().is_complete(StepName::FieldMapping).await.unwrap());

        let state = controller.set_selection(Vec::new()).await.unwrap();
        assert_eq!(state.validity, SelectionValidity::NoItemsSelected);
        for step in [
            StepName::IssueSelection,
            StepName::TargetProjectSelection,
            StepName::IssueTypeMapping,
            StepName::FieldMapping,
        ] {
            assert!(!controller.workflow().is_complete(step).await.unwrap());
        }
    }

    async fn move_ready_controller(gateway: Arc<FakeGateway>) -> BulkMoveController {
        let p = project_ref("1", "ABC");
        let controller = BulkMoveController::new(gateway, &config(), Arc::new(EventManager::new())).unwrap();
        controller.search("").await.unwrap();
        controller
            .set_selection(vec![work_item("1", &p, &issue_type("10", "Story", 0))])
            .await
            .unwrap();
        controller.set_target_project("2").await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        controller
    }

    fn target_gateway() -> Arc<FakeGateway> {
        Arc::new(FakeGateway::new().with_projects(vec![project("2", "XYZ", vec![issue_type("20", "Story", 0)])]))
    }

    #[tokio::test(start_paused = true)]
    async fn test_reselection_keeps_fitting_target_project() {
        let gateway = target_gateway();
        let controller = move_ready_controller(gateway.clone()).await;

        let p = project_ref("1", "ABC");
        controller
            .set_selection(vec![work_item("4", &p, &issue_type("10", "Story", 0))])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(controller.target_project().await.map(|p| p.id), Some("2".to_string()));
        for step in [
            StepName::TargetProjectSelection,
            StepName::IssueTypeMapping,
            StepName::FieldMapping,
        ] {
            assert!(controller.workflow().is_complete(step).await.unwrap(), "{:?}", step);
        }

        let submission = controller.execute(false).await.unwrap();
        assert!(submission.is_accepted());
        let sent = gateway.submitted_moves.lock().unwrap()[0].clone();
        assert_eq!(sent.block("2", "20").unwrap().issue_ids_or_keys, vec!["4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reselection_drops_target_project_that_no_longer_fits() {
        let controller = move_ready_controller(target_gateway()).await;

        // Items already living in the target project
        let xyz = project_ref("2", "XYZ");
        controller
            .set_selection(vec![work_item("7", &xyz, &issue_type("20", "Story", 0))])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(controller.target_project().await.is_none());
        assert!(controller.mappings().snapshot().await.target_issue_type_ids().is_empty());
        assert!(!controller
            .workflow()
            .is_complete(StepName::TargetProjectSelection)
            .await
            .unwrap());
        assert!(!controller.workflow().is_complete(StepName::IssueTypeMapping).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_subtask_fetch_does_not_overwrite_newer_selection() {
        let p = project_ref("1", "ABC");
        let story = issue_type("10", "Story", 0);
        let child = work_item("2", &p, &issue_type("11", "Sub-task", -1));
        let parent = with_subtasks(work_item("1", &p, &story), &[&child]);
        let other = work_item("3", &p, &story);

        let gateway = Arc::new(FakeGateway::new().with_issues(vec![child.clone()]));
        gateway
            .issue_delays
            .lock()
            .unwrap()
            .insert("2".to_string(), Duration::from_secs(5));
        let controller = BulkMoveController::new(gateway, &config(), Arc::new(EventManager::new())).unwrap();

        let (older, newer) = tokio::join!(
            controller.set_selection(vec![parent]),
            controller.set_selection(vec![other])
        );

        assert!(matches!(older, Err(ControllerError::SelectionSuperseded)));
        let newer = newer.unwrap();
        assert_eq!(controller.selection().await.uuid, newer.uuid);
        let in_play: Vec<String> = controller
            .in_play_items()
            .await
            .into_iter()
            .map(|i| i.key)
            .collect();
        assert_eq!(in_play, vec!["ABC-3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destination_lookup_retries_transient_failures() {
        let gateway = target_gateway();
        let controller = move_ready_controller(gateway.clone()).await;
        let calls_before = gateway.project_calls.load(Ordering::SeqCst);

        *gateway.project_failures.lock().unwrap() = 2;
        let submission = controller.execute(false).await.unwrap();
        assert!(submission.is_accepted());
        assert_eq!(gateway.project_calls.load(Ordering::SeqCst), calls_before + 3);

        // Default limit is three retries
        *gateway.project_failures.lock().unwrap() = 4;
        assert!(matches!(
            controller.execute(false).await,
            Err(ControllerError::Gateway(GatewayError::Server { status: 503, .. }))
        ));
        assert_eq!(gateway.submitted_moves.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_flow_validates_and_submits() {
        let p = project_ref("1", "ABC");
        let items = vec![work_item("1", &p, &issue_type("10", "Story", 0))];
        let gateway = Arc::new(
            FakeGateway::new()
                .with_issues(items.clone())
                .with_outcomes(vec![Ok(Some(outcome("10641", TaskStatus::Complete, 100)))]),
        );
        *gateway.editable_fields.lock().unwrap() = vec![
            EditableField {
                id: "customfield_2".to_string(),
                name: "Team".to_string(),
                field_type: "com.atlassian.jira.plugin.system.customfieldtypes:select".to_string(),
                allowed_values: vec![AllowedValue {
                    id: "7".to_string(),
                    name: Some("Core".to_string()),
                }],
            },
            EditableField {
                id: "reporter".to_string(),
                name: "Reporter".to_string(),
                field_type: "reporter".to_string(),
                allowed_values: Vec::new(),
            },
        ];
        let controller = BulkEditController::new(gateway.clone(), &config(), Arc::new(EventManager::new())).unwrap();

        controller.search("").await.unwrap();
        controller.set_selection(items).await.unwrap();
        let fields = controller.editable_fields().await;
        assert_eq!(fields.len(), 1);

        let refused = controller
            .set_field_value("customfield_2", EditValue::OptionId("99".to_string()))
            .await
            .unwrap();
        assert!(!refused.success);
        assert!(!controller.workflow().is_complete(StepName::EditFields).await.unwrap());

        let accepted = controller
            .set_field_value("customfield_2", EditValue::OptionId("7".to_string()))
            .await
            .unwrap();
        assert!(accepted.success);

        let submission = controller.execute(true).await.unwrap();
        assert!(submission.is_accepted());
        let sent = gateway.submitted_edits.lock().unwrap()[0].clone();
        assert_eq!(sent.selected_actions, vec!["customfield_2"]);
        assert!(sent.send_bulk_notification);

        let task_id = submission.task_id.unwrap();
        let outcome = controller
            .await_task(&task_id, CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.status, TaskStatus::Complete);
        assert!(controller.workflow().is_complete(StepName::MoveOrEdit).await.unwrap());
    }
}
