//! Step completion tracking for one bulk operation workflow

use bulkops_core::models::{BulkOperationMode, CompletionState, StepName};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

use crate::event_manager::EventManager;
use crate::events::{BulkOpsEvent, WorkflowEvent};
use crate::generation::Debouncer;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Step {0} is not part of this workflow")]
    UnknownStep(StepName),

    #[error("Step {0} appears more than once in the sequence")]
    DuplicateStep(StepName),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Ordered steps with a completion state each.
///
/// Marking a step incomplete invalidates every step after it. Update
/// notifications are debounced so a burst of changes yields one event.
#[derive(Clone)]
pub struct StepWorkflowModel {
    name: String,
    sequence: Arc<Vec<StepName>>,
    states: Arc<RwLock<HashMap<StepName, CompletionState>>>,
    updated_at: Arc<RwLock<DateTime<Utc>>>,
    debouncer: Debouncer,
    events: Arc<EventManager>,
}

impl StepWorkflowModel {
    pub fn new(
        name: &str,
        sequence: Vec<StepName>,
        events: Arc<EventManager>,
        debounce: Duration,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for step in &sequence {
            if !seen.insert(*step) {
                return Err(WorkflowError::DuplicateStep(*step));
            }
        }

        let states = sequence
            .iter()
            .map(|step| (*step, CompletionState::Incomplete))
            .collect();

        Ok(Self {
            name: name.to_string(),
            sequence: Arc::new(sequence),
            states: Arc::new(RwLock::new(states)),
            updated_at: Arc::new(RwLock::new(Utc::now())),
            debouncer: Debouncer::new(debounce),
            events,
        })
    }

    pub fn for_mode(mode: BulkOperationMode, events: Arc<EventManager>, debounce: Duration) -> Result<Self> {
        let name = match mode {
            BulkOperationMode::Move => "move",
            BulkOperationMode::Edit => "edit",
            BulkOperationMode::Import => "import",
        };
        Self::new(name, mode.step_sequence(), events, debounce)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_sequence(&self) -> &[StepName] {
        &self.sequence
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BulkOpsEvent> {
        self.events.subscribe()
    }

    fn position(&self, step: StepName) -> Result<usize> {
        self.sequence
            .iter()
            .position(|s| *s == step)
            .ok_or(WorkflowError::UnknownStep(step))
    }

    pub async fn completion_state(&self, step: StepName) -> Result<CompletionState> {
        self.position(step)?;
        let states = self.states.read().await;
        Ok(states.get(&step).copied().unwrap_or_default())
    }

    pub async fn is_complete(&self, step: StepName) -> Result<bool> {
        Ok(self.completion_state(step).await?.is_complete())
    }

    /// Steps after `step`, in sequence order
    pub fn downstream_steps(&self, step: StepName) -> Result<Vec<StepName>> {
        let index = self.position(step)?;
        Ok(self.sequence[index + 1..].to_vec())
    }

    pub fn next_downstream_step(&self, step: StepName) -> Result<Option<StepName>> {
        let index = self.position(step)?;
        Ok(self.sequence.get(index + 1).copied())
    }

    /// Steps before `step` that are not complete yet
    pub async fn incomplete_upstream_steps(&self, step: StepName) -> Result<Vec<StepName>> {
        let index = self.position(step)?;
        let states = self.states.read().await;
        Ok(self.sequence[..index]
            .iter()
            .filter(|s| !states.get(s).copied().unwrap_or_default().is_complete())
            .copied()
            .collect())
    }

    /// Sets a step's state and returns the steps that changed, last step first
    pub async fn set_completion_state(
        &self,
        step: StepName,
        state: CompletionState,
    ) -> Result<Vec<StepName>> {
        let index = self.position(step)?;

        let changed = {
            let mut states = self.states.write().await;
            if states.get(&step).copied().unwrap_or_default() == state {
                return Ok(Vec::new());
            }
            states.insert(step, state);

            let mut changed = vec![step];
            if !state.is_complete() {
                for downstream in &self.sequence[index + 1..] {
                    if let Some(s) = states.get_mut(downstream) {
                        if s.is_complete() {
                            *s = CompletionState::Incomplete;
                            changed.push(*downstream);
                        }
                    }
                }
            }
            changed.reverse();
            changed
        };

        for changed_step in &changed {
            let new_state = if *changed_step == step {
                state
            } else {
                CompletionState::Incomplete
            };
            tracing::debug!("{} workflow: {} -> {:?}", self.name, changed_step, new_state);
            self.events
                .emit_workflow(WorkflowEvent::step_changed(&self.name, *changed_step, new_state));
        }

        self.touch().await;
        Ok(changed)
    }

    pub async fn update_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let mut updated_at = self.updated_at.write().await;
        // Keep the timestamp monotonic even if the wall clock stalls
        *updated_at = if now > *updated_at { now } else { *updated_at + chrono::Duration::microseconds(1) };
        *updated_at
    }

    pub async fn updated_at(&self) -> DateTime<Utc> {
        *self.updated_at.read().await
    }

    /// Refreshes the timestamp and schedules a debounced update notification
    pub async fn touch(&self) {
        self.update_timestamp().await;

        let name = self.name.clone();
        let updated_at = self.updated_at.clone();
        let events = self.events.clone();
        self.debouncer.call(async move {
            let latest = *updated_at.read().await;
            events.emit_workflow(WorkflowEvent::model_updated(&name, latest));
        });
    }

    /// Marks every step incomplete
    pub async fn reset(&self) -> Result<Vec<StepName>> {
        match self.sequence.first() {
            Some(first) => self.set_completion_state(*first, CompletionState::Incomplete).await,
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::WorkflowEventType;
    use tokio::time::sleep;

    fn move_model(events: Arc<EventManager>) -> StepWorkflowModel {
        StepWorkflowModel::for_mode(BulkOperationMode::Move, events, Duration::from_millis(100)).unwrap()
    }

    #[test]
    fn test_duplicate_steps_rejected() {
        let result = StepWorkflowModel::new(
            "broken",
            vec![StepName::Filter, StepName::IssueSelection, StepName::Filter],
            Arc::new(EventManager::new()),
            Duration::from_millis(100),
        );
        assert!(matches!(result, Err(WorkflowError::DuplicateStep(StepName::Filter))));
    }

    #[tokio::test]
    async fn test_unknown_step_is_an_error() {
        let model = move_model(Arc::new(EventManager::new()));
        assert!(matches!(
            model.completion_state(StepName::EditFields).await,
            Err(WorkflowError::UnknownStep(StepName::EditFields))
        ));
        assert!(model
            .set_completion_state(StepName::ColumnMapping, CompletionState::Complete)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_downstream_navigation() {
        let model = move_model(Arc::new(EventManager::new()));
        assert_eq!(
            model.next_downstream_step(StepName::IssueTypeMapping).unwrap(),
            Some(StepName::FieldMapping)
        );
        assert_eq!(model.next_downstream_step(StepName::MoveOrEdit).unwrap(), None);
        assert_eq!(
            model.downstream_steps(StepName::FieldMapping).unwrap(),
            vec![StepName::MoveOrEdit]
        );
    }

    #[tokio::test]
    async fn test_setting_same_state_is_noop() {
        let model = move_model(Arc::new(EventManager::new()));
        let changed = model
            .set_completion_state(StepName::Filter, CompletionState::Incomplete)
            .await
            .unwrap();
        assert!(changed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cascading_invalidation() {
        let events = Arc::new(EventManager::new());
        let model = move_model(events.clone());

        for step in [
            StepName::Filter,
            StepName::IssueSelection,
            StepName::TargetProjectSelection,
            StepName::IssueTypeMapping,
        ] {
            model.set_completion_state(step, CompletionState::Complete).await.unwrap();
        }

        let mut rx = events.subscribe();
        let changed = model
            .set_completion_state(StepName::IssueSelection, CompletionState::Incomplete)
            .await
            .unwrap();

        assert_eq!(
            changed,
            vec![
                StepName::IssueTypeMapping,
                StepName::TargetProjectSelection,
                StepName::IssueSelection
            ]
        );
        assert!(model.is_complete(StepName::Filter).await.unwrap());
        assert!(!model.is_complete(StepName::TargetProjectSelection).await.unwrap());
        assert!(!model.is_complete(StepName::IssueTypeMapping).await.unwrap());

        let mut reported = Vec::new();
        for _ in 0..3 {
            if let BulkOpsEvent::Workflow(WorkflowEvent {
                event_type: WorkflowEventType::StepChanged { step, .. },
                ..
            }) = rx.recv().await.unwrap()
            {
                reported.push(step);
            }
        }
        assert_eq!(reported, changed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_notifications_are_debounced() {
        let events = Arc::new(EventManager::new());
        let model = move_model(events.clone());
        let mut rx = events.subscribe();

        for _ in 0..5 {
            model.touch().await;
            sleep(Duration::from_millis(10)).await;
        }
        let latest = model.updated_at().await;

        sleep(Duration::from_millis(500)).await;

        let mut updates = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let BulkOpsEvent::Workflow(WorkflowEvent {
                event_type: WorkflowEventType::ModelUpdated { updated_at },
                ..
            }) = event
            {
                updates.push(updated_at);
            }
        }
        assert_eq!(updates, vec![latest]);
    }

    #[tokio::test]
    async fn test_incomplete_upstream_steps() {
        let model = move_model(Arc::new(EventManager::new()));
        model
            .set_completion_state(StepName::Filter, CompletionState::Complete)
            .await
            .unwrap();
        assert_eq!(
            model.incomplete_upstream_steps(StepName::IssueTypeMapping).await.unwrap(),
            vec![StepName::IssueSelection, StepName::TargetProjectSelection]
        );
    }
}
