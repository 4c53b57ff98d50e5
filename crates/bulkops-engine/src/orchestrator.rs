//! Submission and progress polling of asynchronous bulk tasks

use bulkops_core::models::{SubmissionOutcome, TaskConfig, TaskOutcome};
use bulkops_jira::{BulkEditRequest, BulkMoveRequest, GatewayError, JiraGateway};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::event_manager::EventManager;
use crate::events::TaskEvent;
use crate::retry::retry_transient;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Poll task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    Idle,
    Submitting,
    Polling,
    Terminal,
}

#[derive(Debug, Clone)]
pub enum BulkRequest {
    Move(BulkMoveRequest),
    Edit(BulkEditRequest),
}

impl BulkRequest {
    fn describe(&self) -> &'static str {
        match self {
            BulkRequest::Move(_) => "bulk move submission",
            BulkRequest::Edit(_) => "bulk edit submission",
        }
    }
}

/// Handle on a spawned poll loop
pub struct PollHandle {
    task_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<Result<Option<TaskOutcome>>>,
}

impl PollHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Stops polling locally; the task keeps running on the server
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Terminal outcome, or `None` when the loop was cancelled
    pub async fn outcome(self) -> Result<Option<TaskOutcome>> {
        self.handle.await?
    }
}

#[derive(Clone)]
pub struct TaskOrchestrator {
    gateway: Arc<dyn JiraGateway>,
    events: Arc<EventManager>,
    phase: Arc<RwLock<TaskPhase>>,
    poll_interval: Duration,
    submit_retry_limit: u32,
    submit_retry_delay: Duration,
}

impl TaskOrchestrator {
    pub fn new(gateway: Arc<dyn JiraGateway>, events: Arc<EventManager>, config: &TaskConfig) -> Self {
        Self {
            gateway,
            events,
            phase: Arc::new(RwLock::new(TaskPhase::Idle)),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            submit_retry_limit: config.submit_retry_limit,
            submit_retry_delay: Duration::from_millis(config.submit_retry_delay_ms),
        }
    }

    pub async fn phase(&self) -> TaskPhase {
        *self.phase.read().await
    }

    async fn set_phase(&self, phase: TaskPhase) {
        *self.phase.write().await = phase;
    }

    /// Submits once, retrying only transient failures.
    ///
    /// Rejections come back as an outcome carrying the messages and status code.
    pub async fn submit(&self, request: &BulkRequest) -> SubmissionOutcome {
        self.set_phase(TaskPhase::Submitting).await;

        let gateway = self.gateway.as_ref();
        let result = retry_transient(
            self.submit_retry_limit,
            self.submit_retry_delay,
            request.describe(),
            move || async move {
                match request {
                    BulkRequest::Move(body) => gateway.submit_bulk_move(body).await,
                    BulkRequest::Edit(body) => gateway.submit_bulk_edit(body).await,
                }
            },
        )
        .await;

        match result {
            Ok(task_id) => {
                tracing::info!("{} accepted as task {}", request.describe(), task_id);
                self.set_phase(TaskPhase::Polling).await;
                self.events.emit_task(TaskEvent::submitted(task_id.clone()));
                SubmissionOutcome::accepted(task_id)
            }
            Err(e) => {
                let status_code = e.status_code();
                let messages = e.messages();
                match e {
                    GatewayError::Rejected { .. } => {
                        tracing::warn!("{} rejected ({}): {:?}", request.describe(), status_code, messages)
                    }
                    other => tracing::error!("{} failed: {}", request.describe(), other),
                }
                self.set_phase(TaskPhase::Idle).await;
                self.events
                    .emit_task(TaskEvent::rejected(status_code, messages.clone()));
                SubmissionOutcome::rejected(status_code, messages)
            }
        }
    }

    /// Single progress fetch; `None` while the outcome is not available
    pub async fn poll_outcome(&self, task_id: &str) -> Result<Option<TaskOutcome>> {
        Ok(self.gateway.get_task_outcome(task_id).await?)
    }

    /// Polls every interval until the task reaches a terminal status.
    ///
    /// There is no poll cap. Transient failures are logged and polling
    /// continues; cancelling `cancel` resolves to `Ok(None)`.
    pub async fn await_completion(&self, task_id: &str, cancel: CancellationToken) -> Result<Option<TaskOutcome>> {
        self.set_phase(TaskPhase::Polling).await;
        let mut polls = 0u32;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Stopped polling task {} after {} polls", task_id, polls);
                    self.set_phase(TaskPhase::Idle).await;
                    self.events.emit_task(TaskEvent::abandoned(task_id.to_string()));
                    return Ok(None);
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            polls += 1;
            match self.gateway.get_task_outcome(task_id).await {
                Ok(Some(outcome)) => {
                    tracing::debug!(
                        "Task {} poll {}: {} {}%",
                        task_id,
                        polls,
                        outcome.status.as_str(),
                        outcome.progress_percent
                    );
                    self.events.emit_task(TaskEvent::progress(
                        task_id.to_string(),
                        outcome.status,
                        outcome.progress_percent,
                    ));

                    if outcome.is_terminal() {
                        tracing::info!("Task {} finished as {}", task_id, outcome.status.as_str());
                        self.set_phase(TaskPhase::Terminal).await;
                        self.events
                            .emit_task(TaskEvent::finished(task_id.to_string(), outcome.status));
                        return Ok(Some(outcome));
                    }
                }
                Ok(None) => tracing::debug!("Task {} poll {}: outcome not available yet", task_id, polls),
                Err(e) if e.is_transient() => {
                    tracing::warn!("Task {} poll {} failed, will retry: {}", task_id, polls, e)
                }
                Err(e) => {
                    tracing::error!("Task {} polling aborted: {}", task_id, e);
                    self.set_phase(TaskPhase::Idle).await;
                    return Err(e.into());
                }
            }
        }
    }

    /// Runs the poll loop on its own task
    pub fn spawn_poll(&self, task_id: &str) -> PollHandle {
        let cancel = CancellationToken::new();
        let orchestrator = self.clone();
        let token = cancel.clone();
        let id = task_id.to_string();
        let handle = tokio::spawn(async move { orchestrator.await_completion(&id, token).await });

        PollHandle {
            task_id: task_id.to_string(),
            cancel,
            handle,
        }
    }
}
