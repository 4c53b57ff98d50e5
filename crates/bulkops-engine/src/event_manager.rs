//! Central event management and broadcasting

use tokio::sync::broadcast;

use crate::events::{BulkOpsEvent, MappingEvent, TaskEvent, WorkflowEvent};

/// Central event manager that fans bulk operation events out to subscribers
pub struct EventManager {
    event_tx: broadcast::Sender<BulkOpsEvent>,
}

impl EventManager {
    /// Create a new event manager with a broadcast channel
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(1000);
        Self { event_tx }
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> broadcast::Receiver<BulkOpsEvent> {
        self.event_tx.subscribe()
    }

    pub fn emit_workflow(&self, event: WorkflowEvent) {
        let _ = self.event_tx.send(BulkOpsEvent::Workflow(event));
    }

    pub fn emit_mapping(&self, event: MappingEvent) {
        tracing::debug!("EventManager: mapping event {:?}", event.event_type);
        let _ = self.event_tx.send(BulkOpsEvent::Mapping(event));
    }

    /// Emit a task event
    pub fn emit_task(&self, event: TaskEvent) {
        tracing::debug!("EventManager: task event {:?}", event.event_type);
        if let Err(e) = self.event_tx.send(BulkOpsEvent::Task(event)) {
            tracing::trace!("EventManager: no subscribers for task event: {:?}", e);
        }
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MappingEventType, TaskEventType};
    use bulkops_core::models::{CompletionState, StepName, TaskStatus};

    #[tokio::test]
    async fn test_subscribers_see_every_category_in_order() {
        let manager = EventManager::new();
        let mut first = manager.subscribe();
        let mut second = manager.subscribe();

        manager.emit_workflow(WorkflowEvent::step_changed("move", StepName::Filter, CompletionState::Complete));
        manager.emit_mapping(MappingEvent::new(MappingEventType::Cleared));
        manager.emit_task(TaskEvent::finished("1".to_string(), TaskStatus::Complete));

        for rx in [&mut first, &mut second] {
            assert!(matches!(rx.recv().await.unwrap(), BulkOpsEvent::Workflow(_)));
            assert!(matches!(rx.recv().await.unwrap(), BulkOpsEvent::Mapping(_)));
            match rx.recv().await.unwrap() {
                BulkOpsEvent::Task(TaskEvent {
                    event_type: TaskEventType::Finished { status },
                    task_id,
                    ..
                }) => {
                    assert_eq!(status, TaskStatus::Complete);
                    assert_eq!(task_id.as_deref(), Some("1"));
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let manager = EventManager::new();
        manager.emit_task(TaskEvent::abandoned("1".to_string()));

        let mut rx = manager.subscribe();
        assert!(rx.try_recv().is_err());
    }
}
