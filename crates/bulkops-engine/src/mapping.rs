//! Source to target issue type mapping

use bulkops_core::models::{CompletionState, IssueType, Project, ProjectRef, StepName, WorkItem};
use bulkops_core::RuleEnforcer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::event_manager::EventManager;
use crate::events::{MappingEvent, MappingEventType};
use crate::generation::{spawn_deferred, Generation, GenerationTracker};
use crate::workflow::StepWorkflowModel;

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("Mapping {source_type} to {target_type} is not allowed")]
    NotAllowed { source_type: String, target_type: String },
}

pub type Result<T> = std::result::Result<T, MappingError>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MappingKey {
    pub source_project_id: String,
    pub source_issue_type_id: String,
}

impl MappingKey {
    pub fn new(source_project_id: &str, source_issue_type_id: &str) -> Self {
        Self {
            source_project_id: source_project_id.to_string(),
            source_issue_type_id: source_issue_type_id.to_string(),
        }
    }

    pub fn for_item(item: &WorkItem) -> Self {
        Self::new(&item.project.id, &item.issue_type.id)
    }
}

/// One mapping row: a distinct (project, issue type) found in the selection
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePair {
    pub project: ProjectRef,
    pub issue_type: IssueType,
}

impl SourcePair {
    pub fn key(&self) -> MappingKey {
        MappingKey::new(&self.project.id, &self.issue_type.id)
    }
}

/// Snapshot of the mapping table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTypeMapping {
    entries: BTreeMap<MappingKey, String>,
}

impl IssueTypeMapping {
    pub fn insert(&mut self, key: MappingKey, target_issue_type_id: &str) {
        self.entries.insert(key, target_issue_type_id.to_string());
    }

    pub fn target_for(&self, source_project_id: &str, source_issue_type_id: &str) -> Option<&str> {
        self.entries
            .get(&MappingKey::new(source_project_id, source_issue_type_id))
            .map(String::as_str)
    }

    pub fn contains(&self, key: &MappingKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct target issue type ids
    pub fn target_issue_type_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entries
            .values()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoMapReport {
    pub original_count: u64,
    pub new_count: u64,
    /// Source pairs still without a target after auto mapping
    pub unmapped: Vec<MappingKey>,
}

impl AutoMapReport {
    pub fn changed(&self) -> bool {
        self.new_count != self.original_count
    }
}

/// Holds the mapping table and a counter bumped on every write
#[derive(Clone)]
pub struct IssueTypeMappingResolver {
    rules: Arc<RuleEnforcer>,
    table: Arc<RwLock<IssueTypeMapping>>,
    counter: Arc<AtomicU64>,
    generations: GenerationTracker,
    events: Arc<EventManager>,
    notification_delay: Duration,
}

impl IssueTypeMappingResolver {
    pub fn new(
        rules: Arc<RuleEnforcer>,
        generations: GenerationTracker,
        events: Arc<EventManager>,
        notification_delay: Duration,
    ) -> Self {
        Self {
            rules,
            table: Arc::new(RwLock::new(IssueTypeMapping::default())),
            counter: Arc::new(AtomicU64::new(0)),
            generations,
            events,
            notification_delay,
        }
    }

    /// Writes a mapping, replacing any previous target; returns the new counter value
    pub async fn add_mapping(
        &self,
        source_project_id: &str,
        source_issue_type_id: &str,
        target_issue_type_id: &str,
    ) -> u64 {
        self.table.write().await.insert(
            MappingKey::new(source_project_id, source_issue_type_id),
            target_issue_type_id,
        );
        let count = self.counter.fetch_add(1, Ordering::SeqCst) + 1;

        self.events.emit_mapping(MappingEvent::new(MappingEventType::Mapped {
            source_project_id: source_project_id.to_string(),
            source_issue_type_id: source_issue_type_id.to_string(),
            target_issue_type_id: target_issue_type_id.to_string(),
        }));
        count
    }

    pub async fn target_issue_type_id(
        &self,
        source_project_id: &str,
        source_issue_type_id: &str,
    ) -> Option<String> {
        self.table
            .read()
            .await
            .target_for(source_project_id, source_issue_type_id)
            .map(str::to_string)
    }

    pub fn mapping_count(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn is_mapping_allowed(&self, source: &IssueType, target: &IssueType) -> bool {
        self.rules.is_mapping_allowed(source, target)
    }

    /// User mapping of one row; refused when the rules forbid it
    pub async fn map_issue_type(&self, pair: &SourcePair, target: &IssueType) -> Result<u64> {
        if !self.is_mapping_allowed(&pair.issue_type, target) {
            return Err(MappingError::NotAllowed {
                source_type: pair.issue_type.name.clone(),
                target_type: target.name.clone(),
            });
        }
        Ok(self
            .add_mapping(&pair.project.id, &pair.issue_type.id, &target.id)
            .await)
    }

    /// Distinct source pairs in first-seen order
    pub fn source_pairs(items: &[WorkItem]) -> Vec<SourcePair> {
        let mut seen = HashSet::new();
        items
            .iter()
            .filter(|item| seen.insert(MappingKey::for_item(item)))
            .map(|item| SourcePair {
                project: item.project.clone(),
                issue_type: item.issue_type.clone(),
            })
            .collect()
    }

    /// False for an empty selection
    pub async fn are_all_issue_types_mapped(&self, items: &[WorkItem]) -> bool {
        if items.is_empty() {
            return false;
        }
        let table = self.table.read().await;
        Self::source_pairs(items)
            .iter()
            .all(|pair| table.contains(&pair.key()))
    }

    pub async fn snapshot(&self) -> IssueTypeMapping {
        self.table.read().await.clone()
    }

    pub async fn clear(&self) {
        *self.table.write().await = IssueTypeMapping::default();
        self.counter.fetch_add(1, Ordering::SeqCst);
        self.events.emit_mapping(MappingEvent::new(MappingEventType::Cleared));
    }

    /// Maps every unmapped source pair to a same-named, allowed issue type of the target project.
    ///
    /// Existing mappings are never overwritten.
    pub async fn auto_map(&self, items: &[WorkItem], target_project: &Project) -> AutoMapReport {
        let original_count = self.mapping_count();
        let candidates = self
            .rules
            .filter_target_issue_types(target_project.issue_types.clone());
        let mut unmapped = Vec::new();

        for pair in Self::source_pairs(items) {
            let key = pair.key();
            if self.table.read().await.contains(&key) {
                continue;
            }

            let target = candidates
                .iter()
                .find(|t| t.name == pair.issue_type.name && self.is_mapping_allowed(&pair.issue_type, t));
            match target {
                Some(target) => {
                    tracing::debug!(
                        "Auto mapped {} in {} to {}",
                        pair.issue_type.name,
                        pair.project.key,
                        target.id
                    );
                    self.add_mapping(&key.source_project_id, &key.source_issue_type_id, &target.id)
                        .await;
                }
                None => unmapped.push(key),
            }
        }

        let report = AutoMapReport {
            original_count,
            new_count: self.mapping_count(),
            unmapped,
        };
        self.events.emit_mapping(MappingEvent::new(MappingEventType::AutoMapped {
            original_count: report.original_count,
            new_count: report.new_count,
            unmapped: report.unmapped.len(),
        }));
        report
    }

    /// After the notification delay, marks the mapping step according to the
    /// table, unless `generation` went stale in the meantime.
    pub fn schedule_step_notification(
        &self,
        generation: Generation,
        workflow: StepWorkflowModel,
        items: Vec<WorkItem>,
        selection_uuid: Option<Uuid>,
    ) -> JoinHandle<bool> {
        let resolver = self.clone();
        spawn_deferred(
            self.generations.clone(),
            generation,
            self.notification_delay,
            async move {
                let all_mapped = resolver.are_all_issue_types_mapped(&items).await;
                if let Err(e) = workflow
                    .set_completion_state(StepName::IssueTypeMapping, CompletionState::from_bool(all_mapped))
                    .await
                {
                    tracing::error!("Could not update the mapping step: {}", e);
                    return;
                }
                resolver.events.emit_mapping(MappingEvent::new(MappingEventType::StepNotified {
                    selection_uuid,
                    all_mapped,
                }));
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use bulkops_core::models::{
        AllowedIssueTypeMapping, BulkOperationMode, BulkOperationRules, IssueTypeMappingStrategy,
    };

    fn resolver(rules: BulkOperationRules, generations: GenerationTracker) -> IssueTypeMappingResolver {
        IssueTypeMappingResolver::new(
            Arc::new(RuleEnforcer::new(rules)),
            generations,
            Arc::new(EventManager::new()),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_add_mapping_overwrites_and_counts() {
        let resolver = resolver(BulkOperationRules::default(), GenerationTracker::new());
        assert_eq!(resolver.add_mapping("1", "10", "20").await, 1);
        assert_eq!(resolver.add_mapping("1", "10", "21").await, 2);
        assert_eq!(resolver.target_issue_type_id("1", "10").await.as_deref(), Some("21"));
        assert_eq!(resolver.target_issue_type_id("1", "99").await, None);
        assert_eq!(resolver.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_all_mapped_over_distinct_pairs() {
        let resolver = resolver(BulkOperationRules::default(), GenerationTracker::new());
        let p = project_ref("1", "ABC");
        let story = issue_type("10", "Story", 0);
        let bug = issue_type("11", "Bug", 0);
        let items = vec![work_item("1", &p, &story), work_item("2", &p, &story), work_item("3", &p, &bug)];

        assert_eq!(IssueTypeMappingResolver::source_pairs(&items).len(), 2);
        assert!(!resolver.are_all_issue_types_mapped(&[]).await);

        resolver.add_mapping("1", "10", "20").await;
        assert!(!resolver.are_all_issue_types_mapped(&items).await);
        resolver.add_mapping("1", "11", "21").await;
        assert!(resolver.are_all_issue_types_mapped(&items).await);
    }

    #[tokio::test]
    async fn test_auto_map_by_name_without_overwriting() {
        let resolver = resolver(BulkOperationRules::default(), GenerationTracker::new());
        let p = project_ref("1", "ABC");
        let story = issue_type("10", "Story", 0);
        let bug = issue_type("11", "Bug", 0);
        let epic = issue_type("12", "Epic", 1);
        let items = vec![work_item("1", &p, &story), work_item("2", &p, &bug), work_item("3", &p, &epic)];

        let target = project(
            "2",
            "XYZ",
            vec![issue_type("20", "Story", 0), issue_type("21", "Bug", 0), issue_type("22", "Task", 0)],
        );

        resolver.add_mapping("1", "11", "22").await;
        let report = resolver.auto_map(&items, &target).await;

        assert_eq!(report.original_count, 1);
        assert_eq!(report.new_count, 2);
        assert!(report.changed());
        assert_eq!(report.unmapped, vec![MappingKey::new("1", "12")]);
        assert_eq!(resolver.target_issue_type_id("1", "10").await.as_deref(), Some("20"));
        assert_eq!(resolver.target_issue_type_id("1", "11").await.as_deref(), Some("22"));
    }

    #[tokio::test]
    async fn test_map_issue_type_respects_rules() {
        let rules = BulkOperationRules {
            issue_type_mapping_strategy: IssueTypeMappingStrategy::OnlyAllowListedMappings,
            allowed_issue_type_mappings: vec![AllowedIssueTypeMapping {
                source: "Bug".to_string(),
                target: "Defect".to_string(),
            }],
            ..BulkOperationRules::default()
        };
        let resolver = resolver(rules, GenerationTracker::new());
        let pair = SourcePair {
            project: project_ref("1", "ABC"),
            issue_type: issue_type("11", "Bug", 0),
        };

        assert!(resolver.map_issue_type(&pair, &issue_type("30", "Defect", 0)).await.is_ok());
        assert!(matches!(
            resolver.map_issue_type(&pair, &issue_type("31", "Bug", 0)).await,
            Err(MappingError::NotAllowed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_step_notification_is_dropped() {
        let generations = GenerationTracker::new();
        let resolver = resolver(BulkOperationRules::default(), generations.clone());
        let workflow = StepWorkflowModel::for_mode(
            BulkOperationMode::Move,
            Arc::new(EventManager::new()),
            Duration::from_millis(100),
        )
        .unwrap();

        let p = project_ref("1", "ABC");
        let items = vec![work_item("1", &p, &issue_type("10", "Story", 0))];
        resolver.add_mapping("1", "10", "20").await;

        let stale = generations.advance();
        let handle = resolver.schedule_step_notification(stale, workflow.clone(), items.clone(), None);
        generations.advance();
        assert!(!handle.await.unwrap());
        assert!(!workflow.is_complete(StepName::IssueTypeMapping).await.unwrap());

        let current = generations.current();
        let handle = resolver.schedule_step_notification(current, workflow.clone(), items, None);
        assert!(handle.await.unwrap());
        assert!(workflow.is_complete(StepName::IssueTypeMapping).await.unwrap());
    }
}
