//! Subtask expansion of a selection

use bulkops_core::models::WorkItem;
use bulkops_jira::JiraGateway;
use std::collections::HashSet;

/// Returns the items with each parent followed by its subtasks.
///
/// Items are de-duplicated by key. Subtasks that cannot be fetched are
/// logged and left out.
pub async fn expand_with_subtasks(gateway: &dyn JiraGateway, items: &[WorkItem]) -> Vec<WorkItem> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut expanded = Vec::with_capacity(items.len());

    for item in items {
        if seen.insert(item.key.clone()) {
            expanded.push(item.clone());
        }

        for subtask in &item.subtasks {
            if seen.contains(&subtask.key) {
                continue;
            }
            match gateway.get_issue(&subtask.id).await {
                Ok(fetched) => {
                    seen.insert(fetched.key.clone());
                    expanded.push(fetched);
                }
                Err(e) => {
                    tracing::warn!("Skipping subtask {} of {}: {}", subtask.key, item.key, e);
                }
            }
        }
    }

    tracing::debug!("Expanded {} items to {}", items.len(), expanded.len());
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[tokio::test]
    async fn test_subtasks_follow_their_parent() {
        let p = project_ref("1", "ABC");
        let story = issue_type("10", "Story", 0);
        let sub = issue_type("11", "Sub-task", -1);

        let child_a = work_item("2", &p, &sub);
        let child_b = work_item("3", &p, &sub);
        let parent = with_subtasks(work_item("1", &p, &story), &[&child_a, &child_b]);
        let other = work_item("4", &p, &story);

        let gateway = FakeGateway::new().with_issues(vec![child_a.clone(), child_b.clone()]);
        let expanded = expand_with_subtasks(&gateway, &[parent, other, child_a]).await;

        let keys: Vec<&str> = expanded.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["ABC-1", "ABC-2", "ABC-3", "ABC-4"]);
    }

    #[tokio::test]
    async fn test_missing_subtask_is_skipped() {
        let p = project_ref("1", "ABC");
        let story = issue_type("10", "Story", 0);
        let sub = issue_type("11", "Sub-task", -1);

        let gone = work_item("9", &p, &sub);
        let parent = with_subtasks(work_item("1", &p, &story), &[&gone]);

        let gateway = FakeGateway::new();
        let expanded = expand_with_subtasks(&gateway, &[parent]).await;
        assert_eq!(expanded.len(), 1);
    }
}
