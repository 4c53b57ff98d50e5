//! Issue selection snapshots

use super::issue::WorkItem;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionValidity {
    Valid,
    #[default]
    #[serde(rename = "invalid-no-issues-selected")]
    NoItemsSelected,
    MultipleProjects,
    MultipleIssueTypes,
    #[serde(rename = "invalid-subtasks-selected")]
    SubtasksPresent,
}

impl SelectionValidity {
    pub fn is_valid(&self) -> bool {
        *self == SelectionValidity::Valid
    }

    /// Message suitable for showing next to an invalid selection
    pub fn describe(&self) -> &'static str {
        match self {
            SelectionValidity::Valid => "",
            SelectionValidity::NoItemsSelected => "No work items have been selected.",
            SelectionValidity::MultipleProjects => {
                "Work items from more than one project have been selected."
            }
            SelectionValidity::MultipleIssueTypes => {
                "Work items of more than one issue type have been selected."
            }
            SelectionValidity::SubtasksPresent => {
                "Work items with subtasks can not be moved in bulk."
            }
        }
    }
}

/// Immutable selection value; every rebuild mints a new uuid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSelectionState {
    pub uuid: Uuid,
    pub items: Vec<WorkItem>,
    pub validity: SelectionValidity,
}

impl IssueSelectionState {
    /// Items are de-duplicated by key, keeping the first occurrence
    pub fn new(items: Vec<WorkItem>, validity: SelectionValidity) -> Self {
        let mut seen = HashSet::new();
        let items = items
            .into_iter()
            .filter(|item| seen.insert(item.key.clone()))
            .collect();
        Self {
            uuid: Uuid::new_v4(),
            items,
            validity,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), SelectionValidity::NoItemsSelected)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }
}

impl Default for IssueSelectionState {
    fn default() -> Self {
        Self::empty()
    }
}
