//! Selection validity classification

use crate::models::{
    count_issue_types, count_projects, BulkOperationMode, BulkOperationRules, IssueSelectionState,
    SelectionValidity, SubtaskMoveStrategy, WorkItem,
};

/// Classifies a selection; the first failing check wins.
///
/// Checks run in a fixed order: empty selection, multiple projects, multiple
/// issue types, then subtask presence (moves only, and only when the subtask
/// strategy forbids moving issues that have subtasks).
pub fn classify_selection(
    items: &[WorkItem],
    mode: BulkOperationMode,
    rules: &BulkOperationRules,
) -> SelectionValidity {
    if items.is_empty() {
        return SelectionValidity::NoItemsSelected;
    }

    let allow_multiple_projects = match mode {
        BulkOperationMode::Move => rules.allow_moves_from_multiple_projects,
        BulkOperationMode::Edit => rules.allow_edits_from_multiple_projects,
        BulkOperationMode::Import => true,
    };
    if !allow_multiple_projects && count_projects(items) > 1 {
        return SelectionValidity::MultipleProjects;
    }

    let allow_multiple_issue_types = match mode {
        BulkOperationMode::Move => rules.allow_multiple_issue_types_in_move,
        BulkOperationMode::Edit => rules.allow_multiple_issue_types_in_edit,
        BulkOperationMode::Import => true,
    };
    if !allow_multiple_issue_types && count_issue_types(items) > 1 {
        return SelectionValidity::MultipleIssueTypes;
    }

    if mode == BulkOperationMode::Move
        && rules.subtask_move_strategy == SubtaskMoveStrategy::IssuesWithSubtasksCanNotBeMoved
        && items.iter().any(WorkItem::has_subtasks)
    {
        return SelectionValidity::SubtasksPresent;
    }

    SelectionValidity::Valid
}

/// Builds a fresh selection value for the items
pub fn build_selection(
    items: Vec<WorkItem>,
    mode: BulkOperationMode,
    rules: &BulkOperationRules,
) -> IssueSelectionState {
    let validity = classify_selection(&items, mode, rules);
    IssueSelectionState::new(items, validity)
}
