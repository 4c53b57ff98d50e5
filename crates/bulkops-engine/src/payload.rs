//! Request bodies for bulk move and bulk edit submissions

use bulkops_core::models::{EditValue, EditableField, WorkItem};
use bulkops_jira::{
    BulkEditRequest, BulkMoveRequest, EditedFieldsInput, TargetMandatoryFields,
    TargetToSourcesMapping,
};
use bulkops_jira::bulk::{
    ClearableNumberField, LabelRef, LabelsField, SelectedOption, SingleSelectField, UserPickerField,
    UserRef,
};
use std::collections::HashMap;

use crate::mapping::IssueTypeMapping;

const NUMBER_FIELD_TYPE: &str = "com.atlassian.jira.plugin.system.customfieldtypes:float";
const SELECT_FIELD_TYPE: &str = "com.atlassian.jira.plugin.system.customfieldtypes:select";
const USER_FIELD_TYPES: [&str; 2] = ["reporter", "assignee"];
const LABELS_FIELD_TYPE: &str = "labels";

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("No target issue type mapped for {issue_key} (project {source_project_id}, issue type {source_issue_type_id})")]
    MissingMapping {
        issue_key: String,
        source_project_id: String,
        source_issue_type_id: String,
    },

    #[error("No work items to submit")]
    NoItems,
}

pub type Result<T> = std::result::Result<T, PayloadError>;

/// Issue left out of a move because it was already placed in an earlier block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedAssignment {
    pub issue_id: String,
    pub kept_target: String,
    pub rejected_target: String,
}

/// Groups issues into per-target blocks in discovery order
#[derive(Debug)]
pub struct MoveRequestBuilder {
    destination_project_id: String,
    send_bulk_notification: bool,
    blocks: Vec<(String, Vec<String>)>,
    assigned: HashMap<String, String>,
    skipped: Vec<SkippedAssignment>,
}

impl MoveRequestBuilder {
    pub fn new(destination_project_id: &str, send_bulk_notification: bool) -> Self {
        Self {
            destination_project_id: destination_project_id.to_string(),
            send_bulk_notification,
            blocks: Vec::new(),
            assigned: HashMap::new(),
            skipped: Vec::new(),
        }
    }

    /// Places an issue under a target issue type; the first placement of an issue wins
    pub fn assign(&mut self, target_issue_type_id: &str, issue_id: &str) -> bool {
        if let Some(existing) = self.assigned.get(issue_id) {
            if existing != target_issue_type_id {
                tracing::warn!(
                    "Issue {} already moves to issue type {}, ignoring {}",
                    issue_id,
                    existing,
                    target_issue_type_id
                );
                self.skipped.push(SkippedAssignment {
                    issue_id: issue_id.to_string(),
                    kept_target: existing.clone(),
                    rejected_target: target_issue_type_id.to_string(),
                });
            }
            return false;
        }

        self.assigned
            .insert(issue_id.to_string(), target_issue_type_id.to_string());
        match self.blocks.iter_mut().find(|(t, _)| t == target_issue_type_id) {
            Some((_, ids)) => ids.push(issue_id.to_string()),
            None => self
                .blocks
                .push((target_issue_type_id.to_string(), vec![issue_id.to_string()])),
        }
        true
    }

    pub fn skipped(&self) -> &[SkippedAssignment] {
        &self.skipped
    }

    pub fn build(self, field_defaults: &HashMap<String, TargetMandatoryFields>) -> MoveBuild {
        let mut request = BulkMoveRequest::new(self.send_bulk_notification);
        for (target_issue_type_id, issue_ids) in self.blocks {
            let mut mapping = TargetToSourcesMapping {
                issue_ids_or_keys: issue_ids,
                ..TargetToSourcesMapping::default()
            };
            if let Some(defaults) = field_defaults.get(&target_issue_type_id) {
                mapping = mapping.with_field_defaults(defaults.clone());
            }
            request.add_mapping(&self.destination_project_id, &target_issue_type_id, mapping);
        }
        MoveBuild {
            request,
            skipped: self.skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveBuild {
    pub request: BulkMoveRequest,
    pub skipped: Vec<SkippedAssignment>,
}

/// Builds the move body for `items`; every item's source pair must be mapped
pub fn build_move_request(
    destination_project_id: &str,
    items: &[WorkItem],
    mapping: &IssueTypeMapping,
    field_defaults: &HashMap<String, TargetMandatoryFields>,
    send_bulk_notification: bool,
) -> Result<MoveBuild> {
    if items.is_empty() {
        return Err(PayloadError::NoItems);
    }

    let mut builder = MoveRequestBuilder::new(destination_project_id, send_bulk_notification);
    for item in items {
        let target = mapping
            .target_for(&item.project.id, &item.issue_type.id)
            .ok_or_else(|| PayloadError::MissingMapping {
                issue_key: item.key.clone(),
                source_project_id: item.project.id.clone(),
                source_issue_type_id: item.issue_type.id.clone(),
            })?;
        builder.assign(target, &item.id);
    }

    let build = builder.build(field_defaults);
    tracing::info!(
        "Built move of {} issues in {} blocks to project {}",
        build.request.issue_count(),
        build.request.blocks().len(),
        destination_project_id
    );
    Ok(build)
}

/// Ordered set of field edits
#[derive(Debug, Clone, Default)]
pub struct EditRequestBuilder {
    edits: Vec<(EditableField, EditValue)>,
}

impl EditRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or replaces the edit of a field, keeping its original position
    pub fn set_field(&mut self, field: EditableField, value: EditValue) {
        match self.edits.iter_mut().find(|(f, _)| f.id == field.id) {
            Some(existing) => *existing = (field, value),
            None => self.edits.push((field, value)),
        }
    }

    pub fn remove_field(&mut self, field_id: &str) -> bool {
        let before = self.edits.len();
        self.edits.retain(|(f, _)| f.id != field_id);
        self.edits.len() != before
    }

    pub fn edits(&self) -> &[(EditableField, EditValue)] {
        &self.edits
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn build(&self, items: &[WorkItem], send_bulk_notification: bool) -> BulkEditRequest {
        let mut input = EditedFieldsInput::default();
        let mut selected_actions = Vec::new();

        for (field, value) in &self.edits {
            let field_type = field.field_type.as_str();
            let applied = match value {
                EditValue::Number(number) if field_type == NUMBER_FIELD_TYPE => {
                    input.clearable_number_fields.push(ClearableNumberField {
                        field_id: field.id.clone(),
                        value: *number,
                    });
                    true
                }
                EditValue::OptionId(option_id) if field_type == SELECT_FIELD_TYPE => {
                    input.single_select_fields.push(SingleSelectField {
                        field_id: field.id.clone(),
                        option: SelectedOption {
                            option_id: option_id.clone(),
                        },
                    });
                    true
                }
                EditValue::AccountId(account_id) if USER_FIELD_TYPES.contains(&field_type) => {
                    input
                        .singleselect_clearable_user_picker_fields
                        .push(UserPickerField {
                            field_id: field.id.clone(),
                            user: account_id.as_ref().map(|id| UserRef {
                                account_id: id.clone(),
                            }),
                        });
                    true
                }
                EditValue::Labels(labels) if field_type == LABELS_FIELD_TYPE => {
                    input.labels_fields.push(LabelsField {
                        field_id: field.id.clone(),
                        labels: labels.iter().map(|name| LabelRef { name: name.clone() }).collect(),
                        bulk_edit_multi_select_field_option: "ADD".to_string(),
                    });
                    true
                }
                _ => false,
            };

            if applied {
                selected_actions.push(field.id.clone());
            } else {
                tracing::warn!(
                    "Skipping edit of {} ({}): unsupported field type or value",
                    field.id,
                    field.field_type
                );
            }
        }

        BulkEditRequest {
            edited_fields_input: input,
            selected_actions,
            selected_issue_ids_or_keys: items.iter().map(|i| i.id.clone()).collect(),
            send_bulk_notification,
        }
    }
}
