//! Bulk move and bulk edit request bodies

use bulkops_core::models::TargetFieldValue;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;

/// Mandatory field values for one target block, keyed by field id
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TargetMandatoryFields {
    pub fields: BTreeMap<String, TargetFieldValue>,
}

impl TargetMandatoryFields {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Issues moving to one (project, issue type) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetToSourcesMapping {
    pub infer_classification_defaults: bool,
    pub infer_field_defaults: bool,
    pub infer_status_defaults: bool,
    pub infer_subtask_type_default: bool,
    pub issue_ids_or_keys: Vec<String>,
    pub target_classification: Vec<serde_json::Value>,
    pub target_mandatory_fields: Vec<TargetMandatoryFields>,
}

impl Default for TargetToSourcesMapping {
    fn default() -> Self {
        Self {
            infer_classification_defaults: true,
            infer_field_defaults: true,
            infer_status_defaults: true,
            infer_subtask_type_default: true,
            issue_ids_or_keys: Vec::new(),
            target_classification: Vec::new(),
            target_mandatory_fields: Vec::new(),
        }
    }
}

impl TargetToSourcesMapping {
    /// Explicit defaults switch off field default inference for this block only
    pub fn with_field_defaults(mut self, defaults: TargetMandatoryFields) -> Self {
        if !defaults.is_empty() {
            self.infer_field_defaults = false;
            self.target_mandatory_fields = vec![defaults];
        }
        self
    }
}

/// Key of a target block on the wire: "<projectId>,<issueTypeId>"
pub fn target_key(project_id: &str, issue_type_id: &str) -> String {
    format!("{},{}", project_id, issue_type_id)
}

/// POST /rest/api/3/bulk/issues/move body; blocks keep insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkMoveRequest {
    pub send_bulk_notification: bool,
    target_to_sources_mapping: Vec<(String, TargetToSourcesMapping)>,
}

impl BulkMoveRequest {
    pub fn new(send_bulk_notification: bool) -> Self {
        Self {
            send_bulk_notification,
            target_to_sources_mapping: Vec::new(),
        }
    }

    /// Appends a block, replacing an existing block with the same key in place
    pub fn add_mapping(&mut self, project_id: &str, issue_type_id: &str, mapping: TargetToSourcesMapping) {
        let key = target_key(project_id, issue_type_id);
        match self.target_to_sources_mapping.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = mapping,
            None => self.target_to_sources_mapping.push((key, mapping)),
        }
    }

    pub fn blocks(&self) -> &[(String, TargetToSourcesMapping)] {
        &self.target_to_sources_mapping
    }

    pub fn block(&self, project_id: &str, issue_type_id: &str) -> Option<&TargetToSourcesMapping> {
        let key = target_key(project_id, issue_type_id);
        self.target_to_sources_mapping
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, m)| m)
    }

    pub fn issue_count(&self) -> usize {
        self.target_to_sources_mapping
            .iter()
            .map(|(_, m)| m.issue_ids_or_keys.len())
            .sum()
    }
}

struct OrderedMappings<'a>(&'a [(String, TargetToSourcesMapping)]);

impl Serialize for OrderedMappings<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, mapping) in self.0 {
            map.serialize_entry(key, mapping)?;
        }
        map.end()
    }
}

impl Serialize for BulkMoveRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("sendBulkNotification", &self.send_bulk_notification)?;
        map.serialize_entry(
            "targetToSourcesMapping",
            &OrderedMappings(&self.target_to_sources_mapping),
        )?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearableNumberField {
    pub field_id: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedOption {
    pub option_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleSelectField {
    pub field_id: String,
    pub option: SelectedOption,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub account_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPickerField {
    pub field_id: String,
    pub user: Option<UserRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelsField {
    pub field_id: String,
    pub labels: Vec<LabelRef>,
    pub bulk_edit_multi_select_field_option: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditedFieldsInput {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clearable_number_fields: Vec<ClearableNumberField>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub single_select_fields: Vec<SingleSelectField>,
    #[serde(rename = "singleselectClearableUserPickerFields", skip_serializing_if = "Vec::is_empty")]
    pub singleselect_clearable_user_picker_fields: Vec<UserPickerField>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels_fields: Vec<LabelsField>,
}

impl EditedFieldsInput {
    pub fn is_empty(&self) -> bool {
        self.clearable_number_fields.is_empty()
            && self.single_select_fields.is_empty()
            && self.singleselect_clearable_user_picker_fields.is_empty()
            && self.labels_fields.is_empty()
    }
}

/// POST /rest/api/3/bulk/issues/fields body
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkEditRequest {
    pub edited_fields_input: EditedFieldsInput,
    pub selected_actions: Vec<String>,
    pub selected_issue_ids_or_keys: Vec<String>,
    pub send_bulk_notification: bool,
}
