//! Business rules layered over the platform's own bulk operation constraints

use crate::models::{
    BulkOperationMode, BulkOperationRules, EditValue, EditableField, IssueType,
    IssueTypeMappingStrategy, OperationOutcome, Project, WorkItem,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

const UNDEFINED_CATEGORY_ID: &str = "[undefined]";

/// How the user expressed the issue filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Basic,
    Advanced,
}

/// Candidate target issue type with its selectability for a given source type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTypeOption {
    pub issue_type: IssueType,
    pub selectable: bool,
}

/// Pure filter and validation functions parameterised by static rules
#[derive(Debug, Clone, Default)]
pub struct RuleEnforcer {
    rules: BulkOperationRules,
}

impl RuleEnforcer {
    pub fn new(rules: BulkOperationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &BulkOperationRules {
        &self.rules
    }

    fn augmentation_criteria(&self) -> Vec<String> {
        let mut criteria = Vec::new();
        if !self.rules.enable_bulk_change_of_resolved_issues {
            criteria.push("statusCategory != Done".to_string());
        }
        if !self.rules.excluded_issue_statuses.is_empty() {
            let quoted = self
                .rules
                .excluded_issue_statuses
                .iter()
                .map(|s| format!("\"{}\"", s))
                .collect::<Vec<_>>()
                .join(",");
            criteria.push(format!("status not in ({})", quoted));
        }
        criteria
    }

    /// Prefixes the user's query with the rule criteria
    pub fn augment_query(&self, jql: &str, mode: BulkOperationMode) -> String {
        let criteria = self.augmentation_criteria();
        if criteria.is_empty() {
            return jql.to_string();
        }

        let prefix = criteria.join(" and ");
        let augmented = if jql.trim().is_empty() {
            prefix
        } else {
            format!("{} and {}", prefix, jql)
        };
        debug!("Augmented {:?} query: {}", mode, augmented);
        augmented
    }

    /// Explanation shown next to the filter; empty when the query is left untouched
    pub fn query_augmentation_text(&self, filter_mode: FilterMode) -> String {
        let subject = match filter_mode {
            FilterMode::Advanced => "The entered JQL",
            FilterMode::Basic => "The selected criteria",
        };

        let mut exclusions = Vec::new();
        if !self.rules.enable_bulk_change_of_resolved_issues {
            exclusions.push("resolved issues".to_string());
        }
        if !self.rules.excluded_issue_statuses.is_empty() {
            exclusions.push(format!(
                "issues in the statuses {}",
                self.rules.excluded_issue_statuses.join(", ")
            ));
        }

        if exclusions.is_empty() {
            String::new()
        } else {
            format!(
                "{} is automatically augmented to exclude {}.",
                subject,
                exclusions.join(" and ")
            )
        }
    }

    pub fn filter_source_projects(&self, projects: Vec<Project>) -> Vec<Project> {
        projects
            .into_iter()
            .filter(|p| !self.rules.excluded_project_keys.contains(&p.key))
            .collect()
    }

    /// Hook for restricting source issue types; all are currently offered
    pub fn filter_source_issue_types(&self, issue_types: Vec<IssueType>) -> Vec<IssueType> {
        issue_types
    }

    pub fn filter_target_issue_types(&self, issue_types: Vec<IssueType>) -> Vec<IssueType> {
        issue_types
            .into_iter()
            .filter(|t| !self.rules.excluded_target_issue_type_names.contains(&t.name))
            .collect()
    }

    pub fn filter_edit_fields(&self, fields: Vec<EditableField>) -> Vec<EditableField> {
        fields
            .into_iter()
            .filter(|f| !self.rules.excluded_edit_field_ids.contains(&f.id))
            .collect()
    }

    /// Target projects the selected items may be moved to
    pub fn filter_target_projects(&self, items: &[WorkItem], candidates: Vec<Project>) -> Vec<Project> {
        let mut filtered = candidates;

        if !self.rules.allow_moves_across_project_categories {
            let source_categories: HashSet<&str> = items
                .iter()
                .map(|item| {
                    item.project
                        .category
                        .as_ref()
                        .map(|c| c.id.as_str())
                        .unwrap_or(UNDEFINED_CATEGORY_ID)
                })
                .collect();

            if source_categories.len() > 1 {
                debug!("Selection spans {} project categories", source_categories.len());
                return Vec::new();
            }

            filtered.retain(|project| {
                let category = project
                    .category
                    .as_ref()
                    .map(|c| c.id.as_str())
                    .unwrap_or(UNDEFINED_CATEGORY_ID);
                source_categories.is_empty() || source_categories.contains(category)
            });
        }

        if !self.rules.allow_target_project_to_match_source_project {
            let source_keys: HashSet<&str> = items
                .iter()
                .map(|item| item.project_key_from_issue_key())
                .collect();
            filtered.retain(|project| !source_keys.contains(project.key.as_str()));
        }

        filtered
    }

    /// Checks a proposed bulk edit value, optionally against other edited values
    pub fn validate_field_value(
        &self,
        field: &EditableField,
        value: &EditValue,
        _other_values: &HashMap<String, EditValue>,
    ) -> OperationOutcome {
        match value {
            EditValue::Number(Some(n)) if !n.is_finite() => {
                OperationOutcome::failed(format!("The value of \"{}\" must be a number.", field.name))
            }
            EditValue::OptionId(id)
                if !field.allowed_values.is_empty()
                    && !field.allowed_values.iter().any(|v| &v.id == id) =>
            {
                OperationOutcome::failed(format!(
                    "\"{}\" is not an allowed value of \"{}\".",
                    id, field.name
                ))
            }
            EditValue::Labels(labels) if labels.iter().any(|l| l.chars().any(char::is_whitespace)) => {
                OperationOutcome::failed(format!("Labels in \"{}\" cannot contain spaces.", field.name))
            }
            _ => OperationOutcome::ok(),
        }
    }

    fn is_allow_listed(&self, source: &IssueType, target: &IssueType) -> bool {
        self.rules
            .allowed_issue_type_mappings
            .iter()
            .any(|m| m.source == source.name && m.target == target.name)
    }

    /// Sole authority on whether a source issue type may map to a target issue type
    pub fn is_mapping_allowed(&self, source: &IssueType, target: &IssueType) -> bool {
        let level_ok = !self.rules.restrict_mappings_to_same_hierarchy_level
            || source.hierarchy_level == target.hierarchy_level;
        if !level_ok {
            return false;
        }

        match self.rules.issue_type_mapping_strategy {
            IssueTypeMappingStrategy::AllMappingsAtSameLevelAllowed => true,
            IssueTypeMappingStrategy::ExactMatchesAndAllowListedMappings => {
                source.name == target.name || self.is_allow_listed(source, target)
            }
            IssueTypeMappingStrategy::OnlyAllowListedMappings => self.is_allow_listed(source, target),
        }
    }

    /// Target issue types offered for a source type, each flagged selectable or not
    pub fn target_issue_type_options(
        &self,
        source: &IssueType,
        candidates: &[IssueType],
    ) -> Vec<IssueTypeOption> {
        self.filter_target_issue_types(candidates.to_vec())
            .into_iter()
            .map(|issue_type| {
                let selectable = self.is_mapping_allowed(source, &issue_type);
                IssueTypeOption {
                    issue_type,
                    selectable,
                }
            })
            .collect()
    }
}
