//! Application configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub jira: JiraConfig,
    #[serde(default)]
    pub rules: BulkOperationRules,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JiraConfig {
    /// Site URL, e.g. https://your-domain.atlassian.net
    pub base_url: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubtaskMoveStrategy {
    MoveSubtasksExplicitlyWithParents,
    IssuesWithSubtasksCanNotBeMoved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueTypeMappingStrategy {
    AllMappingsAtSameLevelAllowed,
    ExactMatchesAndAllowListedMappings,
    OnlyAllowListedMappings,
}

/// Source issue type name that may be mapped to a target issue type name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedIssueTypeMapping {
    pub source: String,
    pub target: String,
}

/// Static business rules applied on top of the platform's own constraints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BulkOperationRules {
    pub allow_target_project_to_match_source_project: bool,
    pub allow_moves_across_project_categories: bool,
    pub allow_moves_from_multiple_projects: bool,
    pub allow_edits_from_multiple_projects: bool,
    pub allow_multiple_issue_types_in_move: bool,
    pub allow_multiple_issue_types_in_edit: bool,
    pub enable_bulk_change_of_resolved_issues: bool,
    pub excluded_issue_statuses: Vec<String>,
    pub excluded_project_keys: Vec<String>,
    pub excluded_target_issue_type_names: Vec<String>,
    pub excluded_edit_field_ids: Vec<String>,
    pub subtask_move_strategy: SubtaskMoveStrategy,
    pub issue_type_mapping_strategy: IssueTypeMappingStrategy,
    pub restrict_mappings_to_same_hierarchy_level: bool,
    pub allowed_issue_type_mappings: Vec<AllowedIssueTypeMapping>,
}

impl Default for BulkOperationRules {
    fn default() -> Self {
        Self {
            allow_target_project_to_match_source_project: false,
            allow_moves_across_project_categories: false,
            allow_moves_from_multiple_projects: false,
            allow_edits_from_multiple_projects: true,
            allow_multiple_issue_types_in_move: true,
            allow_multiple_issue_types_in_edit: true,
            enable_bulk_change_of_resolved_issues: false,
            excluded_issue_statuses: Vec::new(),
            excluded_project_keys: Vec::new(),
            excluded_target_issue_type_names: Vec::new(),
            excluded_edit_field_ids: vec!["reporter".to_string()],
            subtask_move_strategy: SubtaskMoveStrategy::MoveSubtasksExplicitlyWithParents,
            issue_type_mapping_strategy: IssueTypeMappingStrategy::AllMappingsAtSameLevelAllowed,
            restrict_mappings_to_same_hierarchy_level: true,
            allowed_issue_type_mappings: Vec::new(),
        }
    }
}

impl BulkOperationRules {
    /// Validate the business rules
    pub fn validate(&self) -> Result<()> {
        for mapping in &self.allowed_issue_type_mappings {
            if mapping.source.trim().is_empty() || mapping.target.trim().is_empty() {
                return Err(Error::Validation(
                    "Allowed issue type mappings need both a source and a target name".to_string(),
                ));
            }
        }

        if self
            .excluded_issue_statuses
            .iter()
            .any(|s| s.contains('"'))
        {
            return Err(Error::Validation(
                "Excluded issue statuses cannot contain double quotes".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Window over which step updates are coalesced
    pub debounce_ms: u64,
    pub mapping_notification_delay_ms: u64,
    /// Show fields of unsupported types with a marker instead of hiding them
    pub show_unsupported_fields: bool,
    pub show_retain_option: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            mapping_notification_delay_ms: 1000,
            show_unsupported_fields: false,
            show_retain_option: true,
        }
    }
}

impl WorkflowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.debounce_ms == 0 {
            return Err(Error::Validation(
                "Debounce window must be greater than 0".to_string(),
            ));
        }

        const MAX_DELAY: u64 = 10_000;
        if self.debounce_ms > MAX_DELAY || self.mapping_notification_delay_ms > MAX_DELAY {
            return Err(Error::Validation(format!(
                "Workflow delays cannot exceed {} ms",
                MAX_DELAY
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskConfig {
    pub poll_interval_ms: u64,
    pub submit_retry_limit: u32,
    pub submit_retry_delay_ms: u64,
    pub metadata_retry_limit: u32,
    pub metadata_retry_delay_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            submit_retry_limit: 3,
            submit_retry_delay_ms: 2000,
            metadata_retry_limit: 3,
            metadata_retry_delay_ms: 1000,
        }
    }
}

impl TaskConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Validation(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        const MAX_RETRIES: u32 = 10;
        if self.submit_retry_limit > MAX_RETRIES || self.metadata_retry_limit > MAX_RETRIES {
            return Err(Error::Validation(format!(
                "Retry limits cannot exceed {}",
                MAX_RETRIES
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImportConfig {
    pub max_issues: usize,
    pub delimiter: char,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_issues: 1000,
            delimiter: ',',
        }
    }
}

impl ImportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_issues == 0 {
            return Err(Error::Validation(
                "Maximum issues to import must be greater than 0".to_string(),
            ));
        }
        if !self.delimiter.is_ascii() || self.delimiter == '"' || self.delimiter == '\n' {
            return Err(Error::Validation(format!(
                "Invalid import delimiter '{}'",
                self.delimiter.escape_default()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(Error::Validation(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.log_level,
                valid_log_levels.join(", ")
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(ref url) = self.jira.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Validation(
                    "Jira base URL must start with http:// or https://".to_string(),
                ));
            }
        }
        self.rules.validate()?;
        self.workflow.validate()?;
        self.tasks.validate()?;
        self.import.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            jira: JiraConfig::default(),
            rules: BulkOperationRules::default(),
            workflow: WorkflowConfig::default(),
            tasks: TaskConfig::default(),
            import: ImportConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.tasks.poll_interval_ms, 1000);
        assert_eq!(config.workflow.debounce_ms, 100);
        assert_eq!(config.import.max_issues, 1000);
        assert_eq!(config.rules.excluded_edit_field_ids, vec!["reporter"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_rules_use_defaults() {
        let json = r#"{
            "version": "1.0.0",
            "rules": {"issue_type_mapping_strategy": "only-allow-listed-mappings"}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.rules.issue_type_mapping_strategy,
            IssueTypeMappingStrategy::OnlyAllowListedMappings
        );
        assert!(config.rules.restrict_mappings_to_same_hierarchy_level);
        assert_eq!(config.logging.log_level, "info");
    }

    #[test]
    fn test_logging_config_validation() {
        let mut config = LoggingConfig::default();
        assert!(config.validate().is_ok());

        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_task_config_validation() {
        let mut config = TaskConfig {
            poll_interval_ms: 0,
            ..TaskConfig::default()
        };
        assert!(config.validate().is_err());

        config.poll_interval_ms = 500;
        config.submit_retry_limit = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rules_validation() {
        let mut rules = BulkOperationRules::default();
        rules.allowed_issue_type_mappings.push(AllowedIssueTypeMapping {
            source: "Bug".to_string(),
            target: "".to_string(),
        });
        assert!(rules.validate().is_err());

        let rules = BulkOperationRules {
            excluded_issue_statuses: vec!["Won\"t do".to_string()],
            ..BulkOperationRules::default()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_jira_url_validation() {
        let mut config = Config::default();
        config.jira.base_url = Some("example.atlassian.net".to_string());
        assert!(config.validate().is_err());

        config.jira.base_url = Some("https://example.atlassian.net".to_string());
        assert!(config.validate().is_ok());
    }
}
