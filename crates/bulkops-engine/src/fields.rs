//! Mandatory field defaults for the target issue types of a move

use bulkops_core::models::{
    text_to_adf, DefaultFieldValue, FieldMappingInfo, FieldMetadata, FieldShape, TargetFieldValue,
};
use bulkops_jira::{GatewayError, JiraGateway, TargetMandatoryFields};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::generation::{Generation, GenerationTracker};
use crate::retry::retry_transient;

/// Fields a move carries over on its own
pub const IMPLICIT_FIELDS: [&str; 5] = ["project", "issuetype", "summary", "reporter", "parent"];

#[derive(Debug, thiserror::Error)]
pub enum FieldResolverError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Field {field_id} is not tracked for issue type {issue_type_id}")]
    UnknownField { issue_type_id: String, field_id: String },

    #[error("Field {0} has an unsupported type and can not be given a default")]
    UnsupportedField(String),

    #[error("Invalid value for field {field_id}: {reason}")]
    InvalidValue { field_id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, FieldResolverError>;

type FieldMappings = BTreeMap<String, BTreeMap<String, FieldMappingInfo>>;

/// Tracks, per target issue type, the mandatory fields the user must supply
#[derive(Clone)]
pub struct TargetFieldResolver {
    gateway: Arc<dyn JiraGateway>,
    generations: GenerationTracker,
    /// project id -> issue type id -> fields
    cache: Arc<RwLock<HashMap<String, HashMap<String, Vec<FieldMetadata>>>>>,
    mappings: Arc<RwLock<FieldMappings>>,
    show_unsupported_fields: bool,
    retry_limit: u32,
    retry_delay: Duration,
}

impl TargetFieldResolver {
    pub fn new(gateway: Arc<dyn JiraGateway>, generations: GenerationTracker) -> Self {
        Self {
            gateway,
            generations,
            cache: Arc::new(RwLock::new(HashMap::new())),
            mappings: Arc::new(RwLock::new(BTreeMap::new())),
            show_unsupported_fields: false,
            retry_limit: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_retry(mut self, limit: u32, delay: Duration) -> Self {
        self.retry_limit = limit;
        self.retry_delay = delay;
        self
    }

    pub fn with_unsupported_fields_shown(mut self, show: bool) -> Self {
        self.show_unsupported_fields = show;
        self
    }

    /// Creation metadata of one issue type, cached per project
    pub async fn fetch_field_metadata(&self, project_id: &str, issue_type_id: &str) -> Result<Vec<FieldMetadata>> {
        if let Some(fields) = self
            .cache
            .read()
            .await
            .get(project_id)
            .and_then(|types| types.get(issue_type_id))
        {
            return Ok(fields.clone());
        }

        let gateway = self.gateway.as_ref();
        let what = format!("field metadata for {}/{}", project_id, issue_type_id);
        let fields = retry_transient(self.retry_limit, self.retry_delay, &what, move || {
            gateway.get_create_field_metadata(project_id, issue_type_id)
        })
        .await?;

        self.cache
            .write()
            .await
            .entry(project_id.to_string())
            .or_default()
            .insert(issue_type_id.to_string(), fields.clone());
        Ok(fields)
    }

    /// Rebuilds the tracked fields for the target types in play.
    ///
    /// Returns `false` when `generation` went stale while metadata was being
    /// fetched; the result is then discarded.
    pub async fn refresh(&self, project_id: &str, target_issue_type_ids: &[String], generation: Generation) -> Result<bool> {
        let mut fields_by_type = BTreeMap::new();
        for issue_type_id in target_issue_type_ids {
            let fields = self.fetch_field_metadata(project_id, issue_type_id).await?;
            fields_by_type.insert(issue_type_id.clone(), fields);
        }

        if !self.generations.is_current(generation) {
            tracing::debug!(
                "Discarding field metadata for project {} fetched for stale generation {}",
                project_id,
                generation.value()
            );
            return Ok(false);
        }

        self.set_project_field_mappings(fields_by_type).await;
        Ok(true)
    }

    /// Replaces the tracked fields; all previously chosen defaults are dropped
    pub async fn set_project_field_mappings(&self, fields_by_type: BTreeMap<String, Vec<FieldMetadata>>) {
        let mut mappings = BTreeMap::new();
        for (issue_type_id, fields) in fields_by_type {
            let tracked: BTreeMap<String, FieldMappingInfo> = fields
                .into_iter()
                .filter(|f| f.needs_user_default() && !IMPLICIT_FIELDS.contains(&f.id.as_str()))
                .map(|f| {
                    let info = FieldMappingInfo::new(f);
                    if let FieldShape::Unsupported(kind) = &info.shape {
                        tracing::warn!("Mandatory field {} has unsupported type {}", info.field.id, kind);
                    }
                    (info.field.id.clone(), info)
                })
                .collect();
            mappings.insert(issue_type_id, tracked);
        }
        *self.mappings.write().await = mappings;
    }

    async fn update_field<F>(&self, issue_type_id: &str, field_id: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut FieldMappingInfo) -> Result<()>,
    {
        let mut mappings = self.mappings.write().await;
        let info = mappings
            .get_mut(issue_type_id)
            .and_then(|fields| fields.get_mut(field_id))
            .ok_or_else(|| FieldResolverError::UnknownField {
                issue_type_id: issue_type_id.to_string(),
                field_id: field_id.to_string(),
            })?;
        update(info)
    }

    pub async fn on_select_default_value(&self, issue_type_id: &str, field_id: &str, value: DefaultFieldValue) -> Result<()> {
        self.update_field(issue_type_id, field_id, |info| {
            check_value(info, &value)?;
            info.default = Some(value);
            Ok(())
        })
        .await
    }

    /// Convenience for text input: rich text fields get a document, others the raw string
    pub async fn on_select_text_value(&self, issue_type_id: &str, field_id: &str, text: &str) -> Result<()> {
        let shape = self
            .tracked_field(issue_type_id, field_id)
            .await
            .map(|info| info.shape)
            .ok_or_else(|| FieldResolverError::UnknownField {
                issue_type_id: issue_type_id.to_string(),
                field_id: field_id.to_string(),
            })?;

        let value = match shape {
            FieldShape::RichText => DefaultFieldValue::RichText(text_to_adf(text)),
            FieldShape::MultiOption => DefaultFieldValue::Raw(
                text.split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| serde_json::Value::String(s.to_string()))
                    .collect(),
            ),
            _ => DefaultFieldValue::raw_string(text),
        };
        self.on_select_default_value(issue_type_id, field_id, value).await
    }

    pub async fn on_deselect_default_value(&self, issue_type_id: &str, field_id: &str) -> Result<()> {
        self.update_field(issue_type_id, field_id, |info| {
            info.default = None;
            Ok(())
        })
        .await
    }

    pub async fn on_select_retain_field_value(&self, issue_type_id: &str, field_id: &str, retain: bool) -> Result<()> {
        self.update_field(issue_type_id, field_id, |info| {
            info.retain = retain;
            Ok(())
        })
        .await
    }

    pub async fn selected_default_value(&self, issue_type_id: &str, field_id: &str) -> Option<DefaultFieldValue> {
        self.tracked_field(issue_type_id, field_id)
            .await
            .and_then(|info| info.default)
    }

    pub async fn retain_field_value(&self, issue_type_id: &str, field_id: &str) -> bool {
        self.tracked_field(issue_type_id, field_id)
            .await
            .map(|info| info.retain)
            .unwrap_or(false)
    }

    pub async fn tracked_field(&self, issue_type_id: &str, field_id: &str) -> Option<FieldMappingInfo> {
        self.mappings
            .read()
            .await
            .get(issue_type_id)
            .and_then(|fields| fields.get(field_id))
            .cloned()
    }

    /// Every tracked field has a default or keeps its current value
    pub async fn are_all_field_values_set(&self) -> bool {
        self.mappings
            .read()
            .await
            .values()
            .flat_map(|fields| fields.values())
            .all(FieldMappingInfo::is_satisfied)
    }

    /// Unsatisfied fields of one target type, in field id order
    pub async fn fields_needing_defaults(&self, issue_type_id: &str) -> Vec<FieldMappingInfo> {
        self.mappings
            .read()
            .await
            .get(issue_type_id)
            .map(|fields| {
                fields
                    .values()
                    .filter(|info| !info.is_satisfied())
                    .filter(|info| self.show_unsupported_fields || info.shape.is_supported())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn tracked_issue_type_ids(&self) -> Vec<String> {
        self.mappings.read().await.keys().cloned().collect()
    }

    /// Chosen defaults in request shape; types without any are left out
    pub async fn field_defaults_by_target_type(&self) -> HashMap<String, TargetMandatoryFields> {
        let mappings = self.mappings.read().await;
        let mut defaults = HashMap::new();
        for (issue_type_id, fields) in mappings.iter() {
            let mut values = TargetMandatoryFields::default();
            for (field_id, info) in fields {
                if let Some(value) = TargetFieldValue::from_mapping(info) {
                    values.fields.insert(field_id.clone(), value);
                }
            }
            if !values.is_empty() {
                defaults.insert(issue_type_id.clone(), values);
            }
        }
        defaults
    }
}

fn invalid(info: &FieldMappingInfo, reason: &str) -> FieldResolverError {
    FieldResolverError::InvalidValue {
        field_id: info.field.id.clone(),
        reason: reason.to_string(),
    }
}

fn raw_value_id(value: &serde_json::Value) -> Option<&str> {
    match value {
        serde_json::Value::String(s) => Some(s.as_str()),
        serde_json::Value::Object(map) => map.get("id").and_then(|id| id.as_str()),
        _ => None,
    }
}

/// Checks a default against the field's shape and allowed values
fn check_value(info: &FieldMappingInfo, value: &DefaultFieldValue) -> Result<()> {
    let values = match (&info.shape, value) {
        (FieldShape::Unsupported(_), _) => {
            return Err(FieldResolverError::UnsupportedField(info.field.id.clone()))
        }
        (FieldShape::RichText, DefaultFieldValue::RichText(_)) => return Ok(()),
        (FieldShape::RichText, DefaultFieldValue::Raw(_)) => {
            return Err(invalid(info, "rich text fields take a document"))
        }
        (_, DefaultFieldValue::RichText(_)) => {
            return Err(invalid(info, "only rich text fields take a document"))
        }
        (_, DefaultFieldValue::Raw(values)) => values,
    };

    if values.is_empty() {
        return Err(invalid(info, "no value given"));
    }

    match info.shape {
        FieldShape::SingleOption | FieldShape::MultiOption => {
            if info.shape == FieldShape::SingleOption && values.len() > 1 {
                return Err(invalid(info, "only one option can be chosen"));
            }
            for value in values {
                let id = raw_value_id(value).ok_or_else(|| invalid(info, "options are given by id"))?;
                if !info.field.allowed_values.is_empty() && !info.field.is_allowed_value(id) {
                    return Err(invalid(info, &format!("{} is not an allowed option", id)));
                }
            }
        }
        FieldShape::Number => {
            let numeric = values.iter().all(|v| match v {
                serde_json::Value::Number(_) => true,
                serde_json::Value::String(s) => s.trim().parse::<f64>().map(f64::is_finite).unwrap_or(false),
                _ => false,
            });
            if !numeric || values.len() > 1 {
                return Err(invalid(info, "expected a single number"));
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use bulkops_core::models::{AllowedValue, FieldSchema};
    use std::sync::atomic::Ordering;

    fn option_field(id: &str, options: &[&str]) -> FieldMetadata {
        let mut field = required_field(id, "option");
        field.allowed_values = options
            .iter()
            .map(|o| AllowedValue {
                id: o.to_string(),
                name: Some(format!("Option {}", o)),
            })
            .collect();
        field
    }

    fn description_field() -> FieldMetadata {
        let mut field = required_field("description", "string");
        field.schema = FieldSchema {
            field_type: "string".to_string(),
            system: Some("description".to_string()),
            ..FieldSchema::default()
        };
        field
    }

    async fn resolver_with(gateway: FakeGateway) -> (TargetFieldResolver, Arc<FakeGateway>, GenerationTracker) {
        let gateway = Arc::new(gateway);
        let generations = GenerationTracker::new();
        let resolver = TargetFieldResolver::new(gateway.clone(), generations.clone())
            .with_retry(2, Duration::from_millis(10));
        (resolver, gateway, generations)
    }

    #[tokio::test]
    async fn test_only_unsatisfied_explicit_fields_are_tracked() {
        let mut with_default = required_field("customfield_2", "string");
        with_default.has_default_value = true;
        let mut optional = required_field("customfield_3", "string");
        optional.required = false;

        let gateway = FakeGateway::new().with_field_metadata(
            "200",
            "20",
            vec![
                required_field("summary", "string"),
                required_field("reporter", "user"),
                option_field("customfield_1", &["1", "2"]),
                with_default,
                optional,
            ],
        );
        let (resolver, _, generations) = resolver_with(gateway).await;

        assert!(resolver.refresh("200", &["20".to_string()], generations.advance()).await.unwrap());
        let needed = resolver.fields_needing_defaults("20").await;
        assert_eq!(needed.len(), 1);
        assert_eq!(needed[0].field.id, "customfield_1");
        assert_eq!(needed[0].shape, FieldShape::SingleOption);
    }

    #[tokio::test]
    async fn test_default_value_round_trip() {
        let gateway = FakeGateway::new().with_field_metadata("200", "20", vec![option_field("customfield_1", &["1", "2"])]);
        let (resolver, _, generations) = resolver_with(gateway).await;
        resolver.refresh("200", &["20".to_string()], generations.advance()).await.unwrap();

        assert!(!resolver.are_all_field_values_set().await);

        let value = DefaultFieldValue::raw_string("2");
        resolver
            .on_select_default_value("20", "customfield_1", value.clone())
            .await
            .unwrap();
        assert_eq!(resolver.selected_default_value("20", "customfield_1").await, Some(value));
        assert!(resolver.are_all_field_values_set().await);

        resolver.on_deselect_default_value("20", "customfield_1").await.unwrap();
        assert_eq!(resolver.selected_default_value("20", "customfield_1").await, None);
        assert!(!resolver.are_all_field_values_set().await);
    }

    #[tokio::test]
    async fn test_invalid_defaults_are_refused() {
        let gateway = FakeGateway::new().with_field_metadata(
            "200",
            "20",
            vec![
                option_field("customfield_1", &["1", "2"]),
                required_field("customfield_5", "number"),
                required_field("customfield_6", "user"),
            ],
        );
        let (resolver, _, generations) = resolver_with(gateway).await;
        resolver.refresh("200", &["20".to_string()], generations.advance()).await.unwrap();

        assert!(matches!(
            resolver
                .on_select_default_value("20", "customfield_1", DefaultFieldValue::raw_string("9"))
                .await,
            Err(FieldResolverError::InvalidValue { .. })
        ));
        assert!(matches!(
            resolver
                .on_select_default_value("20", "customfield_5", DefaultFieldValue::raw_string("many"))
                .await,
            Err(FieldResolverError::InvalidValue { .. })
        ));
        assert!(resolver
            .on_select_default_value("20", "customfield_5", DefaultFieldValue::raw_string("3.5"))
            .await
            .is_ok());
        assert!(matches!(
            resolver
                .on_select_default_value("20", "customfield_6", DefaultFieldValue::raw_string("abc"))
                .await,
            Err(FieldResolverError::UnsupportedField(_))
        ));
        assert!(matches!(
            resolver
                .on_select_default_value("20", "customfield_404", DefaultFieldValue::raw_string("1"))
                .await,
            Err(FieldResolverError::UnknownField { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_fields_hidden_but_blocking_until_retained() {
        let gateway = FakeGateway::new().with_field_metadata("200", "20", vec![required_field("customfield_6", "user")]);
        let (resolver, _, generations) = resolver_with(gateway).await;
        resolver.refresh("200", &["20".to_string()], generations.advance()).await.unwrap();

        assert!(resolver.fields_needing_defaults("20").await.is_empty());
        assert!(!resolver.are_all_field_values_set().await);

        resolver.on_select_retain_field_value("20", "customfield_6", true).await.unwrap();
        assert!(resolver.retain_field_value("20", "customfield_6").await);
        assert!(resolver.are_all_field_values_set().await);

        let defaults = resolver.field_defaults_by_target_type().await;
        let value = &defaults["20"].fields["customfield_6"];
        assert!(value.retain);
        assert_eq!(value.value, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_rich_text_defaults_become_documents() {
        let gateway = FakeGateway::new().with_field_metadata("200", "20", vec![description_field()]);
        let (resolver, _, generations) = resolver_with(gateway).await;
        resolver.refresh("200", &["20".to_string()], generations.advance()).await.unwrap();

        resolver
            .on_select_text_value("20", "description", "Moved in bulk\nSee ticket")
            .await
            .unwrap();

        let defaults = resolver.field_defaults_by_target_type().await;
        let value = &defaults["20"].fields["description"];
        assert_eq!(value.value_type, "adf");
        assert_eq!(value.value["content"].as_array().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_refresh_is_discarded() {
        let gateway = FakeGateway::new().with_field_metadata("200", "20", vec![option_field("customfield_1", &["1"])]);
        *gateway.metadata_delay.lock().unwrap() = Some(Duration::from_millis(500));
        let (resolver, _, generations) = resolver_with(gateway).await;

        let generation = generations.advance();
        let refresh = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.refresh("200", &["20".to_string()], generation).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        generations.advance();

        assert!(!refresh.await.unwrap().unwrap());
        assert!(resolver.tracked_issue_type_ids().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_fetch_retries_and_caches() {
        let gateway = FakeGateway::new().with_field_metadata("200", "20", vec![option_field("customfield_1", &["1"])]);
        *gateway.metadata_failures.lock().unwrap() = 2;
        let (resolver, gateway, _) = resolver_with(gateway).await;

        let fields = resolver.fetch_field_metadata("200", "20").await.unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(gateway.metadata_calls.load(Ordering::SeqCst), 3);

        resolver.fetch_field_metadata("200", "20").await.unwrap();
        assert_eq!(gateway.metadata_calls.load(Ordering::SeqCst), 3);
    }
}
