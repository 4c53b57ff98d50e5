//! Target field metadata and default values

use super::adf::AdfDocument;
use serde::{Deserialize, Serialize};

const TEXTAREA_CUSTOM_TYPE: &str = "com.atlassian.jira.plugin.system.customfieldtypes:textarea";
const RICH_TEXT_SYSTEM_FIELDS: [&str; 2] = ["description", "environment"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedValue {
    pub id: String,
    #[serde(default, alias = "value")]
    pub name: Option<String>,
}

/// Server declared metadata for one field of one issue type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMetadata {
    #[serde(alias = "fieldId")]
    pub id: String,
    #[serde(default)]
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub has_default_value: bool,
    pub schema: FieldSchema,
    #[serde(default)]
    pub allowed_values: Vec<AllowedValue>,
}

impl FieldMetadata {
    /// Mandatory on the server and not satisfied by a server default
    pub fn needs_user_default(&self) -> bool {
        self.required && !self.has_default_value
    }

    pub fn shape(&self) -> FieldShape {
        FieldShape::from_schema(&self.schema)
    }

    pub fn is_allowed_value(&self, id: &str) -> bool {
        self.allowed_values.iter().any(|v| v.id == id)
    }
}

/// Field shapes a default value can be supplied for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldShape {
    SingleOption,
    MultiOption,
    Number,
    PlainText,
    RichText,
    Unsupported(String),
}

impl FieldShape {
    pub fn from_schema(schema: &FieldSchema) -> Self {
        match schema.field_type.as_str() {
            "option" | "options" => FieldShape::SingleOption,
            "array" if schema.items.as_deref() == Some("option") => FieldShape::MultiOption,
            "number" => FieldShape::Number,
            "string" => {
                let is_textarea = schema.custom.as_deref() == Some(TEXTAREA_CUSTOM_TYPE);
                let is_rich_system = schema
                    .system
                    .as_deref()
                    .map(|s| RICH_TEXT_SYSTEM_FIELDS.contains(&s))
                    .unwrap_or(false);
                if is_textarea || is_rich_system {
                    FieldShape::RichText
                } else {
                    FieldShape::PlainText
                }
            }
            other => FieldShape::Unsupported(other.to_string()),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, FieldShape::Unsupported(_))
    }
}

/// A chosen default: scalar values or a rich text document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum DefaultFieldValue {
    Raw(Vec<serde_json::Value>),
    #[serde(rename = "adf")]
    RichText(AdfDocument),
}

impl DefaultFieldValue {
    pub fn raw_string(value: impl Into<String>) -> Self {
        DefaultFieldValue::Raw(vec![serde_json::Value::String(value.into())])
    }

    pub fn is_empty(&self) -> bool {
        match self {
            DefaultFieldValue::Raw(values) => values.is_empty(),
            DefaultFieldValue::RichText(doc) => doc.content.is_empty(),
        }
    }
}

/// Tracked state for one mandatory field of one target issue type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMappingInfo {
    pub field: FieldMetadata,
    pub shape: FieldShape,
    pub default: Option<DefaultFieldValue>,
    pub retain: bool,
}

impl FieldMappingInfo {
    pub fn new(field: FieldMetadata) -> Self {
        let shape = field.shape();
        Self {
            field,
            shape,
            default: None,
            retain: false,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        self.retain || self.default.is_some()
    }
}

/// Field value in the shape the bulk move endpoint expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetFieldValue {
    pub retain: bool,
    #[serde(rename = "type")]
    pub value_type: String,
    pub value: serde_json::Value,
}

impl TargetFieldValue {
    pub fn from_mapping(info: &FieldMappingInfo) -> Option<Self> {
        let (value_type, value) = match &info.default {
            Some(DefaultFieldValue::Raw(values)) => {
                ("raw", serde_json::Value::Array(values.clone()))
            }
            Some(DefaultFieldValue::RichText(doc)) => ("adf", serde_json::to_value(doc).ok()?),
            None if info.retain => ("raw", serde_json::Value::Array(Vec::new())),
            None => return None,
        };
        Some(Self {
            retain: info.retain,
            value_type: value_type.to_string(),
            value,
        })
    }
}

/// Field offered by the bulk edit endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditableField {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub allowed_values: Vec<AllowedValue>,
}

/// Value chosen for a bulk edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum EditValue {
    /// `None` clears the field
    Number(Option<f64>),
    OptionId(String),
    /// `None` unassigns
    AccountId(Option<String>),
    Labels(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::adf::text_to_adf;

    fn schema(field_type: &str) -> FieldSchema {
        FieldSchema {
            field_type: field_type.to_string(),
            ..FieldSchema::default()
        }
    }

    #[test]
    fn test_shape_from_schema() {
        assert_eq!(FieldShape::from_schema(&schema("option")), FieldShape::SingleOption);
        assert_eq!(FieldShape::from_schema(&schema("number")), FieldShape::Number);
        assert_eq!(FieldShape::from_schema(&schema("string")), FieldShape::PlainText);

        let multi = FieldSchema {
            items: Some("option".to_string()),
            ..schema("array")
        };
        assert_eq!(FieldShape::from_schema(&multi), FieldShape::MultiOption);

        let users = FieldSchema {
            items: Some("user".to_string()),
            ..schema("array")
        };
        assert_eq!(
            FieldShape::from_schema(&users),
            FieldShape::Unsupported("array".to_string())
        );

        let description = FieldSchema {
            system: Some("description".to_string()),
            ..schema("string")
        };
        assert_eq!(FieldShape::from_schema(&description), FieldShape::RichText);
        assert!(!FieldShape::from_schema(&schema("user")).is_supported());
    }

    #[test]
    fn test_metadata_deserialize() {
        let json = r#"{
            "fieldId": "customfield_10050",
            "key": "customfield_10050",
            "name": "Severity",
            "required": true,
            "hasDefaultValue": false,
            "schema": {"type": "option", "custom": "com.atlassian.jira.plugin.system.customfieldtypes:select"},
            "allowedValues": [{"id": "1", "value": "High"}, {"id": "2", "value": "Low"}]
        }"#;
        let field: FieldMetadata = serde_json::from_str(json).unwrap();
        assert!(field.needs_user_default());
        assert_eq!(field.shape(), FieldShape::SingleOption);
        assert_eq!(field.allowed_values[0].name.as_deref(), Some("High"));
        assert!(field.is_allowed_value("2"));
    }

    #[test]
    fn test_target_field_value() {
        let field = FieldMetadata {
            id: "description".to_string(),
            key: "description".to_string(),
            name: "Description".to_string(),
            required: true,
            has_default_value: false,
            schema: schema("string"),
            allowed_values: Vec::new(),
        };
        let mut info = FieldMappingInfo::new(field);
        assert!(TargetFieldValue::from_mapping(&info).is_none());

        info.default = Some(DefaultFieldValue::RichText(text_to_adf("moved")));
        let value = TargetFieldValue::from_mapping(&info).unwrap();
        assert_eq!(value.value_type, "adf");
        assert_eq!(value.value["type"], "doc");

        info.default = Some(DefaultFieldValue::raw_string("x"));
        let value = TargetFieldValue::from_mapping(&info).unwrap();
        assert_eq!(value.value_type, "raw");
        assert_eq!(value.value, serde_json::json!(["x"]));
    }
}
