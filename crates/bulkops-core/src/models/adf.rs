//! Minimal Atlassian document format support for rich text defaults

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdfDocument {
    pub version: u32,
    #[serde(rename = "type")]
    pub node_type: String,
    pub content: Vec<AdfNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdfNode {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<AdfNode>,
}

impl AdfNode {
    fn paragraph(line: &str) -> Self {
        let content = if line.is_empty() {
            Vec::new()
        } else {
            vec![AdfNode {
                node_type: "text".to_string(),
                text: Some(line.to_string()),
                content: Vec::new(),
            }]
        };
        AdfNode {
            node_type: "paragraph".to_string(),
            text: None,
            content,
        }
    }
}

/// Converts plain text to a document with one paragraph per line.
///
/// No markup is interpreted; formatting in the input is carried as literal text.
pub fn text_to_adf(text: &str) -> AdfDocument {
    AdfDocument {
        version: 1,
        node_type: "doc".to_string(),
        content: text.lines().map(AdfNode::paragraph).collect(),
    }
}

impl AdfDocument {
    /// Plain text rendering, one line per top level block
    pub fn to_plain_text(&self) -> String {
        fn collect(node: &AdfNode, out: &mut String) {
            if let Some(text) = &node.text {
                out.push_str(text);
            }
            for child in &node.content {
                collect(child, out);
            }
        }

        self.content
            .iter()
            .map(|block| {
                let mut line = String::new();
                collect(block, &mut line);
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// True when the JSON value has the shape of a document root
    pub fn is_adf_value(value: &serde_json::Value) -> bool {
        value.get("type").and_then(|t| t.as_str()) == Some("doc")
            && value.get("version").is_some()
            && value.get("content").map(|c| c.is_array()).unwrap_or(false)
    }
}
