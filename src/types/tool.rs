//! Tool descriptors: `{name, description, inputSchema}`.
//!
//! Grounded on `siumai-core/src/types/tools/tool.rs`'s Function/ProviderDefined split.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// A JSON-Schema object describing the tool's input.
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Tool {
    Function(#[serde(flatten)] ToolFunction),
    #[serde(rename = "provider-defined")]
    ProviderDefined { id: String, name: String, args: Option<Value> },
}

impl Tool {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Tool::Function(ToolFunction {
            name: name.into(),
            description: Some(description.into()),
            parameters,
        })
    }

    pub fn provider_defined(id: impl Into<String>, name: impl Into<String>) -> Self {
        Tool::ProviderDefined {
            id: id.into(),
            name: name.into(),
            args: None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Tool::Function(f) => &f.name,
            Tool::ProviderDefined { name, .. } => name,
        }
    }

    /// Field names listed under the schema's top-level `required` array, if any.
    pub fn required_fields(&self) -> Vec<String> {
        match self {
            Tool::Function(f) => f
                .parameters
                .get("required")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(str::to_owned))
                        .collect()
                })
                .unwrap_or_default(),
            Tool::ProviderDefined { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
    Specific {
        name: String,
    },
}

impl ToolChoice {
    pub fn tool(name: impl Into<String>) -> Self {
        ToolChoice::Specific { name: name.into() }
    }
}
