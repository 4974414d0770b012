//! Neutral content model: message parts (caller-authored) and content (model-produced).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Provider-namespaced metadata bag, e.g. `{"anthropic": {"signature": "..."}}`.
pub type ProviderMetadata = HashMap<String, HashMap<String, Value>>;

/// A part of a caller-authored `Message`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    File {
        filename: Option<String>,
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
        media_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: Value,
        #[serde(default)]
        provider_executed: bool,
    },
    ToolResult {
        tool_call_id: String,
        output: ToolResultOutput,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
}

/// Output of a tool execution, attached to a `ToolResult` part or `ToolResultContent`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ToolResultOutput {
    Text { text: String },
    Error { error: String },
    Media { base64: String, media_type: String },
}

impl ToolResultOutput {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolResultOutput::Error { .. })
    }

    pub fn as_text(&self) -> String {
        match self {
            ToolResultOutput::Text { text } => text.clone(),
            ToolResultOutput::Error { error } => error.clone(),
            ToolResultOutput::Media { media_type, .. } => format!("<{media_type} content>"),
        }
    }
}

/// A piece of model-produced output, distinct from `MessagePart` because the model may
/// emit content kinds a caller cannot author (reasoning, sources, tool calls with
/// validation state).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Content {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    File {
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
        media_type: String,
    },
    Source(Source),
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: Value,
        #[serde(default)]
        provider_executed: bool,
        #[serde(default)]
        invalid: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validation_error: Option<String>,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output: ToolResultOutput,
        #[serde(default)]
        provider_executed: bool,
    },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Content::ToolCall {
            tool_call_id: id.into(),
            tool_name: name.into(),
            input,
            provider_executed: false,
            invalid: false,
            validation_error: None,
        }
    }

    pub fn as_tool_call(&self) -> Option<(&str, &str, &Value)> {
        match self {
            Content::ToolCall {
                tool_call_id,
                tool_name,
                input,
                ..
            } => Some((tool_call_id, tool_name, input)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source_type", rename_all = "kebab-case")]
pub enum Source {
    Url {
        id: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    Document {
        id: String,
        media_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
