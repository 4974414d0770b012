//! Streaming event pipeline (SPEC_FULL §4.5).
//!
//! `StreamPart` mirrors the teacher's `LanguageModelV3StreamPart` union
//! (`siumai-core/src/streaming/stream_part.rs`) trimmed to this crate's neutral
//! content model.

mod builder;
mod callbacks;

pub use builder::StepBuilder;
pub use callbacks::StreamCallbacks;

use crate::error::LlmError;
use crate::types::{CallWarning, Content, FinishReason, ProviderMetadata, Source, Usage};

#[derive(Debug)]
pub enum StreamPart {
    Warnings(Vec<CallWarning>),

    TextStart { id: String },
    TextDelta { id: String, delta: String },
    TextEnd { id: String },

    ReasoningStart { id: String, provider_metadata: Option<ProviderMetadata> },
    ReasoningDelta { id: String, delta: String, provider_metadata: Option<ProviderMetadata> },
    ReasoningEnd { id: String },

    ToolInputStart { id: String, tool_name: String },
    ToolInputDelta { id: String, delta: String },
    ToolInputEnd { id: String },

    /// Finalized, JSON-parseable tool call. Always preceded by a matching `ToolInputEnd`.
    ToolCall { id: String, tool_name: String, input: serde_json::Value },

    /// Emitted by the pipeline itself, after client-side tool execution completes.
    ToolResult { id: String, tool_name: String, content: Content },

    Source(Source),

    Finish { usage: Usage, finish_reason: FinishReason },

    /// Terminal: at most one `Error` part may appear in a stream, and nothing follows it.
    Error(LlmError),
}

impl Clone for StreamPart {
    // `LlmError` doesn't derive `Clone` (it wraps `reqwest::Error`); represent a
    // cloned terminal error generically, matching `builder::clone_error`.
    fn clone(&self) -> Self {
        match self {
            StreamPart::Warnings(w) => StreamPart::Warnings(w.clone()),
            StreamPart::TextStart { id } => StreamPart::TextStart { id: id.clone() },
            StreamPart::TextDelta { id, delta } => StreamPart::TextDelta {
                id: id.clone(),
                delta: delta.clone(),
            },
            StreamPart::TextEnd { id } => StreamPart::TextEnd { id: id.clone() },
            StreamPart::ReasoningStart { id, provider_metadata } => StreamPart::ReasoningStart {
                id: id.clone(),
                provider_metadata: provider_metadata.clone(),
            },
            StreamPart::ReasoningDelta { id, delta, provider_metadata } => StreamPart::ReasoningDelta {
                id: id.clone(),
                delta: delta.clone(),
                provider_metadata: provider_metadata.clone(),
            },
            StreamPart::ReasoningEnd { id } => StreamPart::ReasoningEnd { id: id.clone() },
            StreamPart::ToolInputStart { id, tool_name } => StreamPart::ToolInputStart {
                id: id.clone(),
                tool_name: tool_name.clone(),
            },
            StreamPart::ToolInputDelta { id, delta } => StreamPart::ToolInputDelta {
                id: id.clone(),
                delta: delta.clone(),
            },
            StreamPart::ToolInputEnd { id } => StreamPart::ToolInputEnd { id: id.clone() },
            StreamPart::ToolCall { id, tool_name, input } => StreamPart::ToolCall {
                id: id.clone(),
                tool_name: tool_name.clone(),
                input: input.clone(),
            },
            StreamPart::ToolResult { id, tool_name, content } => StreamPart::ToolResult {
                id: id.clone(),
                tool_name: tool_name.clone(),
                content: content.clone(),
            },
            StreamPart::Source(s) => StreamPart::Source(s.clone()),
            StreamPart::Finish { usage, finish_reason } => StreamPart::Finish {
                usage: *usage,
                finish_reason: *finish_reason,
            },
            StreamPart::Error(e) => StreamPart::Error(crate::error::LlmError::InvalidResponseData(e.to_string())),
        }
    }
}
