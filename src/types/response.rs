//! Model responses and the agent loop's accumulated results.

use super::content::{Content, ProviderMetadata};
use super::message::Message;
use super::usage::{CallWarning, FinishReason, Usage};

#[derive(Debug, Clone, Default)]
pub struct Response {
    pub id: Option<String>,
    pub content: Vec<Content>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub warnings: Vec<CallWarning>,
    pub provider_metadata: Option<ProviderMetadata>,
}

impl Default for FinishReason {
    fn default() -> Self {
        FinishReason::Unknown
    }
}

impl Response {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                Content::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_calls(&self) -> Vec<&Content> {
        self.content
            .iter()
            .filter(|c| matches!(c, Content::ToolCall { .. }))
            .collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.content.iter().any(|c| matches!(c, Content::ToolCall { .. }))
    }
}

/// A single turn of the agent loop: the model response plus the neutral messages
/// derived from it (assistant message, and a tool message if tools were called).
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    pub response: Response,
    pub messages: Vec<Message>,
}

impl StepResult {
    pub fn tool_calls(&self) -> Vec<&Content> {
        self.response.tool_calls()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.response.has_tool_calls()
    }

    pub fn tool_results(&self) -> Vec<&Content> {
        self.response
            .content
            .iter()
            .filter(|c| matches!(c, Content::ToolResult { .. }))
            .collect()
    }

    pub fn has_tool_results(&self) -> bool {
        !self.tool_results().is_empty()
    }
}

/// The final result of a completed (or cancelled-but-partial) agent call.
#[derive(Debug, Clone, Default)]
pub struct AgentResult {
    pub steps: Vec<StepResult>,
    /// Populated only when the caller supplied an output schema and the final
    /// step's text parsed successfully against it (see SPEC_FULL §10.5).
    pub output: Option<serde_json::Value>,
}

impl AgentResult {
    pub fn response(&self) -> Option<&Response> {
        self.steps.last().map(|s| &s.response)
    }

    pub fn text(&self) -> String {
        self.response().map(Response::text).unwrap_or_default()
    }

    pub fn total_usage(&self) -> Usage {
        self.steps
            .iter()
            .fold(Usage::default(), |acc, s| acc.merge(&s.response.usage))
    }

    pub fn all_warnings(&self) -> Vec<CallWarning> {
        self.steps
            .iter()
            .flat_map(|s| s.response.warnings.iter().cloned())
            .collect()
    }
}
