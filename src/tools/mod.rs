//! Tool subsystem: the `ToolHandler` trait, a name-indexed registry, and the
//! validation/repair machinery from SPEC_FULL §4.2.

pub mod exec;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{LlmError, Result};
use crate::types::{Tool, ToolFunction};

/// A single tool call as extracted from a model response, ready to execute.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// The outcome of running one tool.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Client-executed tool. Implementations must be `Send + Sync` since a registry
/// may be shared across concurrent sessions (SPEC_FULL §5).
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn descriptor(&self) -> Tool;

    async fn run(&self, call: &ToolCall) -> Result<ToolOutcome>;
}

/// Name-indexed set of tools, built once per agent and shared across calls.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: HashMap<String, std::sync::Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: std::sync::Arc<dyn ToolHandler>) -> Self {
        self.handlers.insert(handler.descriptor().name().to_string(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<&std::sync::Arc<dyn ToolHandler>> {
        self.handlers.get(name)
    }

    pub fn descriptors(&self) -> Vec<Tool> {
        self.handlers.values().map(|h| h.descriptor()).collect()
    }

    /// Descriptors filtered to an active-tools whitelist. An empty whitelist means "all".
    pub fn active_descriptors(&self, active: &[String]) -> Vec<Tool> {
        if active.is_empty() {
            return self.descriptors();
        }
        self.handlers
            .values()
            .map(|h| h.descriptor())
            .filter(|t| active.iter().any(|name| name == t.name()))
            .collect()
    }
}

/// The outcome of validating one raw tool call against its registered schema.
pub enum Validated {
    Ok(ToolCall),
    Invalid { call: ToolCall, error: String },
}

/// SPEC_FULL §4.2: shallow required-field validation, deliberately not full JSON-Schema.
pub fn validate_tool_call(registry: &ToolRegistry, raw: ToolCall) -> Validated {
    let Some(handler) = registry.get(&raw.name) else {
        let error = format!("tool not found: {}", raw.name);
        return Validated::Invalid { call: raw, error };
    };
    let descriptor = handler.descriptor();

    if !raw.input.is_object() {
        return Validated::Invalid {
            error: format!("tool input for `{}` is not a JSON object", raw.name),
            call: raw,
        };
    }

    for field in descriptor.required_fields() {
        if raw.input.get(&field).is_none() {
            return Validated::Invalid {
                error: format!("missing required field `{field}` for tool `{}`", raw.name),
                call: raw,
            };
        }
    }

    Validated::Ok(raw)
}

/// Wraps descriptor lookup errors uniformly for callers that want a hard error
/// instead of an inline invalid-call marker (used outside the agent loop, e.g.
/// by a caller dispatching a tool call manually).
pub fn require_descriptor(registry: &ToolRegistry, name: &str) -> Result<ToolFunction> {
    match registry.get(name).map(|h| h.descriptor()) {
        Some(Tool::Function(f)) => Ok(f),
        Some(Tool::ProviderDefined { .. }) => Err(LlmError::UnsupportedFunctionality(format!(
            "`{name}` is provider-defined and cannot be dispatched client-side"
        ))),
        None => Err(LlmError::ToolNotFound(name.to_string())),
    }
}
