//! The `Call` a caller sends into a `LanguageModel`.

use std::collections::HashMap;

use serde_json::Value;

use super::message::Prompt;
use super::tool::{Tool, ToolChoice};

/// Provider-namespaced option bag, e.g. `{"anthropic": {"thinking": {...}}}`.
pub type ProviderOptions = HashMap<String, Value>;

#[derive(Debug, Clone, Default)]
pub struct Call {
    pub prompt: Prompt,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub tools: Vec<Tool>,
    pub tool_choice: ToolChoice,
    pub headers: HashMap<String, String>,
    pub provider_options: ProviderOptions,
}

impl Call {
    pub fn new(prompt: Prompt) -> Self {
        Self {
            prompt,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }

    pub fn with_max_output_tokens(mut self, n: u32) -> Self {
        self.max_output_tokens = Some(n);
        self
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }
}
