//! `Agent`: the builder and public surface over the step loop (SPEC_FULL §4.1).
//! Grounded on `siumai/src/orchestrator/agent.rs`'s `ToolLoopAgent`.

use std::sync::Arc;

use crate::cancel::CancelHandle;
use crate::error::{LlmError, Result};
use crate::model::LanguageModel;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::tools::ToolRegistry;
use crate::types::{AgentResult, Message, Prompt, Role, StepResult, ToolChoice};

use super::generate::{generate, GenerateOptions, RepairFn};
use super::prepare_step::PrepareStepFn;
use super::stop_condition::{step_count_is, StopCondition};
use super::stream::{self, StreamOrchestration, StreamRunOptions};
use crate::streaming::StreamCallbacks;

const DEFAULT_MAX_STEPS: usize = 8;

pub struct Agent {
    model: Arc<dyn LanguageModel>,
    tools: ToolRegistry,
    stop_conditions: Vec<Arc<dyn StopCondition>>,
    system: Option<String>,
    max_steps: usize,
    tool_choice: ToolChoice,
    active_tools: Vec<String>,
    prepare_step: Option<PrepareStepFn>,
    repair: Option<RepairFn>,
    retry_policy: RetryPolicy,
    on_step_finish: Option<Arc<dyn Fn(&StepResult) + Send + Sync>>,
    on_finish: Option<Arc<dyn Fn(&[StepResult]) + Send + Sync>>,
    output_schema: Option<serde_json::Value>,
}

impl Agent {
    pub fn new(model: Arc<dyn LanguageModel>, tools: ToolRegistry) -> Self {
        Self {
            model,
            tools,
            stop_conditions: vec![Arc::new(step_count_is(DEFAULT_MAX_STEPS))],
            system: None,
            max_steps: DEFAULT_MAX_STEPS,
            tool_choice: ToolChoice::Auto,
            active_tools: Vec::new(),
            prepare_step: None,
            repair: None,
            retry_policy: RetryPolicy::default(),
            on_step_finish: None,
            on_finish: None,
            output_schema: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_stop_condition(mut self, condition: impl StopCondition + 'static) -> Self {
        self.stop_conditions.push(Arc::new(condition));
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }

    pub fn with_active_tools(mut self, names: Vec<String>) -> Self {
        self.active_tools = names;
        self
    }

    pub fn with_prepare_step(mut self, f: PrepareStepFn) -> Self {
        self.prepare_step = Some(f);
        self
    }

    pub fn with_repair(mut self, f: RepairFn) -> Self {
        self.repair = Some(f);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn on_step_finish(mut self, f: impl Fn(&StepResult) + Send + Sync + 'static) -> Self {
        self.on_step_finish = Some(Arc::new(f));
        self
    }

    pub fn on_finish(mut self, f: impl Fn(&[StepResult]) + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Arc::new(f));
        self
    }

    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn build_initial_messages(&self, user_prompt: &str, extra: Prompt) -> Result<Vec<Message>> {
        if user_prompt.trim().is_empty() && extra.is_empty() {
            return Err(LlmError::InvalidPrompt("prompt must not be empty".into()));
        }
        let mut messages = Vec::new();
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }
        if !user_prompt.is_empty() {
            messages.push(Message::user(user_prompt));
        }
        messages.extend(extra.into_iter().filter(|m| m.role != Role::System));
        Ok(messages)
    }

    /// Runs the full non-streaming agent loop for one user prompt plus any prior
    /// conversation messages, returning the accumulated result.
    pub async fn generate(&self, user_prompt: &str, history: Prompt) -> Result<AgentResult> {
        self.generate_with_cancel(user_prompt, history, &CancelHandle::new()).await
    }

    pub async fn generate_with_cancel(
        &self,
        user_prompt: &str,
        history: Prompt,
        cancel: &CancelHandle,
    ) -> Result<AgentResult> {
        let initial_messages = self.build_initial_messages(user_prompt, history)?;

        let opts = GenerateOptions {
            max_steps: self.max_steps,
            tool_choice: self.tool_choice.clone(),
            active_tools: self.active_tools.clone(),
            prepare_step: self.prepare_step.clone(),
            repair: self.repair.clone(),
            retry: RetryExecutor::new(self.retry_policy.clone()),
            on_step_finish: self.on_step_finish.clone(),
        };

        let outcome = generate(
            self.model.as_ref(),
            self.system.as_deref(),
            initial_messages,
            &self.tools,
            &self.stop_conditions,
            &opts,
            cancel,
        )
        .await;

        if let Some(cb) = &self.on_finish {
            cb(&outcome.steps);
        }

        // Cancellation and non-retryable API errors are terminal (SPEC_FULL §7), but
        // the steps completed before the abort were already surfaced via on_finish
        // above; still return the error so the caller doesn't mistake this for success.
        if let Some(err) = outcome.error {
            return Err(err);
        }

        let output = self
            .output_schema
            .as_ref()
            .and_then(|_| outcome.steps.last())
            .and_then(|step| extract_json_output(&step.response.text()));

        Ok(AgentResult { steps: outcome.steps, output })
    }

    /// Runs the agent loop as a streaming pipeline (SPEC_FULL §4.5). Every step's
    /// provider stream is forwarded through `events`; `result` resolves once the
    /// loop finishes, is cancelled, or errors terminally.
    pub fn stream(&self, user_prompt: &str, history: Prompt, callbacks: StreamCallbacks) -> Result<StreamOrchestration> {
        let initial_messages = self.build_initial_messages(user_prompt, history)?;

        let opts = StreamRunOptions {
            max_steps: self.max_steps,
            tool_choice: self.tool_choice.clone(),
            active_tools: self.active_tools.clone(),
            prepare_step: self.prepare_step.clone(),
            repair: self.repair.clone(),
            retry_policy: self.retry_policy.clone(),
            callbacks,
        };

        Ok(stream::run(
            self.model.clone(),
            self.system.clone(),
            initial_messages,
            self.tools.clone(),
            self.stop_conditions.clone(),
            opts,
        ))
    }
}

/// Extracts a JSON value from the final response text, either because the whole
/// text is JSON or because it contains a fenced ```json block. Best-effort, never
/// required by the loop (SPEC_FULL §10.5).
fn extract_json_output(text: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.trim()) {
        return Some(value);
    }
    let start = text.find("```json")?;
    let rest = &text[start + "```json".len()..];
    let end = rest.find("```")?;
    serde_json::from_str(rest[..end].trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_json() {
        assert_eq!(
            extract_json_output(r#"{"answer": 42}"#),
            Some(serde_json::json!({"answer": 42}))
        );
    }

    #[test]
    fn extracts_fenced_json() {
        let text = "Here you go:\n```json\n{\"answer\": 42}\n```\nThanks.";
        assert_eq!(extract_json_output(text), Some(serde_json::json!({"answer": 42})));
    }

    #[test]
    fn returns_none_for_plain_text() {
        assert_eq!(extract_json_output("just some prose"), None);
    }
}
