//! The non-streaming step loop (SPEC_FULL §4.1). Grounded on
//! `siumai/src/orchestrator/generate.rs`, adapted for parallel tool execution
//! (§4.3) and this crate's neutral content model.

use std::sync::Arc;

use tracing::info_span;
use tracing::Instrument;

use crate::cancel::CancelHandle;
use crate::error::LlmError;
use crate::model::LanguageModel;
use crate::retry::RetryExecutor;
use crate::tools::exec::execute_all;
use crate::tools::{ToolCall, ToolRegistry, Validated};
use crate::types::content::ToolResultOutput;
use crate::types::{Call, Content, FinishReason, Message, MessagePart, Role, StepResult, Tool, ToolChoice};

use super::prepare_step::{PrepareStepFn, PrepareStepInput};
use super::stop_condition::StopCondition;

pub struct RepairContext<'a> {
    pub tool_call: &'a ToolCall,
    pub validation_error: &'a str,
    pub available_tools: &'a [Tool],
}

pub type RepairFn = Arc<dyn Fn(&RepairContext) -> Option<ToolCall> + Send + Sync>;

pub struct GenerateOptions {
    pub max_steps: usize,
    pub tool_choice: ToolChoice,
    pub active_tools: Vec<String>,
    pub prepare_step: Option<PrepareStepFn>,
    pub repair: Option<RepairFn>,
    pub retry: RetryExecutor,
    pub on_step_finish: Option<Arc<dyn Fn(&StepResult) + Send + Sync>>,
}

/// Outcome of the step loop: steps completed so far, plus a terminal error if the
/// loop aborted before a stop condition was reached naturally. SPEC_FULL §7:
/// cancellation and non-retryable API errors are terminal but still finalize a
/// partial result — callers surface `steps` alongside `error` rather than losing them.
pub struct GenerateOutcome {
    pub steps: Vec<StepResult>,
    pub error: Option<LlmError>,
}

/// Runs the full step loop. `system` and `initial_messages` together form the
/// prompt prefix that precedes every step's accumulated response messages.
pub async fn generate(
    model: &dyn LanguageModel,
    system: Option<&str>,
    initial_messages: Vec<Message>,
    tools: &ToolRegistry,
    stop_conditions: &[Arc<dyn StopCondition>],
    opts: &GenerateOptions,
    cancel: &CancelHandle,
) -> GenerateOutcome {
    if initial_messages.is_empty() {
        return GenerateOutcome {
            steps: Vec::new(),
            error: Some(LlmError::InvalidPrompt("prompt must contain at least one message".into())),
        };
    }

    let mut steps: Vec<StepResult> = Vec::new();
    let mut response_messages: Vec<Message> = Vec::new();
    let mut terminal_error: Option<LlmError> = None;

    for step_number in 0..opts.max_steps {
        if cancel.is_cancelled() {
            terminal_error = Some(LlmError::Cancelled);
            break;
        }

        let mut step_messages = initial_messages.clone();
        step_messages.extend(response_messages.clone());

        let mut step_system = system.map(str::to_string);
        let mut tool_choice = opts.tool_choice.clone();
        let mut active_tools = opts.active_tools.clone();
        let mut disable_all_tools = false;
        let mut step_model: Option<Arc<dyn LanguageModel>> = None;

        if let Some(prepare) = &opts.prepare_step {
            let input = PrepareStepInput {
                step_number,
                steps: &steps,
                messages: &step_messages,
                model,
            };
            let out = prepare(&input);
            if let Some(system_override) = out.system {
                step_system = Some(system_override);
            }
            if let Some(messages_override) = out.messages {
                step_messages = messages_override;
            }
            if let Some(tc) = out.tool_choice {
                tool_choice = tc;
            }
            if let Some(at) = out.active_tools {
                active_tools = at;
            }
            disable_all_tools = out.disable_all_tools;
            step_model = out.model;
        }

        let model_for_step: &dyn LanguageModel = step_model.as_deref().unwrap_or(model);

        if let Some(sys) = &step_system {
            step_messages.retain(|m| m.role != Role::System);
            step_messages.insert(0, Message::system(sys.clone()));
        }

        let call_tools = if disable_all_tools {
            Vec::new()
        } else {
            tools.active_descriptors(&active_tools)
        };

        let call = Call {
            prompt: step_messages,
            tools: call_tools,
            tool_choice,
            ..Default::default()
        };

        let response = match opts
            .retry
            .execute(cancel, None, || {
                let call = call.clone();
                async { model_for_step.generate(call).await }
            })
            .instrument(info_span!("agent.step", step = step_number))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                terminal_error = Some(e);
                break;
            }
        };

        let outcome = run_tool_calls(
            tools,
            response.content.clone(),
            opts.repair.as_ref(),
            cancel,
        )
        .instrument(info_span!("agent.tools", step = step_number))
        .await;

        let mut final_response = response;
        final_response.content = outcome.content;
        if outcome.permission_denied {
            final_response.finish_reason = FinishReason::PermissionDenied;
        }

        let step_messages_out = to_response_messages(&final_response);
        response_messages.extend(step_messages_out.clone());

        let has_tool_calls = final_response.has_tool_calls();
        let finish_reason = final_response.finish_reason;

        let step = StepResult {
            response: final_response,
            messages: step_messages_out,
        };

        if let Some(cb) = &opts.on_step_finish {
            cb(&step);
        }

        steps.push(step);

        let should_stop = stop_conditions.iter().any(|c| c.should_stop(&steps))
            || finish_reason != FinishReason::ToolCalls
            || !has_tool_calls;

        if should_stop {
            break;
        }
    }

    GenerateOutcome { steps, error: terminal_error }
}

/// Output of validating, repairing, and executing one step's tool calls.
pub(crate) struct ToolStepOutcome {
    /// The step's original content with invalid tool calls marked and tool-result
    /// entries appended, in the order the originating calls appeared.
    pub content: Vec<Content>,
    /// Executed results in call order, for streaming callback emission.
    pub results: Vec<(String, String, Content)>,
    /// True if any executed tool declined via a permission-denied error.
    pub permission_denied: bool,
}

/// Shared by the generate loop and the streaming loop: extracts tool calls from
/// `content`, validates and (optionally) repairs each one, executes the valid
/// calls in parallel (SPEC_FULL §4.3), and reassembles everything preserving the
/// original call order.
pub(crate) async fn run_tool_calls(
    tools: &ToolRegistry,
    content: Vec<Content>,
    repair: Option<&RepairFn>,
    cancel: &CancelHandle,
) -> ToolStepOutcome {
    let raw_tool_calls: Vec<ToolCall> = content
        .iter()
        .filter_map(|c| match c {
            Content::ToolCall { tool_call_id, tool_name, input, .. } => Some(ToolCall {
                id: tool_call_id.clone(),
                name: tool_name.clone(),
                input: input.clone(),
            }),
            _ => None,
        })
        .collect();
    let order: Vec<String> = raw_tool_calls.iter().map(|c| c.id.clone()).collect();

    let mut validated: Vec<ToolCall> = Vec::new();
    let mut repaired_calls: Vec<ToolCall> = Vec::new();
    let mut invalid: Vec<(ToolCall, String)> = Vec::new();

    for raw in raw_tool_calls {
        match crate::tools::validate_tool_call(tools, raw) {
            Validated::Ok(call) => validated.push(call),
            Validated::Invalid { call, error } => {
                let repaired = repair.and_then(|repair| {
                    let ctx = RepairContext {
                        tool_call: &call,
                        validation_error: &error,
                        available_tools: &tools.descriptors(),
                    };
                    repair(&ctx)
                });
                match repaired {
                    Some(fixed) => match crate::tools::validate_tool_call(tools, fixed) {
                        Validated::Ok(call) => {
                            repaired_calls.push(call.clone());
                            validated.push(call);
                        }
                        Validated::Invalid { call, error } => invalid.push((call, error)),
                    },
                    None => invalid.push((call, error)),
                }
            }
        }
    }

    let executed = execute_all(tools, validated, &cancel.child()).await;

    let mut step_content = content;
    let mut results_by_id: std::collections::HashMap<String, Content> = std::collections::HashMap::new();

    for (call, error) in &invalid {
        results_by_id.insert(
            call.id.clone(),
            Content::ToolResult {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                output: ToolResultOutput::Error { error: error.clone() },
                provider_executed: false,
            },
        );
        if let Some(pos) = step_content
            .iter()
            .position(|c| matches!(c, Content::ToolCall { tool_call_id, .. } if tool_call_id == &call.id))
        {
            step_content[pos] = Content::ToolCall {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                input: call.input.clone(),
                provider_executed: false,
                invalid: true,
                validation_error: Some(error.clone()),
            };
        }
    }

    for call in &repaired_calls {
        if let Some(pos) = step_content
            .iter()
            .position(|c| matches!(c, Content::ToolCall { tool_call_id, .. } if tool_call_id == &call.id))
        {
            step_content[pos] = Content::ToolCall {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                input: call.input.clone(),
                provider_executed: false,
                invalid: false,
                validation_error: None,
            };
        }
    }

    let permission_denied = executed.iter().any(|e| e.permission_denied);

    for executed_tool in executed {
        results_by_id.insert(
            executed_tool.tool_call_id.clone(),
            Content::ToolResult {
                tool_call_id: executed_tool.tool_call_id,
                tool_name: executed_tool.tool_name,
                output: executed_tool.output,
                provider_executed: false,
            },
        );
    }

    let results: Vec<(String, String, Content)> = order
        .iter()
        .filter_map(|id| {
            let result = results_by_id.remove(id)?;
            let name = match &result {
                Content::ToolResult { tool_name, .. } => tool_name.clone(),
                _ => String::new(),
            };
            Some((id.clone(), name, result))
        })
        .collect();

    step_content.extend(results.iter().map(|(_, _, c)| c.clone()));

    ToolStepOutcome {
        content: step_content,
        results,
        permission_denied,
    }
}

/// Splits one step's content into an assistant message (all non-tool-result parts,
/// in original order) and a tool message (tool-result parts only), per SPEC_FULL §9's
/// resolved Open Question.
pub fn to_response_messages(response: &crate::types::Response) -> Vec<Message> {
    let mut assistant_parts = Vec::new();
    let mut tool_parts = Vec::new();

    for content in &response.content {
        match content {
            Content::Text { text } => assistant_parts.push(MessagePart::Text { text: text.clone() }),
            Content::Reasoning { text, provider_metadata } => assistant_parts.push(MessagePart::Reasoning {
                text: text.clone(),
                provider_metadata: provider_metadata.clone(),
            }),
            Content::File { bytes, media_type } => assistant_parts.push(MessagePart::File {
                filename: None,
                bytes: bytes.clone(),
                media_type: media_type.clone(),
                provider_metadata: None,
            }),
            Content::ToolCall {
                tool_call_id,
                tool_name,
                input,
                provider_executed,
                ..
            } => assistant_parts.push(MessagePart::ToolCall {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
                input: input.clone(),
                provider_executed: *provider_executed,
            }),
            Content::ToolResult {
                tool_call_id, output, ..
            } => tool_parts.push(MessagePart::ToolResult {
                tool_call_id: tool_call_id.clone(),
                output: output.clone(),
                provider_metadata: None,
            }),
            Content::Source(_) => {}
        }
    }

    let mut messages = Vec::new();
    if !assistant_parts.is_empty() {
        messages.push(Message::assistant(assistant_parts));
    }
    if !tool_parts.is_empty() {
        messages.push(Message::tool(tool_parts));
    }
    messages
}
