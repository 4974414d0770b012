//! Streaming agent orchestration (SPEC_FULL §4.5). Grounded on
//! `siumai/src/orchestrator/stream.rs`'s background-task/channel architecture,
//! generalized so every step streams (not just the first) and tool execution is
//! genuinely parallel (§4.3).

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};

use crate::cancel::CancelHandle;
use crate::error::{LlmError, Result};
use crate::model::{LanguageModel, PartStream};
use crate::streaming::{StepBuilder, StreamCallbacks, StreamPart};
use crate::types::{Call, FinishReason, Message, Prompt, Role, StepResult, ToolChoice};

use super::generate::{run_tool_calls, to_response_messages, RepairFn};
use super::prepare_step::{PrepareStepFn, PrepareStepInput};
use super::stop_condition::StopCondition;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::tools::ToolRegistry;

/// Channel queue depth for outbound stream parts. Large enough that sub-token
/// pacing isn't starved, small enough to bound memory on long streams (SPEC_FULL §9).
const STREAM_QUEUE_DEPTH: usize = 64;

pub struct StreamedAgentResult {
    pub steps: Vec<StepResult>,
}

pub struct StreamOrchestration {
    /// The ordered, id-scoped event sequence (SPEC_FULL §4.5 ordering invariants).
    pub events: PartStream,
    /// Resolves once the loop finishes, is cancelled, or errors terminally.
    pub result: oneshot::Receiver<Result<StreamedAgentResult>>,
    pub cancel: CancelHandle,
}

pub(crate) struct StreamRunOptions {
    pub max_steps: usize,
    pub tool_choice: ToolChoice,
    pub active_tools: Vec<String>,
    pub prepare_step: Option<PrepareStepFn>,
    pub repair: Option<RepairFn>,
    pub retry_policy: RetryPolicy,
    pub callbacks: StreamCallbacks,
}

pub(crate) fn run(
    model: Arc<dyn LanguageModel>,
    system: Option<String>,
    initial_messages: Prompt,
    tools: ToolRegistry,
    stop_conditions: Vec<Arc<dyn StopCondition>>,
    opts: StreamRunOptions,
) -> StreamOrchestration {
    let cancel = CancelHandle::new();
    let task_cancel = cancel.clone();
    let (tx, mut rx) = mpsc::channel::<StreamPart>(STREAM_QUEUE_DEPTH);
    let (result_tx, result_rx) = oneshot::channel();

    tokio::spawn(async move {
        let retry = RetryExecutor::new(opts.retry_policy.clone());
        let callbacks = opts.callbacks.clone();
        if let Some(cb) = &callbacks.on_agent_start {
            cb(());
        }

        let mut steps: Vec<StepResult> = Vec::new();
        let mut response_messages: Vec<Message> = Vec::new();
        let mut processed_call_ids: HashSet<String> = HashSet::new();
        let mut terminal_error: Option<LlmError> = None;

        'outer: for step_number in 0..opts.max_steps {
            if task_cancel.is_cancelled() {
                terminal_error = Some(LlmError::Cancelled);
                break;
            }
            if let Some(cb) = &callbacks.on_step_start {
                cb(step_number);
            }

            let mut step_messages = initial_messages.clone();
            step_messages.extend(response_messages.clone());

            let mut step_system = system.clone();
            let mut tool_choice = opts.tool_choice.clone();
            let mut active_tools = opts.active_tools.clone();
            let mut disable_all_tools = false;
            let mut step_model: Option<Arc<dyn LanguageModel>> = None;

            if let Some(prepare) = &opts.prepare_step {
                let input = PrepareStepInput {
                    step_number,
                    steps: &steps,
                    messages: &step_messages,
                    model: model.as_ref(),
                };
                let out = prepare(&input);
                if let Some(s) = out.system {
                    step_system = Some(s);
                }
                if let Some(m) = out.messages {
                    step_messages = m;
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

            let model_for_step = step_model.unwrap_or_else(|| model.clone());

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

            let step_cancel = task_cancel.child();
            let model_ref = model_for_step.clone();
            let stream_result = retry
                .execute(&task_cancel, None, || {
                    let call = call.clone();
                    let model_ref = model_ref.clone();
                    let step_cancel = step_cancel.clone();
                    async move { model_ref.stream(call, step_cancel).await }
                })
                .await;

            let mut part_stream = match stream_result {
                Ok(s) => s,
                Err(e) => {
                    callbacks.fire_error(&e);
                    let _ = tx.send(StreamPart::Error(clone_err(&e))).await;
                    terminal_error = Some(e);
                    break 'outer;
                }
            };

            let mut builder = StepBuilder::new();
            let mut aborted_cause: Option<&'static str> = None;

            while let Some(part) = part_stream.next().await {
                if task_cancel.is_cancelled() {
                    terminal_error = Some(LlmError::Cancelled);
                    aborted_cause = Some("Tool execution canceled by user");
                    break;
                }
                match part {
                    Ok(part) => {
                        if let Some(cb) = &callbacks.on_chunk {
                            cb(part.clone());
                        }
                        dispatch_callbacks(&callbacks, &part);
                        if let Err(msg) = builder.apply(&part) {
                            tracing::warn!(error = %msg, "stream ordering violation");
                        }
                        let is_error = matches!(part, StreamPart::Error(_));
                        let _ = tx.send(part).await;
                        if is_error {
                            break;
                        }
                    }
                    Err(e) => {
                        callbacks.fire_error(&e);
                        let _ = tx.send(StreamPart::Error(clone_err(&e))).await;
                        terminal_error = Some(e);
                        aborted_cause = Some("There was an error while executing the tool");
                        break;
                    }
                }
            }

            if aborted_cause.is_none() {
                if let Some(e) = builder.error() {
                    terminal_error = Some(clone_err(e));
                    aborted_cause = Some("There was an error while executing the tool");
                }
            }

            if let Some(cause) = aborted_cause {
                let response = builder.finish_aborted(cause);
                if !response.content.is_empty() {
                    let step_messages_out = to_response_messages(&response);
                    response_messages.extend(step_messages_out.clone());
                    let step = StepResult {
                        response,
                        messages: step_messages_out,
                    };
                    if let Some(cb) = &callbacks.on_step_finish {
                        cb(step.clone());
                    }
                    steps.push(step);
                }
                break 'outer;
            }

            let response = builder.finish();

            let outcome = run_tool_calls(&tools, response.content.clone(), opts.repair.as_ref(), &task_cancel).await;

            for (id, name, content) in &outcome.results {
                if !processed_call_ids.insert(id.clone()) {
                    continue;
                }
                let part = StreamPart::ToolResult {
                    id: id.clone(),
                    tool_name: name.clone(),
                    content: content.clone(),
                };
                if let Some(cb) = &callbacks.on_tool_result {
                    cb((id.clone(), name.clone(), content.clone()));
                }
                let _ = tx.send(part).await;
            }

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

            if let Some(cb) = &callbacks.on_step_finish {
                cb(step.clone());
            }

            steps.push(step);

            let should_stop = stop_conditions.iter().any(|c| c.should_stop(&steps))
                || finish_reason != FinishReason::ToolCalls
                || !has_tool_calls;

            if should_stop {
                break;
            }
        }

        // Cancellation and non-retryable errors are terminal (SPEC_FULL §7), but the
        // steps completed before the abort are still surfaced via on_finish so the
        // caller doesn't lose them just because the overall result is an error.
        if let Some(cb) = &callbacks.on_finish {
            cb(steps.clone());
        }

        let outcome = if let Some(err) = terminal_error {
            Err(err)
        } else {
            if let Some(cb) = &callbacks.on_agent_finish {
                cb(());
            }
            Ok(StreamedAgentResult { steps })
        };

        let _ = result_tx.send(outcome);
    });

    let events: PartStream = Box::pin(async_stream::stream! {
        while let Some(part) = rx.recv().await {
            yield Ok(part);
        }
    });

    StreamOrchestration {
        events,
        result: result_rx,
        cancel,
    }
}

fn dispatch_callbacks(callbacks: &StreamCallbacks, part: &StreamPart) {
    match part {
        StreamPart::Warnings(w) => {
            if let Some(cb) = &callbacks.on_warnings {
                cb(w.clone());
            }
        }
        StreamPart::TextStart { id } => {
            if let Some(cb) = &callbacks.on_text_start {
                cb(id.clone());
            }
        }
        StreamPart::TextDelta { id, delta } => {
            if let Some(cb) = &callbacks.on_text_delta {
                cb((id.clone(), delta.clone()));
            }
        }
        StreamPart::TextEnd { id } => {
            if let Some(cb) = &callbacks.on_text_end {
                cb(id.clone());
            }
        }
        StreamPart::ReasoningStart { id, .. } => {
            if let Some(cb) = &callbacks.on_reasoning_start {
                cb(id.clone());
            }
        }
        StreamPart::ReasoningDelta { id, delta, .. } => {
            if let Some(cb) = &callbacks.on_reasoning_delta {
                cb((id.clone(), delta.clone()));
            }
        }
        StreamPart::ReasoningEnd { id } => {
            if let Some(cb) = &callbacks.on_reasoning_end {
                cb(id.clone());
            }
        }
        StreamPart::ToolInputStart { id, tool_name } => {
            if let Some(cb) = &callbacks.on_tool_input_start {
                cb((id.clone(), tool_name.clone()));
            }
        }
        StreamPart::ToolInputDelta { id, delta } => {
            if let Some(cb) = &callbacks.on_tool_input_delta {
                cb((id.clone(), delta.clone()));
            }
        }
        StreamPart::ToolInputEnd { id } => {
            if let Some(cb) = &callbacks.on_tool_input_end {
                cb(id.clone());
            }
        }
        StreamPart::ToolCall { id, tool_name, input } => {
            if let Some(cb) = &callbacks.on_tool_call {
                cb((id.clone(), tool_name.clone(), input.clone()));
            }
        }
        StreamPart::ToolResult { .. } => {
            // Synthesized by this module after tool execution, not dispatched here.
        }
        StreamPart::Source(s) => {
            if let Some(cb) = &callbacks.on_source {
                cb(s.clone());
            }
        }
        StreamPart::Finish { usage, finish_reason } => {
            if let Some(cb) = &callbacks.on_stream_finish {
                cb((*usage, *finish_reason));
            }
        }
        StreamPart::Error(_) => {}
    }
}

fn clone_err(e: &LlmError) -> LlmError {
    LlmError::InvalidResponseData(e.to_string())
}
