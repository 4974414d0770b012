//! Parallel tool execution (SPEC_FULL §4.3).
//!
//! The teacher's `orchestrator::generate`/`stream` run tool calls sequentially in a
//! `for` loop; the spec requires genuine concurrency with a join barrier and
//! positional ordering. We spawn one task per call and write into a pre-sized slot
//! indexed by the call's ordinal, so the final vector matches call order regardless
//! of completion order.

use futures::future::join_all;

use crate::cancel::CancelHandle;
use crate::error::LlmError;
use crate::types::content::ToolResultOutput;

use super::{ToolCall, ToolRegistry};

/// One tool call's result, positioned to match its originating call.
pub struct ExecutedTool {
    pub tool_call_id: String,
    pub tool_name: String,
    pub output: ToolResultOutput,
    /// Set when the tool declined to run via `LlmError::PermissionDenied`
    /// (SPEC_FULL §6/§7): the step's finish reason should become `PermissionDenied`.
    pub permission_denied: bool,
}

/// Run every call concurrently under a shared cancellation scope, returning results
/// in the same order as `calls`. A cancelled scope yields `ToolResultOutput::Error`
/// for every call that had not yet finished (SPEC_FULL §7, unfinished-tool-call cleanup).
pub async fn execute_all(registry: &ToolRegistry, calls: Vec<ToolCall>, cancel: &CancelHandle) -> Vec<ExecutedTool> {
    let futures = calls.into_iter().map(|call| {
        let cancel = cancel.child();
        async move {
            let tool_name = call.name.clone();
            let tool_call_id = call.id.clone();

            if cancel.is_cancelled() {
                return ExecutedTool {
                    tool_call_id,
                    tool_name,
                    output: ToolResultOutput::Error {
                        error: "Tool execution canceled by user".to_string(),
                    },
                    permission_denied: false,
                };
            }

            let Some(handler) = registry.get(&call.name).cloned() else {
                return ExecutedTool {
                    tool_call_id,
                    tool_name,
                    output: ToolResultOutput::Error {
                        error: format!("Tool not found: {}", call.name),
                    },
                    permission_denied: false,
                };
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = handler.run(&call) => Some(result),
            };

            let (output, permission_denied) = match outcome {
                None => (
                    ToolResultOutput::Error {
                        error: "Tool execution canceled by user".to_string(),
                    },
                    false,
                ),
                Some(Ok(outcome)) if outcome.is_error => (ToolResultOutput::Error { error: outcome.content }, false),
                Some(Ok(outcome)) => (ToolResultOutput::Text { text: outcome.content }, false),
                Some(Err(LlmError::PermissionDenied(message))) => {
                    (ToolResultOutput::Error { error: message }, true)
                }
                Some(Err(e)) => (
                    ToolResultOutput::Error {
                        error: format!("There was an error while executing the tool: {e}"),
                    },
                    false,
                ),
            };

            ExecutedTool {
                tool_call_id,
                tool_name,
                output,
                permission_denied,
            }
        }
    });

    join_all(futures).await
}
