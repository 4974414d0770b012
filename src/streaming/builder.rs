//! Accumulates `StreamPart`s into a finished `Response` for one step.
//!
//! Single-writer by construction (SPEC_FULL §9: "the agent exclusively owns the
//! step builder during a call"); never shared across tasks.

use std::collections::HashMap;

use crate::types::{CallWarning, Content, FinishReason, Response, Source, ToolResultOutput, Usage};

use super::StreamPart;

#[derive(Default)]
struct OpenRun {
    kind: RunKind,
    text: String,
}

#[derive(PartialEq)]
enum RunKind {
    Text,
    Reasoning,
    ToolInput { tool_name: String },
}

impl Default for RunKind {
    fn default() -> Self {
        RunKind::Text
    }
}

#[derive(Default)]
pub struct StepBuilder {
    open_runs: HashMap<String, OpenRun>,
    content: Vec<Content>,
    warnings: Vec<CallWarning>,
    usage: Usage,
    finish_reason: FinishReason,
    error: Option<crate::error::LlmError>,
}

impl StepBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one stream part, updating accumulated state. Returns `Err` if the part
    /// violates an ordering invariant (delta/end with no matching start, etc.) — callers
    /// should treat this as a protocol error from the provider adapter.
    pub fn apply(&mut self, part: &StreamPart) -> Result<(), String> {
        match part {
            StreamPart::Warnings(w) => self.warnings.extend(w.iter().cloned()),

            StreamPart::TextStart { id } => self.open(id, RunKind::Text)?,
            StreamPart::TextDelta { id, delta } => self.delta(id, delta)?,
            StreamPart::TextEnd { id } => self.close_text(id)?,

            StreamPart::ReasoningStart { id, .. } => self.open(id, RunKind::Reasoning)?,
            StreamPart::ReasoningDelta { id, delta, .. } => self.delta(id, delta)?,
            StreamPart::ReasoningEnd { id } => self.close_reasoning(id)?,

            StreamPart::ToolInputStart { id, tool_name } => self.open(
                id,
                RunKind::ToolInput {
                    tool_name: tool_name.clone(),
                },
            )?,
            StreamPart::ToolInputDelta { id, delta } => self.delta(id, delta)?,
            StreamPart::ToolInputEnd { id } => {
                self.open_runs
                    .remove(id)
                    .ok_or_else(|| format!("tool-input-end with no matching start: {id}"))?;
            }

            StreamPart::ToolCall { id, tool_name, input } => {
                self.content.push(Content::ToolCall {
                    tool_call_id: id.clone(),
                    tool_name: tool_name.clone(),
                    input: input.clone(),
                    provider_executed: false,
                    invalid: false,
                    validation_error: None,
                });
            }

            StreamPart::ToolResult { content, .. } => self.content.push(content.clone()),

            StreamPart::Source(s) => self.content.push(Content::Source(s.clone())),

            StreamPart::Finish { usage, finish_reason } => {
                self.usage = *usage;
                self.finish_reason = *finish_reason;
            }

            StreamPart::Error(e) => {
                self.error = Some(clone_error(e));
            }
        }
        Ok(())
    }

    fn open(&mut self, id: &str, kind: RunKind) -> Result<(), String> {
        if self.open_runs.contains_key(id) {
            return Err(format!("duplicate start for id {id}"));
        }
        self.open_runs.insert(id.to_string(), OpenRun { kind, text: String::new() });
        Ok(())
    }

    fn delta(&mut self, id: &str, delta: &str) -> Result<(), String> {
        let run = self
            .open_runs
            .get_mut(id)
            .ok_or_else(|| format!("delta with no matching start: {id}"))?;
        run.text.push_str(delta);
        Ok(())
    }

    fn close_text(&mut self, id: &str) -> Result<(), String> {
        let run = self
            .open_runs
            .remove(id)
            .ok_or_else(|| format!("text-end with no matching start: {id}"))?;
        if run.kind != RunKind::Text {
            return Err(format!("text-end for non-text run: {id}"));
        }
        self.content.push(Content::Text { text: run.text });
        Ok(())
    }

    fn close_reasoning(&mut self, id: &str) -> Result<(), String> {
        let run = self
            .open_runs
            .remove(id)
            .ok_or_else(|| format!("reasoning-end with no matching start: {id}"))?;
        if run.kind != RunKind::Reasoning {
            return Err(format!("reasoning-end for non-reasoning run: {id}"));
        }
        self.content.push(Content::Reasoning {
            text: run.text,
            provider_metadata: None,
        });
        Ok(())
    }

    pub fn error(&self) -> Option<&crate::error::LlmError> {
        self.error.as_ref()
    }

    pub fn finish(self) -> Response {
        Response {
            id: None,
            content: self.content,
            finish_reason: self.finish_reason,
            usage: self.usage,
            warnings: self.warnings,
            provider_metadata: None,
        }
    }

    /// Finalizes the step when the stream aborted before normal completion
    /// (cancellation or a terminal error). Any still-open run is closed using its
    /// accumulated partial text; any open tool-call input is finalized to `{}`,
    /// and any tool call left without a matching tool-result is synthesized one
    /// carrying `cause` as the error text (SPEC_FULL §7 "unfinished tool-call cleanup").
    pub fn finish_aborted(mut self, cause: &str) -> Response {
        let open: Vec<(String, OpenRun)> = self.open_runs.drain().collect();
        for (id, run) in open {
            match run.kind {
                RunKind::Text => self.content.push(Content::Text { text: run.text }),
                RunKind::Reasoning => self.content.push(Content::Reasoning {
                    text: run.text,
                    provider_metadata: None,
                }),
                RunKind::ToolInput { tool_name } => {
                    self.content.push(Content::ToolCall {
                        tool_call_id: id.clone(),
                        tool_name: tool_name.clone(),
                        input: serde_json::json!({}),
                        provider_executed: false,
                        invalid: false,
                        validation_error: None,
                    });
                    self.content.push(Content::ToolResult {
                        tool_call_id: id,
                        tool_name,
                        output: ToolResultOutput::Error { error: cause.to_string() },
                        provider_executed: false,
                    });
                }
            }
        }

        let missing: Vec<(String, String)> = self
            .content
            .iter()
            .filter_map(|c| match c {
                Content::ToolCall { tool_call_id, tool_name, .. } => {
                    let has_result = self.content.iter().any(|other| {
                        matches!(other, Content::ToolResult { tool_call_id: id, .. } if id == tool_call_id)
                    });
                    if has_result {
                        None
                    } else {
                        Some((tool_call_id.clone(), tool_name.clone()))
                    }
                }
                _ => None,
            })
            .collect();

        for (id, name) in missing {
            self.content.push(Content::ToolResult {
                tool_call_id: id,
                tool_name: name,
                output: ToolResultOutput::Error { error: cause.to_string() },
                provider_executed: false,
            });
        }

        Response {
            id: None,
            content: self.content,
            finish_reason: FinishReason::Cancelled,
            usage: self.usage,
            warnings: self.warnings,
            provider_metadata: None,
        }
    }
}

impl PartialEq for RunKind {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (RunKind::Text, RunKind::Text) | (RunKind::Reasoning, RunKind::Reasoning)
        ) || matches!((self, other), (RunKind::ToolInput { .. }, RunKind::ToolInput { .. }))
    }
}

fn clone_error(e: &crate::error::LlmError) -> crate::error::LlmError {
    // LlmError doesn't derive Clone (it wraps reqwest::Error); represent a
    // terminal stream error generically for accumulation purposes.
    crate::error::LlmError::InvalidResponseData(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_run_accumulates_in_order() {
        let mut b = StepBuilder::new();
        b.apply(&StreamPart::TextStart { id: "1".into() }).unwrap();
        b.apply(&StreamPart::TextDelta { id: "1".into(), delta: "Hi".into() }).unwrap();
        b.apply(&StreamPart::TextDelta { id: "1".into(), delta: " there".into() }).unwrap();
        b.apply(&StreamPart::TextEnd { id: "1".into() }).unwrap();
        let response = b.finish();
        assert_eq!(response.text(), "Hi there");
    }

    #[test]
    fn finish_aborted_finalizes_open_tool_input_and_synthesizes_error_result() {
        let mut b = StepBuilder::new();
        b.apply(&StreamPart::ToolInputStart { id: "call1".into(), tool_name: "search".into() })
            .unwrap();
        b.apply(&StreamPart::ToolInputDelta { id: "call1".into(), delta: "{\"q\":".into() })
            .unwrap();
        let response = b.finish_aborted("Tool execution canceled by user");

        let tool_call = response
            .content
            .iter()
            .find(|c| matches!(c, Content::ToolCall { .. }))
            .unwrap();
        match tool_call {
            Content::ToolCall { input, invalid, .. } => {
                assert_eq!(*input, serde_json::json!({}));
                assert!(!invalid);
            }
            _ => unreachable!(),
        }

        let tool_result = response
            .content
            .iter()
            .find(|c| matches!(c, Content::ToolResult { .. }))
            .unwrap();
        match tool_result {
            Content::ToolResult { output, .. } => {
                assert_eq!(output.as_text(), "Tool execution canceled by user");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn finish_aborted_synthesizes_result_for_completed_tool_call_missing_one() {
        let mut b = StepBuilder::new();
        b.apply(&StreamPart::ToolCall {
            id: "call1".into(),
            tool_name: "search".into(),
            input: serde_json::json!({"q": "rust"}),
        })
        .unwrap();
        let response = b.finish_aborted("There was an error while executing the tool");
        let results: Vec<_> = response
            .content
            .iter()
            .filter(|c| matches!(c, Content::ToolResult { .. }))
            .collect();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn delta_without_start_is_rejected() {
        let mut b = StepBuilder::new();
        assert!(b.apply(&StreamPart::TextDelta { id: "1".into(), delta: "x".into() }).is_err());
    }

    #[test]
    fn reasoning_and_text_are_kept_separate() {
        let mut b = StepBuilder::new();
        b.apply(&StreamPart::ReasoningStart { id: "r".into(), provider_metadata: None }).unwrap();
        b.apply(&StreamPart::ReasoningDelta {
            id: "r".into(),
            delta: "I will open with banter.".into(),
            provider_metadata: None,
        })
        .unwrap();
        b.apply(&StreamPart::ReasoningEnd { id: "r".into() }).unwrap();
        b.apply(&StreamPart::TextStart { id: "t".into() }).unwrap();
        b.apply(&StreamPart::TextDelta { id: "t".into(), delta: "Hi there!".into() }).unwrap();
        b.apply(&StreamPart::TextEnd { id: "t".into() }).unwrap();
        let response = b.finish();
        assert_eq!(response.text(), "Hi there!");
        assert!(response
            .content
            .iter()
            .any(|c| matches!(c, Content::Reasoning { text, .. } if text == "I will open with banter.")));
    }
}
