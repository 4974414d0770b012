//! Per-stage callbacks fired as the streaming pipeline consumes `StreamPart`s
//! (SPEC_FULL §4.5). All fields are optional; dispatch happens in the consumer
//! task, never from inside a provider adapter.

use std::sync::Arc;

use crate::error::LlmError;
use crate::types::{CallWarning, Content, FinishReason, Source, StepResult, Usage};

use super::StreamPart;

type Cb<A> = Option<Arc<dyn Fn(A) + Send + Sync>>;

#[derive(Clone, Default)]
pub struct StreamCallbacks {
    pub on_agent_start: Cb<()>,
    pub on_step_start: Cb<usize>,

    /// Raw passthrough: fired for every `StreamPart`, before the per-variant
    /// callbacks below (SPEC_FULL §4.5).
    pub on_chunk: Cb<StreamPart>,

    pub on_warnings: Cb<Vec<CallWarning>>,

    pub on_text_start: Cb<String>,
    pub on_text_delta: Cb<(String, String)>,
    pub on_text_end: Cb<String>,

    pub on_reasoning_start: Cb<String>,
    pub on_reasoning_delta: Cb<(String, String)>,
    pub on_reasoning_end: Cb<String>,

    pub on_tool_input_start: Cb<(String, String)>,
    pub on_tool_input_delta: Cb<(String, String)>,
    pub on_tool_input_end: Cb<String>,

    pub on_tool_call: Cb<(String, String, serde_json::Value)>,
    pub on_tool_result: Cb<(String, String, Content)>,

    pub on_source: Cb<Source>,

    pub on_stream_finish: Cb<(Usage, FinishReason)>,
    pub on_stream_error: Cb<String>,

    pub on_step_finish: Cb<StepResult>,
    pub on_finish: Cb<Vec<StepResult>>,
    pub on_agent_finish: Cb<()>,

    pub on_error: Cb<String>,
}

impl StreamCallbacks {
    pub fn builder() -> Self {
        Self::default()
    }

    pub fn with_on_step_finish(mut self, f: impl Fn(StepResult) + Send + Sync + 'static) -> Self {
        self.on_step_finish = Some(Arc::new(f));
        self
    }

    pub fn with_on_finish(mut self, f: impl Fn(Vec<StepResult>) + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Arc::new(f));
        self
    }

    pub fn with_on_chunk_error(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn with_on_chunk(mut self, f: impl Fn(StreamPart) + Send + Sync + 'static) -> Self {
        self.on_chunk = Some(Arc::new(f));
        self
    }

    pub(crate) fn fire_error(&self, err: &LlmError) {
        if let Some(cb) = &self.on_stream_error {
            cb(err.to_string());
        }
        if let Some(cb) = &self.on_error {
            cb(err.to_string());
        }
    }
}
