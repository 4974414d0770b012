//! The `prepare_step` extension point (SPEC_FULL §10.5 / §4.1 step 2).

use std::sync::Arc;

use crate::model::LanguageModel;
use crate::types::{Message, StepResult, ToolChoice};

pub struct PrepareStepInput<'a> {
    pub step_number: usize,
    pub steps: &'a [StepResult],
    pub messages: &'a [Message],
    /// The model that would run this step absent an override.
    pub model: &'a dyn LanguageModel,
}

#[derive(Default)]
pub struct PrepareStepOutput {
    pub system: Option<String>,
    pub messages: Option<Vec<Message>>,
    pub tool_choice: Option<ToolChoice>,
    pub active_tools: Option<Vec<String>>,
    pub disable_all_tools: bool,
    /// Swaps the model used for this step only (SPEC_FULL §4.1 step 2).
    pub model: Option<Arc<dyn LanguageModel>>,
}

pub type PrepareStepFn = Arc<dyn Fn(&PrepareStepInput) -> PrepareStepOutput + Send + Sync>;
