//! Provider adapters implementing `LanguageModel` (SPEC_FULL §4.6).

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicModel;
pub use openai::OpenAiModel;
