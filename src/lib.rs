//! `agentcore`: an agent loop, streaming event pipeline, and provider adapters
//! for OpenAI and Anthropic chat models (see SPEC_FULL.md).
//!
//! The crate is organized around one trait, [`model::LanguageModel`], that every
//! provider adapter implements, and one orchestrator, [`orchestrator::Agent`],
//! that drives the step loop against it. [`providers`] ships adapters for
//! OpenAI's chat-completions API and Anthropic's messages API; bring your own
//! `Arc<dyn LanguageModel>` to plug in anything else.
//!
//! ```no_run
//! use std::sync::Arc;
//! use agentcore::orchestrator::Agent;
//! use agentcore::providers::OpenAiModel;
//! use agentcore::tools::ToolRegistry;
//!
//! # async fn run() -> agentcore::error::Result<()> {
//! let model = Arc::new(OpenAiModel::new("sk-...", "gpt-4o"));
//! let agent = Agent::new(model, ToolRegistry::new()).with_system("You are concise.");
//! let result = agent.generate("What's the capital of France?", vec![]).await?;
//! println!("{}", result.text());
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod providers;
pub mod retry;
pub mod streaming;
pub mod tools;
pub mod types;

pub use error::{LlmError, Result};
pub use model::LanguageModel;
pub use orchestrator::Agent;
