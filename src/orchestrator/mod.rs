//! The agent loop: step scheduling, stop conditions, tool validation/repair,
//! parallel tool execution, and the streaming pipeline (SPEC_FULL §4.1, §4.5).

pub mod agent;
pub mod generate;
pub mod prepare_step;
pub mod stop_condition;
pub mod stream;

pub use agent::Agent;
pub use generate::{RepairContext, RepairFn};
pub use prepare_step::{PrepareStepFn, PrepareStepInput, PrepareStepOutput};
pub use stop_condition::StopCondition;
pub use stream::{StreamOrchestration, StreamedAgentResult};

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use futures::stream;

    use crate::cancel::CancelHandle;
    use crate::error::Result;
    use crate::model::{LanguageModel, PartStream};
    use crate::tools::{ToolCall, ToolHandler, ToolOutcome, ToolRegistry};
    use crate::types::{Call, Content, FinishReason, Response, Tool};

    use super::*;

    /// A model double that replays a fixed sequence of responses, one per call.
    struct ScriptedModel {
        responses: std::sync::Mutex<Vec<Response>>,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn provider(&self) -> &str {
            "test"
        }
        fn model(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _call: Call) -> Result<Response> {
            let mut responses = self.responses.lock().unwrap();
            Ok(responses.remove(0))
        }

        async fn stream(&self, _call: Call, _cancel: CancelHandle) -> Result<PartStream> {
            Ok(Box::pin(stream::empty()))
        }
    }

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        fn descriptor(&self) -> Tool {
            Tool::function(
                "echo",
                "echoes the message field back",
                serde_json::json!({
                    "type": "object",
                    "properties": {"message": {"type": "string"}},
                    "required": ["message"],
                }),
            )
        }

        async fn run(&self, call: &ToolCall) -> Result<ToolOutcome> {
            let message = call.input.get("message").and_then(|v| v.as_str()).unwrap_or_default();
            Ok(ToolOutcome::ok(format!("Echo: {message}")))
        }
    }

    #[tokio::test]
    async fn single_step_text_response() {
        let model = Arc::new(ScriptedModel {
            responses: std::sync::Mutex::new(vec![Response {
                content: vec![Content::text("Hello, world!")],
                finish_reason: FinishReason::Stop,
                ..Default::default()
            }]),
        });
        let agent = Agent::new(model, ToolRegistry::new());
        let result = agent.generate("hi", vec![]).await.unwrap();
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.text(), "Hello, world!");
        assert_eq!(result.response().unwrap().text(), result.steps.last().unwrap().response.text());
    }

    #[tokio::test]
    async fn two_step_tool_call_then_text() {
        let model = Arc::new(ScriptedModel {
            responses: std::sync::Mutex::new(vec![
                Response {
                    content: vec![Content::tool_call("t1", "echo", serde_json::json!({"message": "test"}))],
                    finish_reason: FinishReason::ToolCalls,
                    ..Default::default()
                },
                Response {
                    content: vec![Content::text("Tool executed successfully")],
                    finish_reason: FinishReason::Stop,
                    ..Default::default()
                },
            ]),
        });
        let tools = ToolRegistry::new().register(Arc::new(EchoTool));
        let agent = Agent::new(model, tools);
        let result = agent.generate("please echo test", vec![]).await.unwrap();

        assert_eq!(result.steps.len(), 2);
        let step1_results = result.steps[0].tool_results();
        assert_eq!(step1_results.len(), 1);
        match step1_results[0] {
            Content::ToolResult { output, .. } => assert_eq!(output.as_text(), "Echo: test"),
            _ => panic!("expected tool result"),
        }
        assert_eq!(result.text(), "Tool executed successfully");
    }

    #[tokio::test]
    async fn active_tools_filters_registry() {
        let tools = ToolRegistry::new()
            .register(Arc::new(EchoTool))
            .register(Arc::new(SecondTool));
        let descriptors = tools.active_descriptors(&["echo".to_string()]);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name(), "echo");
    }

    struct SecondTool;
    #[async_trait]
    impl ToolHandler for SecondTool {
        fn descriptor(&self) -> Tool {
            Tool::function("second", "second tool", serde_json::json!({"type": "object"}))
        }
        async fn run(&self, _call: &ToolCall) -> Result<ToolOutcome> {
            Ok(ToolOutcome::ok(""))
        }
    }

    #[tokio::test]
    async fn step_count_stop_condition_halts_loop() {
        let counter = Arc::new(AtomicUsize::new(0));
        struct LoopingModel(Arc<AtomicUsize>);

        #[async_trait]
        impl LanguageModel for LoopingModel {
            fn provider(&self) -> &str {
                "test"
            }
            fn model(&self) -> &str {
                "looping"
            }
            async fn generate(&self, _call: Call) -> Result<Response> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Response {
                    content: vec![Content::tool_call("tN", "echo", serde_json::json!({"message": "x"}))],
                    finish_reason: FinishReason::ToolCalls,
                    ..Default::default()
                })
            }
            async fn stream(&self, _call: Call, _cancel: CancelHandle) -> Result<PartStream> {
                Ok(Box::pin(stream::empty()))
            }
        }

        let model = Arc::new(LoopingModel(counter.clone()));
        let tools = ToolRegistry::new().register(Arc::new(EchoTool));
        let agent = Agent::new(model, tools).with_max_steps(3);
        let result = agent.generate("loop", vec![]).await.unwrap();
        assert_eq!(result.steps.len(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
