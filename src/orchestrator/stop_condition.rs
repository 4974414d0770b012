//! Stop conditions: pure predicates over accumulated steps, OR-combined by the
//! loop (SPEC_FULL §4.1). Grounded on `siumai/src/orchestrator/stop_condition.rs`.

use crate::types::{Content, FinishReason, StepResult};

pub trait StopCondition: Send + Sync {
    fn should_stop(&self, steps: &[StepResult]) -> bool;
}

pub struct StepCountIs(pub usize);

impl StopCondition for StepCountIs {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        steps.len() >= self.0
    }
}

pub fn step_count_is(count: usize) -> StepCountIs {
    StepCountIs(count)
}

pub struct HasToolCall(pub String);

impl StopCondition for HasToolCall {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        steps.last().is_some_and(|s| {
            s.response.content.iter().any(|c| match c {
                Content::ToolCall { tool_name, .. } => tool_name == &self.0,
                _ => false,
            })
        })
    }
}

pub fn has_tool_call(name: impl Into<String>) -> HasToolCall {
    HasToolCall(name.into())
}

pub struct HasTextResponse;

impl StopCondition for HasTextResponse {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        steps.last().is_some_and(|s| !s.has_tool_calls())
    }
}

pub fn has_text_response() -> HasTextResponse {
    HasTextResponse
}

pub struct HasToolResult;

impl StopCondition for HasToolResult {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        steps.last().is_some_and(StepResult::has_tool_results)
    }
}

pub fn has_tool_result() -> HasToolResult {
    HasToolResult
}

/// Alias for `HasTextResponse`, kept as a separate name for callers that read
/// "stop once the model stops calling tools" more naturally than "has text".
pub fn has_no_tool_calls() -> HasTextResponse {
    HasTextResponse
}

pub struct FinishReasonIs(pub FinishReason);

impl StopCondition for FinishReasonIs {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        steps.last().is_some_and(|s| s.response.finish_reason == self.0)
    }
}

pub fn finish_reason_is(reason: FinishReason) -> FinishReasonIs {
    FinishReasonIs(reason)
}

/// Stops once the aggregate token usage across all steps so far reaches `max_tokens`.
pub struct TokenThresholdReached(pub u32);

impl StopCondition for TokenThresholdReached {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        let total: u32 = steps
            .iter()
            .map(|s| s.response.usage.total_tokens.unwrap_or(0))
            .sum();
        total >= self.0
    }
}

pub fn token_threshold_reached(max_tokens: u32) -> TokenThresholdReached {
    TokenThresholdReached(max_tokens)
}

pub struct AnyOf(pub Vec<Box<dyn StopCondition>>);

impl StopCondition for AnyOf {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        self.0.iter().any(|c| c.should_stop(steps))
    }
}

pub fn any_of(conditions: Vec<Box<dyn StopCondition>>) -> AnyOf {
    AnyOf(conditions)
}

pub struct AllOf(pub Vec<Box<dyn StopCondition>>);

impl StopCondition for AllOf {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        !self.0.is_empty() && self.0.iter().all(|c| c.should_stop(steps))
    }
}

pub fn all_of(conditions: Vec<Box<dyn StopCondition>>) -> AllOf {
    AllOf(conditions)
}

pub struct CustomCondition<F>(pub F);

impl<F: Fn(&[StepResult]) -> bool + Send + Sync> StopCondition for CustomCondition<F> {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        (self.0)(steps)
    }
}

pub fn custom_condition<F: Fn(&[StepResult]) -> bool + Send + Sync>(predicate: F) -> CustomCondition<F> {
    CustomCondition(predicate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Response;

    fn step_with_tool_call(name: &str) -> StepResult {
        StepResult {
            response: Response {
                content: vec![Content::tool_call("id1", name, serde_json::json!({}))],
                ..Default::default()
            },
            messages: vec![],
        }
    }

    fn step_without_tool_call() -> StepResult {
        StepResult {
            response: Response {
                content: vec![Content::text("done")],
                ..Default::default()
            },
            messages: vec![],
        }
    }

    #[test]
    fn test_step_count_is() {
        let cond = step_count_is(2);
        assert!(!cond.should_stop(&[step_without_tool_call()]));
        assert!(cond.should_stop(&[step_without_tool_call(), step_without_tool_call()]));
    }

    #[test]
    fn test_has_tool_call() {
        let cond = has_tool_call("search");
        assert!(cond.should_stop(&[step_with_tool_call("search")]));
        assert!(!cond.should_stop(&[step_with_tool_call("other")]));
    }

    #[test]
    fn test_has_text_response() {
        let cond = has_text_response();
        assert!(cond.should_stop(&[step_without_tool_call()]));
        assert!(!cond.should_stop(&[step_with_tool_call("x")]));
    }

    #[test]
    fn test_any_of() {
        let cond = any_of(vec![Box::new(step_count_is(5)), Box::new(has_tool_call("done"))]);
        assert!(cond.should_stop(&[step_with_tool_call("done")]));
        assert!(!cond.should_stop(&[step_with_tool_call("other")]));
    }

    #[test]
    fn test_custom_condition() {
        let cond = custom_condition(|steps| steps.len() > 1);
        assert!(!cond.should_stop(&[step_without_tool_call()]));
        assert!(cond.should_stop(&[step_without_tool_call(), step_without_tool_call()]));
    }
}
