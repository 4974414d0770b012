//! Anthropic Messages API adapter (SPEC_FULL §4.6, §6). Grounded on
//! `siumai/src/providers/anthropic/{transformers,streaming}.rs` and
//! `siumai-provider-anthropic/src/standards/anthropic/cache.rs`'s cache-control pattern.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use crate::cancel::CancelHandle;
use crate::error::{is_retryable_status, LlmError, Result};
use crate::model::{LanguageModel, PartStream};
use crate::streaming::StreamPart;
use crate::types::{Call, CallWarning, Content, FinishReason, Message, MessagePart, Role, Usage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Clone)]
pub struct AnthropicConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub version: String,
    pub headers: HashMap<String, String>,
}

pub struct AnthropicModel {
    config: AnthropicConfig,
    model: String,
    http: reqwest::Client,
}

impl AnthropicModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            config: AnthropicConfig {
                api_key: SecretString::from(api_key.into()),
                base_url: DEFAULT_BASE_URL.to_string(),
                version: ANTHROPIC_VERSION.to_string(),
                headers: HashMap::new(),
            },
            model: model.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(key.into(), value.into());
        self
    }

    fn build_headers(&self, extra_beta: &[&str]) -> Result<reqwest::header::HeaderMap> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            reqwest::header::HeaderName::from_static("x-api-key"),
            reqwest::header::HeaderValue::from_str(self.config.api_key.expose_secret())
                .map_err(|e| LlmError::LoadApiKey(e.to_string()))?,
        );
        headers.insert(
            reqwest::header::HeaderName::from_static("anthropic-version"),
            reqwest::header::HeaderValue::from_str(&self.config.version)
                .map_err(|e| LlmError::InvalidArgument(e.to_string()))?,
        );
        if !extra_beta.is_empty() {
            headers.insert(
                reqwest::header::HeaderName::from_static("anthropic-beta"),
                reqwest::header::HeaderValue::from_str(&extra_beta.join(","))
                    .map_err(|e| LlmError::InvalidArgument(e.to_string()))?,
            );
        }
        for (k, v) in &self.config.headers {
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(k.as_bytes()),
                reqwest::header::HeaderValue::from_str(v),
            ) {
                headers.insert(name, value);
            }
        }
        Ok(headers)
    }

    async fn map_error_response(resp: reqwest::Response) -> LlmError {
        let status = resp.status().as_u16();
        let retry_after_secs = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        let text = resp.text().await.unwrap_or_default();
        let details: Option<Value> = serde_json::from_str(&text).ok();
        let message = details
            .as_ref()
            .and_then(|d| d.get("error"))
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(text);
        LlmError::ApiError {
            status: Some(status),
            message,
            retryable: is_retryable_status(status),
            details,
            retry_after_secs,
        }
    }
}

fn dropped(setting: &str, details: &str) -> CallWarning {
    CallWarning::UnsupportedSetting {
        setting: setting.to_string(),
        details: Some(details.to_string()),
    }
}

/// Per-block cache breakpoint read from `provider_metadata["anthropic"]["cacheControl"]`,
/// mirroring the teacher's `CacheControl`/`CacheType` pair.
fn cache_control_of(metadata: &Option<crate::types::ProviderMetadata>) -> Option<Value> {
    let cache = metadata.as_ref()?.get("anthropic")?.get("cacheControl")?;
    Some(json!({"type": cache.as_str().unwrap_or("ephemeral")}))
}

fn system_blocks(prompt: &[Message]) -> Vec<Value> {
    prompt
        .iter()
        .filter(|m| m.role == Role::System)
        .flat_map(|m| {
            m.content.iter().filter_map(|part| match part {
                MessagePart::Text { text } => {
                    let mut block = json!({"type": "text", "text": text});
                    if let Some(cc) = cache_control_of(&m.provider_metadata) {
                        block["cache_control"] = cc;
                    }
                    Some(block)
                }
                _ => None,
            })
        })
        .collect()
}

fn convert_user_content(msg: &Message) -> Value {
    let blocks: Vec<Value> = msg
        .content
        .iter()
        .filter_map(|part| match part {
            MessagePart::Text { text } => Some(json!({"type": "text", "text": text})),
            MessagePart::File { bytes, media_type, .. } => {
                let b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes);
                if media_type.starts_with("image/") {
                    Some(json!({
                        "type": "image",
                        "source": {"type": "base64", "media_type": media_type, "data": b64},
                    }))
                } else {
                    Some(json!({
                        "type": "document",
                        "source": {"type": "base64", "media_type": media_type, "data": b64},
                    }))
                }
            }
            MessagePart::ToolResult { tool_call_id, output, .. } => {
                let (content, is_error) = match output {
                    crate::types::ToolResultOutput::Text { text } => (json!(text), false),
                    crate::types::ToolResultOutput::Error { error } => (json!(error), true),
                    crate::types::ToolResultOutput::Media { base64, media_type } => (
                        json!([{"type": "image", "source": {"type": "base64", "media_type": media_type, "data": base64}}]),
                        false,
                    ),
                };
                let mut block = json!({
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": content,
                });
                if is_error {
                    block["is_error"] = json!(true);
                }
                Some(block)
            }
            _ => None,
        })
        .map(|mut block: Value| {
            if matches!(msg.content.first(), Some(MessagePart::Text { .. })) {
                if let Some(cc) = cache_control_of(&msg.provider_metadata) {
                    block["cache_control"] = cc;
                }
            }
            block
        })
        .collect();
    Value::Array(blocks)
}

fn convert_assistant_content(msg: &Message, warnings: &mut Vec<CallWarning>) -> Value {
    let blocks: Vec<Value> = msg
        .content
        .iter()
        .filter_map(|part| match part {
            MessagePart::Text { text } => Some(json!({"type": "text", "text": text})),
            MessagePart::Reasoning { text, provider_metadata } => {
                let signature = provider_metadata
                    .as_ref()
                    .and_then(|m| m.get("anthropic"))
                    .and_then(|a| a.get("signature"))
                    .and_then(Value::as_str);
                match signature {
                    Some(sig) => Some(json!({"type": "thinking", "thinking": text, "signature": sig})),
                    None => {
                        warnings.push(dropped("reasoning", "thinking block missing a signature; dropped from replay"));
                        None
                    }
                }
            }
            MessagePart::ToolCall { tool_call_id, tool_name, input, .. } => Some(json!({
                "type": "tool_use",
                "id": tool_call_id,
                "name": tool_name,
                "input": input,
            })),
            _ => None,
        })
        .collect();
    Value::Array(blocks)
}

fn convert_messages(prompt: &[Message], warnings: &mut Vec<CallWarning>) -> Vec<Value> {
    let mut out = Vec::new();
    for msg in prompt {
        match msg.role {
            Role::System => {}
            Role::User => out.push(json!({"role": "user", "content": convert_user_content(msg)})),
            Role::Assistant => out.push(json!({"role": "assistant", "content": convert_assistant_content(msg, warnings)})),
            Role::Tool => out.push(json!({"role": "user", "content": convert_user_content(msg)})),
        }
    }
    out
}

fn convert_tools(tools: &[crate::types::Tool], warnings: &mut Vec<CallWarning>) -> Vec<Value> {
    tools
        .iter()
        .filter_map(|t| match t {
            crate::types::Tool::Function(f) => Some(json!({
                "name": f.name,
                "description": f.description,
                "input_schema": f.parameters,
            })),
            crate::types::Tool::ProviderDefined { name, .. } => {
                warnings.push(dropped("tool", &format!("provider-defined tool '{name}' has no Anthropic messages equivalent")));
                None
            }
        })
        .collect()
}

fn convert_tool_choice(choice: &crate::types::ToolChoice) -> Option<Value> {
    match choice {
        crate::types::ToolChoice::Auto => Some(json!({"type": "auto"})),
        crate::types::ToolChoice::None => None,
        crate::types::ToolChoice::Required => Some(json!({"type": "any"})),
        crate::types::ToolChoice::Specific { name } => Some(json!({"type": "tool", "name": name})),
    }
}

/// Extracts `provider_options["anthropic"]["thinking"]` as `(budget_tokens, enabled)`,
/// validating the `budgetTokens > 0` invariant (SPEC_FULL §4.6).
fn thinking_config(call: &Call) -> Result<Option<u32>> {
    let Some(opts) = call.provider_options.get("anthropic") else {
        return Ok(None);
    };
    let Some(thinking) = opts.get("thinking") else {
        return Ok(None);
    };
    let enabled = thinking.get("type").and_then(Value::as_str) == Some("enabled");
    if !enabled {
        return Ok(None);
    }
    let budget = thinking.get("budgetTokens").and_then(Value::as_u64).unwrap_or(0);
    if budget == 0 {
        return Err(LlmError::UnsupportedFunctionality(
            "anthropic thinking requires budgetTokens > 0".into(),
        ));
    }
    Ok(Some(budget as u32))
}

fn build_request_body(model: &str, call: &Call, warnings: &mut Vec<CallWarning>) -> Result<Value> {
    let system = system_blocks(&call.prompt);
    let mut body = json!({
        "model": model,
        "messages": convert_messages(&call.prompt, warnings),
    });
    if !system.is_empty() {
        body["system"] = Value::Array(system);
    }

    let thinking_budget = thinking_config(call)?;
    let mut max_tokens = call.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    if let Some(budget) = thinking_budget {
        body["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
        max_tokens += budget;
        if call.temperature.is_some() || call.top_p.is_some() {
            warnings.push(dropped("temperature", "extended thinking requires sampling params unset"));
        }
    } else {
        if let Some(t) = call.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(tp) = call.top_p {
            body["top_p"] = json!(tp);
        }
    }
    body["max_tokens"] = json!(max_tokens);

    if let Some(k) = call.top_k {
        body["top_k"] = json!(k);
    }

    if !call.tools.is_empty() {
        let tools = convert_tools(&call.tools, warnings);
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools);
            if let Some(choice) = convert_tool_choice(&call.tool_choice) {
                body["tool_choice"] = choice;
            }
        }
    }

    Ok(body)
}

fn map_stop_reason(s: Option<&str>) -> FinishReason {
    match s {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("pause_turn") => FinishReason::Other,
        Some("refusal") => FinishReason::ContentFilter,
        _ => FinishReason::Unknown,
    }
}

fn parse_usage(u: &Value) -> Usage {
    let input = u.get("input_tokens").and_then(Value::as_u64).map(|v| v as u32);
    let output = u.get("output_tokens").and_then(Value::as_u64).map(|v| v as u32);
    Usage {
        input_tokens: input,
        output_tokens: output,
        total_tokens: match (input, output) {
            (Some(i), Some(o)) => Some(i + o),
            _ => None,
        },
        reasoning_tokens: None,
        cache_creation_input_tokens: u.get("cache_creation_input_tokens").and_then(Value::as_u64).map(|v| v as u32),
        cache_read_input_tokens: u.get("cache_read_input_tokens").and_then(Value::as_u64).map(|v| v as u32),
    }
}

fn parse_response(body: &Value) -> Result<crate::types::Response> {
    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or(LlmError::EmptyResponseBody)?;

    let mut content = Vec::new();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    content.push(Content::text(text));
                }
            }
            Some("thinking") => {
                let text = block.get("thinking").and_then(Value::as_str).unwrap_or_default().to_string();
                let signature = block.get("signature").and_then(Value::as_str).map(str::to_string);
                let mut metadata: crate::types::ProviderMetadata = HashMap::new();
                let mut inner = HashMap::new();
                if let Some(sig) = signature {
                    inner.insert("signature".to_string(), json!(sig));
                }
                metadata.insert("anthropic".to_string(), inner);
                content.push(Content::Reasoning {
                    text,
                    provider_metadata: Some(metadata),
                });
            }
            Some("tool_use") => {
                let id = block.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
                let name = block.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                content.push(Content::tool_call(id, name, input));
            }
            _ => {}
        }
    }

    let finish_reason = map_stop_reason(body.get("stop_reason").and_then(Value::as_str));
    let usage = body.get("usage").map(parse_usage).unwrap_or_default();

    Ok(crate::types::Response {
        id: body.get("id").and_then(Value::as_str).map(str::to_string),
        content,
        finish_reason,
        usage,
        warnings: Vec::new(),
        provider_metadata: None,
    })
}

#[derive(Default)]
struct ContentBlockState {
    block_type: String,
    id: String,
    name: String,
    json_buf: String,
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, call: Call) -> Result<crate::types::Response> {
        let mut warnings = Vec::new();
        let body = build_request_body(&self.model, &call, &mut warnings)?;
        let url = format!("{}/messages", self.config.base_url);
        let resp = self
            .http
            .post(&url)
            .headers(self.build_headers(&[])?)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::map_error_response(resp).await);
        }
        let json_body: Value = resp.json().await?;
        let mut response = parse_response(&json_body)?;
        response.warnings = warnings;
        Ok(response)
    }

    async fn stream(&self, call: Call, cancel: CancelHandle) -> Result<PartStream> {
        let mut warnings = Vec::new();
        let mut body = build_request_body(&self.model, &call, &mut warnings)?;
        body["stream"] = json!(true);

        let url = format!("{}/messages", self.config.base_url);
        let resp = self
            .http
            .post(&url)
            .headers(self.build_headers(&[])?)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::map_error_response(resp).await);
        }

        let byte_stream = resp.bytes_stream().map(|r| r.map_err(LlmError::Http));
        let mut events = byte_stream.eventsource();

        let stream = async_stream::stream! {
            if !warnings.is_empty() {
                yield Ok(StreamPart::Warnings(warnings));
            }

            let mut blocks: BTreeMap<u64, ContentBlockState> = BTreeMap::new();
            let mut usage = Usage::default();
            let mut finish_reason = FinishReason::Unknown;

            while let Some(event) = events.next().await {
                if cancel.is_cancelled() {
                    yield Err(LlmError::Cancelled);
                    return;
                }
                let event = match event {
                    Ok(e) => e,
                    Err(e) => {
                        yield Ok(StreamPart::Error(LlmError::JsonParse(e.to_string())));
                        return;
                    }
                };
                if event.data.trim().is_empty() {
                    continue;
                }
                let parsed: Value = match serde_json::from_str(&event.data) {
                    Ok(v) => v,
                    Err(e) => {
                        yield Ok(StreamPart::Error(LlmError::JsonParse(e.to_string())));
                        return;
                    }
                };

                match parsed.get("type").and_then(Value::as_str) {
                    Some("message_start") => {
                        if let Some(u) = parsed.get("message").and_then(|m| m.get("usage")) {
                            usage = parse_usage(u);
                        }
                    }
                    Some("content_block_start") => {
                        let index = parsed.get("index").and_then(Value::as_u64).unwrap_or(0);
                        let block = parsed.get("content_block").cloned().unwrap_or_default();
                        let block_type = block.get("type").and_then(Value::as_str).unwrap_or_default().to_string();
                        let id = format!("block-{index}");
                        match block_type.as_str() {
                            "text" => {
                                yield Ok(StreamPart::TextStart { id: id.clone() });
                            }
                            "thinking" => {
                                yield Ok(StreamPart::ReasoningStart { id: id.clone(), provider_metadata: None });
                            }
                            "tool_use" => {
                                let tool_id = block.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
                                let name = block.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                                yield Ok(StreamPart::ToolInputStart { id: tool_id.clone(), tool_name: name.clone() });
                                blocks.insert(index, ContentBlockState { block_type: block_type.clone(), id: tool_id, name, json_buf: String::new() });
                                continue;
                            }
                            _ => {}
                        }
                        blocks.insert(index, ContentBlockState { block_type, id, name: String::new(), json_buf: String::new() });
                    }
                    Some("content_block_delta") => {
                        let index = parsed.get("index").and_then(Value::as_u64).unwrap_or(0);
                        let Some(delta) = parsed.get("delta") else { continue };
                        let Some(state) = blocks.get_mut(&index) else { continue };
                        match delta.get("type").and_then(Value::as_str) {
                            Some("text_delta") => {
                                if let Some(text) = delta.get("text").and_then(Value::as_str) {
                                    yield Ok(StreamPart::TextDelta { id: state.id.clone(), delta: text.to_string() });
                                }
                            }
                            Some("thinking_delta") => {
                                if let Some(text) = delta.get("thinking").and_then(Value::as_str) {
                                    yield Ok(StreamPart::ReasoningDelta { id: state.id.clone(), delta: text.to_string(), provider_metadata: None });
                                }
                            }
                            Some("signature_delta") => {
                                // Final signature arrives as the only payload before content_block_stop;
                                // the non-streaming parser is the canonical replay path for thinking blocks.
                            }
                            Some("input_json_delta") => {
                                if let Some(partial) = delta.get("partial_json").and_then(Value::as_str) {
                                    state.json_buf.push_str(partial);
                                    yield Ok(StreamPart::ToolInputDelta { id: state.id.clone(), delta: partial.to_string() });
                                }
                            }
                            _ => {}
                        }
                    }
                    Some("content_block_stop") => {
                        let index = parsed.get("index").and_then(Value::as_u64).unwrap_or(0);
                        if let Some(state) = blocks.get(&index) {
                            match state.block_type.as_str() {
                                "text" => yield Ok(StreamPart::TextEnd { id: state.id.clone() }),
                                "thinking" => yield Ok(StreamPart::ReasoningEnd { id: state.id.clone() }),
                                "tool_use" => {
                                    yield Ok(StreamPart::ToolInputEnd { id: state.id.clone() });
                                    let input: Value = serde_json::from_str(&state.json_buf).unwrap_or_else(|_| json!({}));
                                    yield Ok(StreamPart::ToolCall { id: state.id.clone(), tool_name: state.name.clone(), input });
                                }
                                _ => {}
                            }
                        }
                    }
                    Some("message_delta") => {
                        if let Some(u) = parsed.get("usage") {
                            let delta_usage = parse_usage(u);
                            usage.output_tokens = delta_usage.output_tokens.or(usage.output_tokens);
                            usage.total_tokens = match (usage.input_tokens, usage.output_tokens) {
                                (Some(i), Some(o)) => Some(i + o),
                                _ => usage.total_tokens,
                            };
                        }
                        if let Some(reason) = parsed.get("delta").and_then(|d| d.get("stop_reason")).and_then(Value::as_str) {
                            finish_reason = map_stop_reason(Some(reason));
                        }
                    }
                    Some("message_stop") => break,
                    Some("error") => {
                        let message = parsed.get("error").and_then(|e| e.get("message")).and_then(Value::as_str).unwrap_or("unknown error").to_string();
                        yield Ok(StreamPart::Error(LlmError::ApiError {
                            status: None,
                            message,
                            retryable: false,
                            details: Some(parsed.clone()),
                            retry_after_secs: None,
                        }));
                        return;
                    }
                    _ => {}
                }
            }

            yield Ok(StreamPart::Finish { usage, finish_reason });
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Prompt, Tool, ToolChoice};

    #[test]
    fn system_messages_extracted_as_separate_array() {
        let prompt: Prompt = vec![Message::system("be terse"), Message::user("hi")];
        let blocks = system_blocks(&prompt);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["text"], json!("be terse"));

        let mut warnings = Vec::new();
        let messages = convert_messages(&prompt, &mut warnings);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], json!("user"));
    }

    #[test]
    fn tool_choice_translation() {
        assert_eq!(convert_tool_choice(&ToolChoice::Auto), Some(json!({"type": "auto"})));
        assert_eq!(convert_tool_choice(&ToolChoice::None), None);
        assert_eq!(convert_tool_choice(&ToolChoice::Required), Some(json!({"type": "any"})));
        assert_eq!(
            convert_tool_choice(&ToolChoice::tool("search")),
            Some(json!({"type": "tool", "name": "search"}))
        );
    }

    #[test]
    fn thinking_requires_positive_budget() {
        let mut call = Call::new(vec![Message::user("hi")]);
        call.provider_options.insert(
            "anthropic".to_string(),
            json!({"thinking": {"type": "enabled", "budgetTokens": 0}}),
        );
        assert!(thinking_config(&call).is_err());
    }

    #[test]
    fn thinking_budget_increases_max_tokens() {
        let mut call = Call::new(vec![Message::user("hi")]).with_max_output_tokens(1000);
        call.provider_options.insert(
            "anthropic".to_string(),
            json!({"thinking": {"type": "enabled", "budgetTokens": 2000}}),
        );
        let mut warnings = Vec::new();
        let body = build_request_body("claude-3-7-sonnet-20250219", &call, &mut warnings).unwrap();
        assert_eq!(body["max_tokens"], json!(3000));
        assert_eq!(body["thinking"]["budget_tokens"], json!(2000));
    }

    #[test]
    fn assistant_reasoning_without_signature_is_dropped_with_warning() {
        let msg = Message::assistant(vec![MessagePart::Reasoning {
            text: "let me think".into(),
            provider_metadata: None,
        }]);
        let mut warnings = Vec::new();
        let content = convert_assistant_content(&msg, &mut warnings);
        assert_eq!(content, json!([]));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn tool_use_block_round_trips_into_tool_call() {
        let mut tools = Vec::new();
        let mut warnings = Vec::new();
        tools.push(Tool::function("search", "search the web", json!({"type": "object"})));
        let converted = convert_tools(&tools, &mut warnings);
        assert_eq!(converted[0]["name"], json!("search"));
        assert_eq!(converted[0]["input_schema"], json!({"type": "object"}));
    }

    #[test]
    fn parses_tool_use_and_thinking_blocks() {
        let body = json!({
            "id": "msg_1",
            "content": [
                {"type": "thinking", "thinking": "reasoning...", "signature": "sig123"},
                {"type": "text", "text": "done"},
                {"type": "tool_use", "id": "toolu_1", "name": "search", "input": {"q": "rust"}},
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 20},
        });
        let response = parse_response(&body).unwrap();
        assert_eq!(response.text(), "done");
        assert!(response.has_tool_calls());
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.usage.total_tokens, Some(30));
    }

    #[test]
    fn tool_result_message_maps_to_user_role_with_tool_result_block() {
        let msg = Message::tool(vec![MessagePart::ToolResult {
            tool_call_id: "toolu_1".into(),
            output: crate::types::ToolResultOutput::Text { text: "42".into() },
            provider_metadata: None,
        }]);
        let content = convert_user_content(&msg);
        assert_eq!(content[0]["type"], json!("tool_result"));
        assert_eq!(content[0]["tool_use_id"], json!("toolu_1"));
    }

    #[tokio::test]
    async fn generate_parses_a_successful_response() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "msg_1",
                    "content": [{"type": "text", "text": "hi there"}],
                    "stop_reason": "end_turn",
                    "usage": {"input_tokens": 3, "output_tokens": 2},
                })
                .to_string(),
            )
            .create_async()
            .await;

        let model = AnthropicModel::new("test-key", "claude-3-5-sonnet-20241022").with_base_url(server.url());
        let call = Call::new(vec![Message::user("hi")]);
        let response = model.generate(call).await.unwrap();
        assert_eq!(response.text(), "hi there");
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.total_tokens, Some(5));
    }

    #[tokio::test]
    async fn generate_maps_overloaded_status_to_retryable_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/messages")
            .with_status(529)
            .with_body(json!({"error": {"message": "overloaded"}}).to_string())
            .create_async()
            .await;

        let model = AnthropicModel::new("test-key", "claude-3-5-sonnet-20241022").with_base_url(server.url());
        let call = Call::new(vec![Message::user("hi")]);
        let err = model.generate(call).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), Some(529));
    }
}
