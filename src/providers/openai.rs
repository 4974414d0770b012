//! OpenAI-family chat-completions adapter (SPEC_FULL §4.6, §6). Grounded on
//! `siumai-provider-openai-compatible/src/standards/openai/transformers/{request,response,stream}.rs`
//! and `src/providers/openai_compatible/streaming.rs`'s eventsource-stream pipeline.

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
use crate::types::content::Source;
use crate::types::{Call, CallWarning, Content, FinishReason, Message, Role, Usage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Provider-option keys OpenAI accepts under `call.provider_options["openai"]`, mapped
/// from the camelCase names in SPEC_FULL §4.6 to the wire's snake_case field names.
const PROVIDER_OPTION_KEYS: &[(&str, &str)] = &[
    ("logitBias", "logit_bias"),
    ("logProbs", "logprobs"),
    ("topLogProbs", "top_logprobs"),
    ("parallelToolCalls", "parallel_tool_calls"),
    ("user", "user"),
    ("reasoningEffort", "reasoning_effort"),
    ("textVerbosity", "verbosity"),
    ("prediction", "prediction"),
    ("store", "store"),
    ("metadata", "metadata"),
    ("promptCacheKey", "prompt_cache_key"),
    ("safetyIdentifier", "safety_identifier"),
    ("serviceTier", "service_tier"),
];

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub organization: Option<String>,
    pub project: Option<String>,
    pub headers: HashMap<String, String>,
}

pub struct OpenAiModel {
    config: OpenAiConfig,
    model: String,
    http: reqwest::Client,
}

impl OpenAiModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            config: OpenAiConfig {
                api_key: SecretString::from(api_key.into()),
                base_url: DEFAULT_BASE_URL.to_string(),
                organization: None,
                project: None,
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

    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.config.organization = Some(org.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.config.project = Some(project.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(key.into(), value.into());
        self
    }

    fn build_headers(&self) -> Result<reqwest::header::HeaderMap> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let auth = format!("Bearer {}", self.config.api_key.expose_secret());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth).map_err(|e| LlmError::LoadApiKey(e.to_string()))?,
        );
        if let Some(org) = &self.config.organization {
            headers.insert(
                reqwest::header::HeaderName::from_static("openai-organization"),
                reqwest::header::HeaderValue::from_str(org).map_err(|e| LlmError::InvalidArgument(e.to_string()))?,
            );
        }
        if let Some(project) = &self.config.project {
            headers.insert(
                reqwest::header::HeaderName::from_static("openai-project"),
                reqwest::header::HeaderValue::from_str(project).map_err(|e| LlmError::InvalidArgument(e.to_string()))?,
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

/// `o*` and `gpt-5*` models strip sampling parameters in favor of `max_completion_tokens`
/// (SPEC_FULL §4.6's reasoning-model discipline).
fn is_reasoning_model(model: &str) -> bool {
    let is_o_series = model
        .strip_prefix('o')
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_digit());
    is_o_series || model.starts_with("gpt-5")
}

fn dropped(setting: &str, details: &str) -> CallWarning {
    CallWarning::UnsupportedSetting {
        setting: setting.to_string(),
        details: Some(details.to_string()),
    }
}

fn convert_tool_choice(choice: &crate::types::ToolChoice) -> Value {
    match choice {
        crate::types::ToolChoice::Auto => json!("auto"),
        crate::types::ToolChoice::None => json!("none"),
        crate::types::ToolChoice::Required => json!("required"),
        crate::types::ToolChoice::Specific { name } => json!({"type": "function", "function": {"name": name}}),
    }
}

fn convert_tools(tools: &[crate::types::Tool], warnings: &mut Vec<CallWarning>) -> Vec<Value> {
    tools
        .iter()
        .filter_map(|t| match t {
            crate::types::Tool::Function(f) => Some(json!({
                "type": "function",
                "function": {
                    "name": f.name,
                    "description": f.description,
                    "parameters": f.parameters,
                },
            })),
            crate::types::Tool::ProviderDefined { name, .. } => {
                warnings.push(dropped("tool", &format!("provider-defined tool '{name}' has no OpenAI chat-completions equivalent")));
                None
            }
        })
        .collect()
}

fn convert_user_content(parts: &[crate::types::MessagePart]) -> Value {
    use crate::types::MessagePart;

    if parts.len() == 1 {
        if let MessagePart::Text { text } = &parts[0] {
            return json!(text);
        }
    }

    let blocks: Vec<Value> = parts
        .iter()
        .enumerate()
        .filter_map(|(idx, part)| match part {
            MessagePart::Text { text } => Some(json!({"type": "text", "text": text})),
            MessagePart::File { filename, bytes, media_type, .. } => {
                let data_url = format!("data:{media_type};base64,{}", base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes));
                if media_type.starts_with("image/") {
                    Some(json!({"type": "image_url", "image_url": {"url": data_url}}))
                } else if media_type.starts_with("audio/") {
                    let format = media_type.strip_prefix("audio/").unwrap_or("wav");
                    Some(json!({
                        "type": "input_audio",
                        "input_audio": {
                            "data": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes),
                            "format": format,
                        },
                    }))
                } else {
                    let name = filename.clone().unwrap_or_else(|| format!("part-{idx}.pdf"));
                    Some(json!({"type": "file", "file": {"filename": name, "file_data": data_url}}))
                }
            }
            _ => None,
        })
        .collect();
    Value::Array(blocks)
}

fn convert_assistant_message(msg: &Message, warnings: &mut Vec<CallWarning>) -> Value {
    use crate::types::MessagePart;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in &msg.content {
        match part {
            MessagePart::Text { text: t } => text.push_str(t),
            MessagePart::ToolCall { tool_call_id, tool_name, input, .. } => {
                tool_calls.push(json!({
                    "id": tool_call_id,
                    "type": "function",
                    "function": {"name": tool_name, "arguments": input.to_string()},
                }));
            }
            MessagePart::Reasoning { .. } => {
                warnings.push(dropped("reasoning", "OpenAI chat-completions does not accept reasoning input"));
            }
            _ => {}
        }
    }

    let mut obj = serde_json::Map::new();
    obj.insert("role".into(), json!("assistant"));
    if text.is_empty() && !tool_calls.is_empty() {
        obj.insert("content".into(), Value::Null);
    } else {
        obj.insert("content".into(), json!(text));
    }
    if !tool_calls.is_empty() {
        obj.insert("tool_calls".into(), Value::Array(tool_calls));
    }
    Value::Object(obj)
}

fn convert_tool_message(msg: &Message) -> Vec<Value> {
    use crate::types::MessagePart;

    msg.content
        .iter()
        .filter_map(|part| match part {
            MessagePart::ToolResult { tool_call_id, output, .. } => Some(json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "content": output.as_text(),
            })),
            _ => None,
        })
        .collect()
}

fn convert_messages(prompt: &[Message], warnings: &mut Vec<CallWarning>) -> Vec<Value> {
    let mut out = Vec::new();
    for msg in prompt {
        match msg.role {
            Role::System => out.push(json!({"role": "system", "content": msg.text_content()})),
            Role::User => out.push(json!({"role": "user", "content": convert_user_content(&msg.content)})),
            Role::Assistant => out.push(convert_assistant_message(msg, warnings)),
            Role::Tool => out.extend(convert_tool_message(msg)),
        }
    }
    out
}

fn build_request_body(model: &str, call: &Call, warnings: &mut Vec<CallWarning>) -> Value {
    let reasoning = is_reasoning_model(model);
    let mut body = json!({"model": model});
    body["messages"] = Value::Array(convert_messages(&call.prompt, warnings));

    if reasoning {
        if call.temperature.is_some() {
            warnings.push(dropped("temperature", "reasoning models do not support temperature"));
        }
        if call.top_p.is_some() {
            warnings.push(dropped("top_p", "reasoning models do not support top_p"));
        }
        if call.frequency_penalty.is_some() {
            warnings.push(dropped("frequency_penalty", "reasoning models do not support frequency_penalty"));
        }
        if call.presence_penalty.is_some() {
            warnings.push(dropped("presence_penalty", "reasoning models do not support presence_penalty"));
        }
        if let Some(max) = call.max_output_tokens {
            body["max_completion_tokens"] = json!(max);
        }
    } else {
        if let Some(t) = call.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(tp) = call.top_p {
            body["top_p"] = json!(tp);
        }
        if let Some(fp) = call.frequency_penalty {
            body["frequency_penalty"] = json!(fp);
        }
        if let Some(pp) = call.presence_penalty {
            body["presence_penalty"] = json!(pp);
        }
        if let Some(max) = call.max_output_tokens {
            body["max_tokens"] = json!(max);
        }
    }

    if !call.tools.is_empty() {
        let tools = convert_tools(&call.tools, warnings);
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = convert_tool_choice(&call.tool_choice);
        }
    }

    if let Some(opts) = call.provider_options.get("openai").and_then(Value::as_object) {
        for (camel, snake) in PROVIDER_OPTION_KEYS {
            if let Some(v) = opts.get(*camel) {
                if reasoning && matches!(*camel, "logitBias" | "logProbs" | "topLogProbs") {
                    warnings.push(dropped(camel, "reasoning models do not support this sampling option"));
                    continue;
                }
                body[*snake] = v.clone();
            }
        }
    }

    body
}

fn map_finish_reason(s: Option<&str>) -> FinishReason {
    match s {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Unknown,
    }
}

fn parse_usage(u: &Value) -> Usage {
    Usage {
        input_tokens: u.get("prompt_tokens").and_then(Value::as_u64).map(|v| v as u32),
        output_tokens: u.get("completion_tokens").and_then(Value::as_u64).map(|v| v as u32),
        total_tokens: u.get("total_tokens").and_then(Value::as_u64).map(|v| v as u32),
        reasoning_tokens: u
            .get("completion_tokens_details")
            .and_then(|d| d.get("reasoning_tokens"))
            .and_then(Value::as_u64)
            .map(|v| v as u32),
        cache_creation_input_tokens: None,
        cache_read_input_tokens: u
            .get("prompt_tokens_details")
            .and_then(|d| d.get("cached_tokens"))
            .and_then(Value::as_u64)
            .map(|v| v as u32),
    }
}

fn parse_annotations(message: &Value, content: &mut Vec<Content>) {
    let Some(annotations) = message.get("annotations").and_then(Value::as_array) else {
        return;
    };
    for a in annotations {
        if a.get("type").and_then(Value::as_str) != Some("url_citation") {
            continue;
        }
        let Some(uc) = a.get("url_citation") else { continue };
        let url = uc.get("url").and_then(Value::as_str).unwrap_or_default().to_string();
        let title = uc.get("title").and_then(Value::as_str).map(str::to_string);
        content.push(Content::Source(Source::Url {
            id: uuid::Uuid::new_v4().to_string(),
            url,
            title,
        }));
    }
}

fn parse_response(body: &Value) -> Result<crate::types::Response> {
    let choice = body
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or(LlmError::EmptyResponseBody)?;
    let message = choice
        .get("message")
        .ok_or_else(|| LlmError::InvalidResponseData("response choice missing message".into()))?;

    let mut content = Vec::new();
    if let Some(text) = message.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            content.push(Content::text(text));
        }
    }
    if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
        for tc in tool_calls {
            let id = tc.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
            let func = tc.get("function");
            let name = func.and_then(|f| f.get("name")).and_then(Value::as_str).unwrap_or_default().to_string();
            let args_str = func.and_then(|f| f.get("arguments")).and_then(Value::as_str).unwrap_or("{}");
            let input: Value = serde_json::from_str(args_str).unwrap_or_else(|_| json!({}));
            content.push(Content::tool_call(id, name, input));
        }
    }
    parse_annotations(message, &mut content);

    let finish_reason = map_finish_reason(choice.get("finish_reason").and_then(Value::as_str));
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
struct ToolCallAccumulator {
    id: String,
    name: String,
    args: String,
    opened: bool,
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, call: Call) -> Result<crate::types::Response> {
        let mut warnings = Vec::new();
        let body = build_request_body(&self.model, &call, &mut warnings);
        let url = format!("{}/chat/completions", self.config.base_url);
        let resp = self.http.post(&url).headers(self.build_headers()?).json(&body).send().await?;
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
        let mut body = build_request_body(&self.model, &call, &mut warnings);
        body["stream"] = json!(true);
        body["stream_options"] = json!({"include_usage": true});

        let url = format!("{}/chat/completions", self.config.base_url);
        let resp = self.http.post(&url).headers(self.build_headers()?).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(Self::map_error_response(resp).await);
        }

        let byte_stream = resp.bytes_stream().map(|r| r.map_err(LlmError::Http));
        let mut events = byte_stream.eventsource();

        let stream = async_stream::stream! {
            if !warnings.is_empty() {
                yield Ok(StreamPart::Warnings(warnings));
            }

            let text_id = "0".to_string();
            let mut text_open = false;
            let mut tool_states: BTreeMap<usize, ToolCallAccumulator> = BTreeMap::new();
            let mut usage = Usage::default();
            let mut finish_reason = FinishReason::Unknown;

            'outer: while let Some(event) = events.next().await {
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
                if event.data.trim() == "[DONE]" {
                    break;
                }
                let parsed: Value = match serde_json::from_str(&event.data) {
                    Ok(v) => v,
                    Err(e) => {
                        yield Ok(StreamPart::Error(LlmError::JsonParse(e.to_string())));
                        return;
                    }
                };
                if let Some(u) = parsed.get("usage") {
                    usage = parse_usage(u);
                }
                let Some(choice) = parsed.get("choices").and_then(|c| c.get(0)) else { continue };
                if let Some(delta) = choice.get("delta") {
                    if let Some(content) = delta.get("content").and_then(Value::as_str) {
                        if !content.is_empty() {
                            if !text_open {
                                yield Ok(StreamPart::TextStart { id: text_id.clone() });
                                text_open = true;
                            }
                            yield Ok(StreamPart::TextDelta { id: text_id.clone(), delta: content.to_string() });
                        }
                    }
                    if let Some(tcs) = delta.get("tool_calls").and_then(Value::as_array) {
                        for tc in tcs {
                            let index = tc.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                            let entry = tool_states.entry(index).or_default();
                            if let Some(id) = tc.get("id").and_then(Value::as_str) {
                                entry.id = id.to_string();
                            }
                            let func = tc.get("function");
                            if let Some(name) = func.and_then(|f| f.get("name")).and_then(Value::as_str) {
                                entry.name = name.to_string();
                            }
                            if let Some(args) = func.and_then(|f| f.get("arguments")).and_then(Value::as_str) {
                                if !entry.opened {
                                    yield Ok(StreamPart::ToolInputStart { id: entry.id.clone(), tool_name: entry.name.clone() });
                                    entry.opened = true;
                                }
                                entry.args.push_str(args);
                                yield Ok(StreamPart::ToolInputDelta { id: entry.id.clone(), delta: args.to_string() });
                            }
                        }
                    }
                }
                if let Some(fr) = choice.get("finish_reason").and_then(Value::as_str) {
                    finish_reason = map_finish_reason(Some(fr));
                }
                continue 'outer;
            }

            if text_open {
                yield Ok(StreamPart::TextEnd { id: text_id });
            }
            for (_, state) in tool_states {
                if !state.opened {
                    continue;
                }
                yield Ok(StreamPart::ToolInputEnd { id: state.id.clone() });
                let input: Value = serde_json::from_str(&state.args).unwrap_or_else(|_| json!({}));
                yield Ok(StreamPart::ToolCall { id: state.id, tool_name: state.name, input });
            }
            yield Ok(StreamPart::Finish { usage, finish_reason });
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, Prompt, Tool, ToolChoice};

    #[test]
    fn reasoning_model_detection() {
        assert!(is_reasoning_model("o1-preview"));
        assert!(is_reasoning_model("o3-mini"));
        assert!(is_reasoning_model("gpt-5-turbo"));
        assert!(!is_reasoning_model("gpt-4o"));
        assert!(!is_reasoning_model("omni-moderation"));
    }

    #[test]
    fn reasoning_model_drops_sampling_params_and_renames_max_tokens() {
        let mut warnings = Vec::new();
        let call = Call::new(vec![Message::user("hi")]).with_temperature(0.5).with_max_output_tokens(100);
        let body = build_request_body("o1-mini", &call, &mut warnings);
        assert!(body.get("temperature").is_none());
        assert_eq!(body["max_completion_tokens"], json!(100));
        assert!(body.get("max_tokens").is_none());
        assert!(warnings.iter().any(|w| matches!(w, CallWarning::UnsupportedSetting { setting, .. } if setting == "temperature")));
    }

    #[test]
    fn non_reasoning_model_keeps_sampling_params() {
        let mut warnings = Vec::new();
        let call = Call::new(vec![Message::user("hi")]).with_temperature(0.5).with_max_output_tokens(100);
        let body = build_request_body("gpt-4o", &call, &mut warnings);
        assert_eq!(body["temperature"], json!(0.5));
        assert_eq!(body["max_tokens"], json!(100));
        assert!(warnings.is_empty());
    }

    #[test]
    fn tool_choice_translation() {
        assert_eq!(convert_tool_choice(&ToolChoice::Auto), json!("auto"));
        assert_eq!(convert_tool_choice(&ToolChoice::None), json!("none"));
        assert_eq!(convert_tool_choice(&ToolChoice::Required), json!("required"));
        assert_eq!(
            convert_tool_choice(&ToolChoice::tool("search")),
            json!({"type": "function", "function": {"name": "search"}})
        );
    }

    #[test]
    fn assistant_message_with_tool_call_has_null_content() {
        let msg = Message::assistant(vec![crate::types::MessagePart::ToolCall {
            tool_call_id: "t1".into(),
            tool_name: "search".into(),
            input: json!({"q": "rust"}),
            provider_executed: false,
        }]);
        let mut warnings = Vec::new();
        let out = convert_assistant_message(&msg, &mut warnings);
        assert_eq!(out["content"], Value::Null);
        assert_eq!(out["tool_calls"][0]["function"]["name"], json!("search"));
    }

    #[test]
    fn tool_message_becomes_one_message_per_result() {
        let msg = Message::tool(vec![crate::types::MessagePart::ToolResult {
            tool_call_id: "t1".into(),
            output: crate::types::content::ToolResultOutput::Text { text: "42".into() },
            provider_metadata: None,
        }]);
        let out = convert_tool_message(&msg);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["tool_call_id"], json!("t1"));
        assert_eq!(out[0]["content"], json!("42"));
    }

    #[test]
    fn parses_choice_content_and_tool_calls() {
        let body = json!({
            "id": "chatcmpl-1",
            "choices": [{
                "message": {
                    "content": "hello",
                    "tool_calls": [{"id": "t1", "type": "function", "function": {"name": "search", "arguments": "{\"q\":\"x\"}"}}],
                },
                "finish_reason": "tool_calls",
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15},
        });
        let response = parse_response(&body).unwrap();
        assert_eq!(response.text(), "hello");
        assert!(response.has_tool_calls());
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.usage.total_tokens, Some(15));
    }

    #[test]
    fn full_text_prompt_serializes_as_string_content() {
        let prompt: Prompt = vec![Message::user("hello")];
        let mut warnings = Vec::new();
        let messages = convert_messages(&prompt, &mut warnings);
        assert_eq!(messages[0]["content"], json!("hello"));
    }

    #[test]
    fn dropped_provider_defined_tool_emits_warning() {
        let mut warnings = Vec::new();
        let tools = vec![Tool::provider_defined("openai.web_search", "web_search")];
        let converted = convert_tools(&tools, &mut warnings);
        assert!(converted.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn generate_parses_a_successful_response() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "chatcmpl-1",
                    "choices": [{
                        "message": {"content": "hi there"},
                        "finish_reason": "stop",
                    }],
                    "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5},
                })
                .to_string(),
            )
            .create_async()
            .await;

        let model = OpenAiModel::new("test-key", "gpt-4o").with_base_url(server.url());
        let call = Call::new(vec![Message::user("hi")]);
        let response = model.generate(call).await.unwrap();
        assert_eq!(response.text(), "hi there");
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.total_tokens, Some(5));
    }

    #[tokio::test]
    async fn generate_maps_rate_limit_status_to_retryable_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_header("retry-after", "2")
            .with_body(json!({"error": {"message": "rate limited"}}).to_string())
            .create_async()
            .await;

        let model = OpenAiModel::new("test-key", "gpt-4o").with_base_url(server.url());
        let call = Call::new(vec![Message::user("hi")]);
        let err = model.generate(call).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(err.retry_after_secs(), Some(2));
    }
}
