//! OpenAI 兼容驱动 — 也覆盖聚合网关与本地运行时等同风格端点
//!
//! OpenAI-compatible chat-completions adapter. One implementation serves the
//! canonical API and every aggregator or local runtime that mirrors it; the
//! instances differ only in tag, base URL and credentials.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use async_trait::async_trait;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::ErrorContext;
use crate::providers::ChatProvider;
use crate::stream::{sse_chunk_stream, FrameDecoder};
use crate::transport::Transport;
use crate::types::chunk::{ChatResponse, StreamChunk, Usage};
use crate::types::model::ModelInfo;
use crate::types::request::{ChatRequest, ToolDefinition};
use crate::{ChunkStream, Error, Result};

/// Model families that renamed the token-limit parameter. Total over
/// arbitrary strings: anything unmatched takes the classic name.
static REASONING_FAMILY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(o[134])(-|$)|^gpt-5").expect("valid built-in pattern"));

/// Select the token-limit parameter name for a model. Pure and total: every
/// input, including the empty string, maps to one of the two names.
pub fn token_limit_param(model: &str) -> &'static str {
    if REASONING_FAMILY.is_match(model) {
        "max_completion_tokens"
    } else {
        "max_tokens"
    }
}

pub struct OpenAiProvider {
    tag: String,
    kind: ProviderKind,
    base_url: String,
    api_key: Option<String>,
    transport: Transport,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Credentials stay out of Debug output.
        f.debug_struct("OpenAiProvider")
            .field("tag", &self.tag)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            tag: config.tag().to_string(),
            kind: config.kind,
            base_url: config.effective_base_url()?,
            api_key: config.resolve_api_key()?,
            transport: Transport::new()?,
        })
    }

    fn auth_headers(&self) -> Vec<(&'static str, String)> {
        match &self.api_key {
            Some(key) => vec![("authorization", format!("Bearer {}", key))],
            None => Vec::new(),
        }
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let model = request.native_model(&self.tag);
        let mut body = json!({
            "model": model,
            "messages": request.messages,
            "stream": stream,
        });

        let opts = &request.options;
        if let Some(t) = opts.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(limit) = opts.max_tokens {
            body[token_limit_param(model)] = json!(limit);
        }
        if let Some(p) = opts.top_p {
            body["top_p"] = json!(p);
        }
        if let Some(fp) = opts.frequency_penalty {
            body["frequency_penalty"] = json!(fp);
        }
        if let Some(pp) = opts.presence_penalty {
            body["presence_penalty"] = json!(pp);
        }
        if !opts.stop.is_empty() {
            body["stop"] = json!(opts.stop);
        }
        if !opts.tools.is_empty() {
            body["tools"] = Value::Array(opts.tools.iter().map(wire_tool).collect());
        }
        if let Some(tc) = &opts.tool_choice {
            body["tool_choice"] = tc.clone();
        }
        if let Some(seed) = opts.seed {
            body["seed"] = json!(seed);
        }
        if let Some(rf) = &opts.response_format {
            body["response_format"] = rf.clone();
        }
        body
    }
}

fn wire_tool(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": tool,
    })
}

/// Parse a complete chat-completions response body.
pub(crate) fn parse_response(body: &Value) -> Result<ChatResponse> {
    let choice = body.pointer("/choices/0").ok_or_else(|| {
        Error::parse_with_context(
            "response carries no choices",
            ErrorContext::new()
                .with_field_path("choices/0")
                .with_source("openai_provider"),
        )
    })?;
    let content = choice
        .pointer("/message/content")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    Ok(ChatResponse::new(content, parse_usage(body.get("usage"))))
}

pub(crate) fn parse_usage(usage: Option<&Value>) -> Usage {
    usage
        .map(|u| Usage {
            prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0),
            total_tokens: u["total_tokens"].as_u64().unwrap_or(0),
        })
        .unwrap_or_default()
}

/// Payload semantics for chat-completions SSE frames. Content rides in
/// `choices[0].delta.content`; frames carrying only housekeeping (role
/// announcements, finish_reason) produce nothing, and the shared parser's
/// `[DONE]` handling supplies the terminal chunk.
#[derive(Debug)]
pub(crate) struct OpenAiFrameDecoder;

impl FrameDecoder for OpenAiFrameDecoder {
    fn decode_frame(&self, data: &str) -> Result<Option<StreamChunk>> {
        let v: Value = serde_json::from_str(data)?;
        if let Some(content) = v.pointer("/choices/0/delta/content").and_then(|c| c.as_str()) {
            if !content.is_empty() {
                return Ok(Some(StreamChunk::delta(content)));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(request, false);
        let response = self
            .transport
            .post_json(&url, &self.auth_headers(), &body)
            .await?;
        parse_response(&response)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(request, true);
        let bytes = self
            .transport
            .post_sse(&url, &self.auth_headers(), &body)
            .await?;
        Ok(sse_chunk_stream(bytes, Arc::new(OpenAiFrameDecoder)))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/models", self.base_url);
        let response = self.transport.get_json(&url, &self.auth_headers()).await?;
        let data = response
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| {
                Error::parse_with_context(
                    "model listing carries no data array",
                    ErrorContext::new()
                        .with_field_path("data")
                        .with_source("openai_provider"),
                )
            })?;
        Ok(data
            .iter()
            .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
            .map(|id| ModelInfo::new(&self.tag, id))
            .collect())
    }
}
