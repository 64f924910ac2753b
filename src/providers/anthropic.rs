//! Anthropic Messages API 适配器 — 处理 Anthropic 特有的请求/响应格式差异
//!
//! Anthropic messages adapter. Handles the key differences from the
//! OpenAI-compatible shape:
//! - System messages are a top-level `system` parameter, not part of `messages`.
//! - `max_tokens` is required, not optional.
//! - A dated `anthropic-version` protocol header accompanies every call.
//! - Streaming events are typed: `content_block_delta` carries `delta.text`,
//!   `message_stop` terminates the stream.
//! - Response text lives at `content[0].text`; usage reports
//!   `input_tokens`/`output_tokens`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::ErrorContext;
use crate::providers::ChatProvider;
use crate::stream::{sse_chunk_stream, FrameDecoder};
use crate::transport::Transport;
use crate::types::chunk::{ChatResponse, StreamChunk, Usage};
use crate::types::message::{Message, MessageRole};
use crate::types::model::ModelInfo;
use crate::types::request::ChatRequest;
use crate::{ChunkStream, Error, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    tag: String,
    base_url: String,
    api_key: Option<String>,
    transport: Transport,
}

impl fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("tag", &self.tag)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AnthropicProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            tag: config.tag().to_string(),
            base_url: config.effective_base_url()?,
            api_key: config.resolve_api_key()?,
            transport: Transport::new()?,
        })
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("anthropic-version", ANTHROPIC_VERSION.to_string())];
        if let Some(key) = &self.api_key {
            headers.push(("x-api-key", key.clone()));
        }
        headers
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let (system, messages) = split_system_messages(&request.messages);

        let mut body = json!({
            "model": request.native_model(&self.tag),
            "messages": messages,
            "max_tokens": request.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": stream,
        });

        if let Some(sys) = system {
            body["system"] = Value::String(sys);
        }
        let opts = &request.options;
        if let Some(t) = opts.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(p) = opts.top_p {
            body["top_p"] = json!(p);
        }
        if !opts.stop.is_empty() {
            body["stop_sequences"] = json!(opts.stop);
        }
        if !opts.tools.is_empty() {
            body["tools"] = Value::Array(
                opts.tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect(),
            );
        }
        body
    }
}

/// Extract system messages and conversation messages separately. The
/// messages API takes system text as a top-level param; multiple system
/// messages are joined with blank lines, preserving order.
pub(crate) fn split_system_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut conversation: Vec<Value> = Vec::new();

    for m in messages {
        match m.role {
            MessageRole::System => system_parts.push(&m.content),
            _ => conversation.push(json!({
                "role": m.role.as_str(),
                "content": m.content,
            })),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    (system, conversation)
}

pub(crate) fn parse_response(body: &Value) -> Result<ChatResponse> {
    let blocks = body.get("content").and_then(|c| c.as_array()).ok_or_else(|| {
        Error::parse_with_context(
            "response carries no content blocks",
            ErrorContext::new()
                .with_field_path("content")
                .with_source("anthropic_provider"),
        )
    })?;
    let content: String = blocks
        .iter()
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect();

    Ok(ChatResponse::new(content, parse_usage(body.get("usage"))))
}

pub(crate) fn parse_usage(usage: Option<&Value>) -> Usage {
    usage
        .map(|u| {
            Usage::new(
                u["input_tokens"].as_u64().unwrap_or(0),
                u["output_tokens"].as_u64().unwrap_or(0),
            )
        })
        .unwrap_or_default()
}

/// Payload semantics for messages-API SSE frames, dispatched on the `type`
/// field. Only `content_block_delta` carries text; `message_stop` is the
/// terminal event. Housekeeping events (`message_start`, `ping`,
/// `content_block_start`, ...) produce nothing.
#[derive(Debug)]
pub(crate) struct AnthropicFrameDecoder;

impl FrameDecoder for AnthropicFrameDecoder {
    fn decode_frame(&self, data: &str) -> Result<Option<StreamChunk>> {
        let v: Value = serde_json::from_str(data)?;
        match v.get("type").and_then(|t| t.as_str()).unwrap_or("") {
            "content_block_delta" => {
                if let Some(text) = v.pointer("/delta/text").and_then(|t| t.as_str()) {
                    if !text.is_empty() {
                        return Ok(Some(StreamChunk::delta(text)));
                    }
                }
                Ok(None)
            }
            "message_stop" => Ok(Some(StreamChunk::terminal())),
            "error" => Err(Error::parse_with_context(
                v.pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("stream error event")
                    .to_string(),
                ErrorContext::new().with_source("anthropic_provider"),
            )),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(request, false);
        let response = self
            .transport
            .post_json(&url, &self.headers(), &body)
            .await?;
        parse_response(&response)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(request, true);
        let bytes = self.transport.post_sse(&url, &self.headers(), &body).await?;
        Ok(sse_chunk_stream(bytes, Arc::new(AnthropicFrameDecoder)))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self.transport.get_json(&url, &self.headers()).await?;
        let data = response
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| {
                Error::parse_with_context(
                    "model listing carries no data array",
                    ErrorContext::new()
                        .with_field_path("data")
                        .with_source("anthropic_provider"),
                )
            })?;
        Ok(data
            .iter()
            .filter_map(|m| {
                let id = m.get("id").and_then(|id| id.as_str())?;
                let mut info = ModelInfo::new(&self.tag, id);
                if let Some(display) = m.get("display_name").and_then(|d| d.as_str()) {
                    info = info.with_display_name(display);
                }
                Some(info)
            })
            .collect())
    }
}
