//! Gemini generateContent 适配器 — 处理 Gemini 特有的请求/响应格式差异
//!
//! Gemini generateContent adapter. Key differences from the other HTTP
//! backends:
//! - Roles are `user` and `model` (not `assistant`); system text rides in a
//!   top-level `system_instruction` field.
//! - Sampling parameters live under `generationConfig`
//!   (`maxOutputTokens`, `topP`, `stopSequences`).
//! - Response text lives at `candidates[0].content.parts[0].text`; usage in
//!   `usageMetadata`.
//! - The API key is a `?key=` query parameter, not a header.
//! - Streaming uses `:streamGenerateContent?alt=sse`, sharing the common
//!   SSE frame parser; there is no `[DONE]` sentinel, so the terminal chunk
//!   comes from end-of-stream synthesis.

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

pub struct GeminiProvider {
    tag: String,
    base_url: String,
    api_key: String,
    transport: Transport,
}

impl fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("tag", &self.tag)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            tag: config.tag().to_string(),
            base_url: config.effective_base_url()?,
            // resolve_api_key fails fast for this kind, so the key is present.
            api_key: config.resolve_api_key()?.unwrap_or_default(),
            transport: Transport::new()?,
        })
    }

    fn generate_url(&self, model: &str, stream: bool) -> String {
        if stream {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse&key={}",
                self.base_url, model, self.api_key
            )
        } else {
            format!(
                "{}/models/{}:generateContent?key={}",
                self.base_url, model, self.api_key
            )
        }
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let (system_instruction, contents) = split_messages(&request.messages);

        let mut body = json!({ "contents": contents });
        if let Some(sys) = system_instruction {
            body["system_instruction"] = sys;
        }

        let opts = &request.options;
        let mut gen_config = json!({});
        if let Some(t) = opts.temperature {
            gen_config["temperature"] = json!(t);
        }
        if let Some(limit) = opts.max_tokens {
            gen_config["maxOutputTokens"] = json!(limit);
        }
        if let Some(p) = opts.top_p {
            gen_config["topP"] = json!(p);
        }
        if !opts.stop.is_empty() {
            gen_config["stopSequences"] = json!(opts.stop);
        }
        if !gen_config.as_object().map_or(true, |o| o.is_empty()) {
            body["generationConfig"] = gen_config;
        }
        body
    }
}

/// Map the unified message list to Gemini `contents`. System messages lift
/// into the top-level instruction; assistant turns become role `model`.
pub(crate) fn split_messages(messages: &[Message]) -> (Option<Value>, Vec<Value>) {
    let mut system_parts: Vec<Value> = Vec::new();
    let mut contents: Vec<Value> = Vec::new();

    for m in messages {
        match m.role {
            MessageRole::System => system_parts.push(json!({ "text": m.content })),
            _ => {
                let role = match m.role {
                    MessageRole::Assistant => "model",
                    _ => "user",
                };
                contents.push(json!({
                    "role": role,
                    "parts": [{ "text": m.content }],
                }));
            }
        }
    }

    let system_instruction = if system_parts.is_empty() {
        None
    } else {
        Some(json!({ "parts": system_parts }))
    };

    (system_instruction, contents)
}

pub(crate) fn parse_response(body: &Value) -> Result<ChatResponse> {
    let content = body
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            Error::parse_with_context(
                "response carries no candidate text",
                ErrorContext::new()
                    .with_field_path("candidates/0/content/parts/0/text")
                    .with_source("gemini_provider"),
            )
        })?;
    Ok(ChatResponse::new(
        content,
        parse_usage(body.get("usageMetadata")),
    ))
}

pub(crate) fn parse_usage(usage: Option<&Value>) -> Usage {
    usage
        .map(|u| Usage {
            prompt_tokens: u["promptTokenCount"].as_u64().unwrap_or(0),
            completion_tokens: u["candidatesTokenCount"].as_u64().unwrap_or(0),
            total_tokens: u["totalTokenCount"].as_u64().unwrap_or(0),
        })
        .unwrap_or_default()
}

/// Payload semantics for `streamGenerateContent?alt=sse` frames: each frame
/// is a full candidate envelope; frames that only carry a `finishReason`
/// produce nothing and the stream terminates at EOF.
#[derive(Debug)]
pub(crate) struct GeminiFrameDecoder;

impl FrameDecoder for GeminiFrameDecoder {
    fn decode_frame(&self, data: &str) -> Result<Option<StreamChunk>> {
        let v: Value = serde_json::from_str(data)?;
        if let Some(text) = v
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|t| t.as_str())
        {
            if !text.is_empty() {
                return Ok(Some(StreamChunk::delta(text)));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = self.generate_url(request.native_model(&self.tag), false);
        let body = self.build_body(request);
        let response = self.transport.post_json(&url, &[], &body).await?;
        parse_response(&response)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let url = self.generate_url(request.native_model(&self.tag), true);
        let body = self.build_body(request);
        let bytes = self.transport.post_sse(&url, &[], &body).await?;
        Ok(sse_chunk_stream(bytes, Arc::new(GeminiFrameDecoder)))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/models?key={}", self.base_url, self.api_key);
        let response = self.transport.get_json(&url, &[]).await?;
        let models = response
            .get("models")
            .and_then(|m| m.as_array())
            .ok_or_else(|| {
                Error::parse_with_context(
                    "model listing carries no models array",
                    ErrorContext::new()
                        .with_field_path("models")
                        .with_source("gemini_provider"),
                )
            })?;
        Ok(models
            .iter()
            .filter_map(|m| {
                let name = m.get("name").and_then(|n| n.as_str())?;
                let bare = name.strip_prefix("models/").unwrap_or(name);
                let mut info = ModelInfo::new(&self.tag, bare);
                if let Some(display) = m.get("displayName").and_then(|d| d.as_str()) {
                    info = info.with_display_name(display);
                }
                Some(info)
            })
            .collect())
    }
}
