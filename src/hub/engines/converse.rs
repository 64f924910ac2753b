//! Unified converse translator for gcp-vertexai and unrecognized deployments.
//!
//! The converse body is the most schema-tolerant of the three downstream
//! shapes, which is why unrecognized executables land here.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ErrorContext;
use crate::hub::resolver::Deployment;
use crate::stream::{sse_chunk_stream, FrameDecoder};
use crate::transport::Transport;
use crate::types::chunk::{ChatResponse, StreamChunk, Usage};
use crate::types::message::MessageRole;
use crate::types::model::EngineKind;
use crate::types::request::ChatRequest;
use crate::{ChunkStream, Error, Result};

#[derive(Debug)]
pub struct ConverseEngine;

impl ConverseEngine {
    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut system: Vec<Value> = Vec::new();
        let mut messages: Vec<Value> = Vec::new();
        for m in &request.messages {
            match m.role {
                MessageRole::System => system.push(json!({"text": m.content})),
                _ => messages.push(json!({
                    "role": m.role.as_str(),
                    "content": [{"text": m.content}],
                })),
            }
        }

        let mut body = json!({ "messages": messages });
        if !system.is_empty() {
            body["system"] = json!(system);
        }

        let mut inference: Vec<(&str, Value)> = Vec::new();
        if let Some(max_tokens) = request.options.max_tokens {
            inference.push(("maxTokens", json!(max_tokens)));
        }
        if let Some(temperature) = request.options.temperature {
            inference.push(("temperature", json!(temperature)));
        }
        if let Some(top_p) = request.options.top_p {
            inference.push(("topP", json!(top_p)));
        }
        if !request.options.stop.is_empty() {
            inference.push(("stopSequences", json!(request.options.stop)));
        }
        if !inference.is_empty() {
            let mut config = json!({});
            for (key, value) in inference {
                config[key] = value;
            }
            body["inferenceConfig"] = config;
        }
        body
    }
}

pub(crate) fn parse_response(body: &Value) -> Result<ChatResponse> {
    let blocks = body
        .pointer("/output/message/content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| {
            Error::parse_with_context(
                "converse response carries no output message",
                ErrorContext::new()
                    .with_field_path("output/message/content")
                    .with_source("converse_engine"),
            )
        })?;
    let content: String = blocks
        .iter()
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect();

    let usage = body
        .get("usage")
        .map(|u| Usage {
            prompt_tokens: u["inputTokens"].as_u64().unwrap_or(0),
            completion_tokens: u["outputTokens"].as_u64().unwrap_or(0),
            total_tokens: u["totalTokens"].as_u64().unwrap_or(0),
        })
        .unwrap_or_default();

    Ok(ChatResponse::new(content, usage))
}

/// Payload semantics for converse stream events. Text rides in
/// `contentBlockDelta.delta.text` (or a flattened `delta.text`); a
/// `messageStop` event or bare `stopReason` terminates the stream.
#[derive(Debug)]
pub(crate) struct ConverseFrameDecoder;

impl FrameDecoder for ConverseFrameDecoder {
    fn decode_frame(&self, data: &str) -> Result<Option<StreamChunk>> {
        let v: Value = serde_json::from_str(data)?;
        if let Some(text) = v
            .pointer("/contentBlockDelta/delta/text")
            .or_else(|| v.pointer("/delta/text"))
            .and_then(|t| t.as_str())
        {
            if !text.is_empty() {
                return Ok(Some(StreamChunk::delta(text)));
            }
            return Ok(None);
        }
        if v.get("messageStop").is_some() || v.get("stopReason").is_some() {
            return Ok(Some(StreamChunk::terminal()));
        }
        Ok(None)
    }
}

#[async_trait]
impl super::EngineAdapter for ConverseEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::GcpVertexAi
    }

    async fn chat(
        &self,
        transport: &Transport,
        headers: &[(&str, String)],
        deployment: &Deployment,
        request: &ChatRequest,
    ) -> Result<ChatResponse> {
        let url = format!("{}/converse", deployment.url);
        let body = self.build_body(request);
        let response = transport.post_json(&url, headers, &body).await?;
        parse_response(&response)
    }

    async fn chat_stream(
        &self,
        transport: &Transport,
        headers: &[(&str, String)],
        deployment: &Deployment,
        request: &ChatRequest,
    ) -> Result<ChunkStream> {
        let url = format!("{}/converse-stream", deployment.url);
        let body = self.build_body(request);
        let bytes = transport.post_sse(&url, headers, &body).await?;
        Ok(sse_chunk_stream(bytes, Arc::new(ConverseFrameDecoder)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::message::Message;
    use serde_json::json;

    #[test]
    fn test_body_splits_system_and_inference_config() {
        let request = ChatRequest::new(
            "hub:claude-3-haiku",
            vec![Message::system("Be terse."), Message::user("Hi")],
        )
        .with_temperature(0.2)
        .with_max_tokens(128);
        let body = ConverseEngine.build_body(&request);
        assert_eq!(body["system"][0]["text"], "Be terse.");
        assert_eq!(body["messages"][0]["content"][0]["text"], "Hi");
        assert_eq!(body["inferenceConfig"]["maxTokens"], 128);
        assert_eq!(body["inferenceConfig"]["temperature"], 0.2);
    }

    #[test]
    fn test_body_omits_empty_inference_config() {
        let request = ChatRequest::new("hub:claude-3-haiku", vec![Message::user("Hi")]);
        let body = ConverseEngine.build_body(&request);
        assert!(body.get("inferenceConfig").is_none());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_parse_response_reads_output_message() {
        let body = json!({
            "output": {"message": {"role": "assistant", "content": [{"text": "hel"}, {"text": "lo"}]}},
            "usage": {"inputTokens": 3, "outputTokens": 5, "totalTokens": 8},
            "stopReason": "end_turn"
        });
        let response = parse_response(&body).unwrap();
        assert_eq!(response.content, "hello");
        assert_eq!(response.usage.total_tokens, 8);
    }

    #[test]
    fn test_parse_response_without_output_fails() {
        assert!(parse_response(&json!({"usage": {}})).is_err());
    }

    #[test]
    fn test_frame_decoder_delta_and_stop() {
        let decoder = ConverseFrameDecoder;
        let chunk = decoder
            .decode_frame(r#"{"contentBlockDelta":{"delta":{"text":"A"},"contentBlockIndex":0}}"#)
            .unwrap();
        assert_eq!(chunk, Some(StreamChunk::delta("A")));

        let chunk = decoder.decode_frame(r#"{"delta":{"text":"B"}}"#).unwrap();
        assert_eq!(chunk, Some(StreamChunk::delta("B")));

        let stop = decoder
            .decode_frame(r#"{"messageStop":{"stopReason":"end_turn"}}"#)
            .unwrap();
        assert_eq!(stop, Some(StreamChunk::terminal()));
    }

    #[test]
    fn test_frame_decoder_ignores_metadata_events() {
        let decoder = ConverseFrameDecoder;
        let chunk = decoder
            .decode_frame(r#"{"metadata":{"usage":{"inputTokens":3}}}"#)
            .unwrap();
        assert_eq!(chunk, None);
    }
}
