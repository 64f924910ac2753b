//! Anthropic-native invoke translator for aws-bedrock deployments.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::hub::resolver::Deployment;
use crate::providers::anthropic::{parse_response, split_system_messages, AnthropicFrameDecoder};
use crate::stream::sse_chunk_stream;
use crate::transport::Transport;
use crate::types::chunk::ChatResponse;
use crate::types::message::MessageRole;
use crate::types::model::EngineKind;
use crate::types::request::ChatRequest;
use crate::{ChunkStream, Result};

/// Protocol version the invoke body must pin.
const BEDROCK_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// The invoke body requires an explicit token limit.
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug)]
pub struct InvokeEngine;

impl InvokeEngine {
    /// Anthropic-native body with typed content blocks. System messages are
    /// lifted into the top-level `system` field; the deployment pins the
    /// model so the body carries none.
    fn build_body(&self, request: &ChatRequest) -> Value {
        let (system, _) = split_system_messages(&request.messages);
        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| {
                json!({
                    "role": m.role.as_str(),
                    "content": [{"type": "text", "text": m.content}],
                })
            })
            .collect();

        let mut body = json!({
            "anthropic_version": BEDROCK_ANTHROPIC_VERSION,
            "max_tokens": request.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(temperature) = request.options.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.options.top_p {
            body["top_p"] = json!(top_p);
        }
        if !request.options.stop.is_empty() {
            body["stop_sequences"] = json!(request.options.stop);
        }
        body
    }
}

#[async_trait]
impl super::EngineAdapter for InvokeEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::AwsBedrock
    }

    async fn chat(
        &self,
        transport: &Transport,
        headers: &[(&str, String)],
        deployment: &Deployment,
        request: &ChatRequest,
    ) -> Result<ChatResponse> {
        let url = format!("{}/invoke", deployment.url);
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
        let url = format!("{}/invoke-with-response-stream", deployment.url);
        let body = self.build_body(request);
        let bytes = transport.post_sse(&url, headers, &body).await?;
        Ok(sse_chunk_stream(bytes, Arc::new(AnthropicFrameDecoder)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::message::Message;

    #[test]
    fn test_body_pins_protocol_version_and_token_limit() {
        let request = ChatRequest::new("hub:claude-3-sonnet", vec![Message::user("Hi")]);
        let body = InvokeEngine.build_body(&request);
        assert_eq!(body["anthropic_version"], "bedrock-2023-05-31");
        assert_eq!(body["max_tokens"], 4096);
        assert!(body.get("model").is_none());
        assert_eq!(body["messages"][0]["content"][0]["text"], "Hi");
    }

    #[test]
    fn test_body_lifts_system_into_top_level_field() {
        let request = ChatRequest::new(
            "hub:claude-3-sonnet",
            vec![Message::system("Be terse."), Message::user("Hi")],
        )
        .with_max_tokens(256);
        let body = InvokeEngine.build_body(&request);
        assert_eq!(body["system"], "Be terse.");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
