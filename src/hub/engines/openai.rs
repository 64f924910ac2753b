//! Chat-completions translator for azure-openai deployments.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::hub::resolver::Deployment;
use crate::providers::openai::{parse_response, token_limit_param, OpenAiFrameDecoder};
use crate::stream::sse_chunk_stream;
use crate::transport::Transport;
use crate::types::chunk::ChatResponse;
use crate::types::model::EngineKind;
use crate::types::request::ChatRequest;
use crate::{ChunkStream, Result};

/// API version pinned for every chat-completions deployment call.
const API_VERSION: &str = "2024-06-01";

#[derive(Debug)]
pub struct ChatCompletionsEngine;

impl ChatCompletionsEngine {
    fn url(&self, deployment: &Deployment) -> String {
        format!(
            "{}/chat/completions?api-version={}",
            deployment.url, API_VERSION
        )
    }

    /// The deployment pins the model, so the body carries no model field.
    /// The token-limit parameter name follows the deployment's advertised
    /// model family.
    fn build_body(&self, deployment: &Deployment, request: &ChatRequest, stream: bool) -> Value {
        let mut body = json!({
            "messages": request.messages,
        });
        if stream {
            body["stream"] = json!(true);
        }

        let options = &request.options;
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(limit) = options.max_tokens {
            body[token_limit_param(&deployment.model_name)] = json!(limit);
        }
        if let Some(top_p) = options.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(frequency_penalty) = options.frequency_penalty {
            body["frequency_penalty"] = json!(frequency_penalty);
        }
        if let Some(presence_penalty) = options.presence_penalty {
            body["presence_penalty"] = json!(presence_penalty);
        }
        if !options.stop.is_empty() {
            body["stop"] = json!(options.stop);
        }
        body
    }
}

#[async_trait]
impl super::EngineAdapter for ChatCompletionsEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::AzureOpenAi
    }

    async fn chat(
        &self,
        transport: &Transport,
        headers: &[(&str, String)],
        deployment: &Deployment,
        request: &ChatRequest,
    ) -> Result<ChatResponse> {
        let body = self.build_body(deployment, request, false);
        let response = transport
            .post_json(&self.url(deployment), headers, &body)
            .await?;
        parse_response(&response)
    }

    async fn chat_stream(
        &self,
        transport: &Transport,
        headers: &[(&str, String)],
        deployment: &Deployment,
        request: &ChatRequest,
    ) -> Result<ChunkStream> {
        let body = self.build_body(deployment, request, true);
        let bytes = transport
            .post_sse(&self.url(deployment), headers, &body)
            .await?;
        Ok(sse_chunk_stream(bytes, Arc::new(OpenAiFrameDecoder)))
    }
}
