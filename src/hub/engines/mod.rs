//! 引擎翻译层：按解析出的引擎类型选择下游请求/响应形状。
//!
//! Per-engine request/response translation behind the hub. Structurally each
//! translator mirrors a standalone HTTP adapter, but selection happens at
//! runtime from the resolved [`EngineKind`] rather than at construction
//! time.
//!
//! | Engine | Endpoint | Body shape |
//! |--------|----------|-----------|
//! | `azure-openai` | `{url}/chat/completions?api-version=…` | chat-completions |
//! | `aws-bedrock` | `{url}/invoke` | Anthropic-native, `anthropic_version` pinned |
//! | `gcp-vertexai` | `{url}/converse` | unified converse, `inferenceConfig` |

pub mod anthropic;
pub mod converse;
pub mod openai;

use std::fmt;

use async_trait::async_trait;

use crate::hub::resolver::Deployment;
use crate::transport::Transport;
use crate::types::chunk::ChatResponse;
use crate::types::model::EngineKind;
use crate::types::request::ChatRequest;
use crate::{ChunkStream, Result};

/// One downstream translation. `headers` already carry the hub bearer token
/// and resource-group header; the deployment supplies the address.
#[async_trait]
pub trait EngineAdapter: Send + Sync + fmt::Debug {
    fn kind(&self) -> EngineKind;

    async fn chat(
        &self,
        transport: &Transport,
        headers: &[(&str, String)],
        deployment: &Deployment,
        request: &ChatRequest,
    ) -> Result<ChatResponse>;

    async fn chat_stream(
        &self,
        transport: &Transport,
        headers: &[(&str, String)],
        deployment: &Deployment,
        request: &ChatRequest,
    ) -> Result<ChunkStream>;
}

/// Translator for a resolved engine kind. The set is closed; adapters are
/// stateless units.
pub fn engine_for(kind: EngineKind) -> &'static dyn EngineAdapter {
    match kind {
        EngineKind::AzureOpenAi => &openai::ChatCompletionsEngine,
        EngineKind::AwsBedrock => &anthropic::InvokeEngine,
        EngineKind::GcpVertexAi => &converse::ConverseEngine,
    }
}
