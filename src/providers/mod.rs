//! Provider 适配层 — 通过 trait 实现多后端聊天补全的动态分发
//!
//! Backend adapter layer implementing the provider contract. Uses
//! `Arc<dyn ChatProvider>` for runtime polymorphism, so the same calling code
//! works against OpenAI-compatible HTTP endpoints, the Anthropic and Gemini
//! APIs, subprocess CLI tools and the deployment hub.

pub mod anthropic;
pub mod command;
pub mod gemini;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt};

use crate::config::{ProviderConfig, ProviderKind};
use crate::types::chunk::{ChatResponse, StreamChunk, Usage};
use crate::types::model::ModelInfo;
use crate::types::request::ChatRequest;
use crate::{ChunkStream, Result};

pub use anthropic::AnthropicProvider;
pub use command::CommandProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// Core trait for backend-specific chat adaptation.
///
/// Each backend family has one concrete implementation. The trait is
/// object-safe and supports dynamic dispatch via `Arc<dyn ChatProvider>`.
/// Every call performs one outbound network call or one subprocess
/// invocation; providers keep no per-request state.
#[async_trait]
pub trait ChatProvider: Send + Sync + std::fmt::Debug {
    /// Instance tag, used as the model-id prefix in requests and catalogs.
    fn tag(&self) -> &str;

    /// Configured kind this provider was built from.
    fn kind(&self) -> ProviderKind;

    /// Execute a complete (non-streaming) chat request.
    ///
    /// A non-success upstream status fails with [`crate::Error::Backend`]
    /// carrying the status code and raw error body.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Execute a streaming chat request.
    ///
    /// The returned stream yields zero or more non-terminal chunks followed
    /// by exactly one terminal chunk, then ends. Dropping the stream cancels
    /// the request and releases the underlying reader or process.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream>;

    /// Live model listing, used by the catalog.
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
}

/// Factory function constructing the adapter named by a configuration.
///
/// Selection happens once, here, at construction time; there is no
/// per-request dispatch and no global registry behind it. Structural
/// validation and credential resolution run first, so a broken configuration
/// fails before any network call.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn ChatProvider>> {
    config.validate()?;
    match config.kind {
        ProviderKind::OpenAi | ProviderKind::Compatible => {
            Ok(Arc::new(OpenAiProvider::new(config)?))
        }
        ProviderKind::Anthropic => Ok(Arc::new(AnthropicProvider::new(config)?)),
        ProviderKind::Gemini => Ok(Arc::new(GeminiProvider::new(config)?)),
        ProviderKind::Command => Ok(Arc::new(CommandProvider::new(config)?)),
        ProviderKind::Hub => Ok(Arc::new(crate::hub::HubProvider::new(config)?)),
    }
}

/// Drain a chunk stream into a complete response.
///
/// Stops at the terminal chunk. Token usage is not reported by most
/// streaming framings, so it stays at zero.
pub async fn collect_stream(mut stream: ChunkStream) -> Result<ChatResponse> {
    let mut content = String::new();
    while let Some(item) = stream.next().await {
        let chunk = item?;
        if let Some(text) = &chunk.content {
            content.push_str(text);
        }
        if chunk.done {
            break;
        }
    }
    Ok(ChatResponse::new(content, Usage::default()))
}

/// Synthesize a stream from a complete response: one content chunk followed
/// by one terminal chunk. Used wherever a streaming surface is served by a
/// non-streaming call.
pub fn response_to_stream(response: ChatResponse) -> ChunkStream {
    let chunks = vec![
        Ok(StreamChunk::delta(response.content)),
        Ok(StreamChunk::terminal()),
    ];
    Box::pin(stream::iter(chunks))
}
