//! # llm-conduit
//!
//! 这是一个统一的 LLM 聊天补全客户端，将 HTTP、CLI 与托管枢纽后端收敛到同一个流式接口。
//!
//! Unified chat-completion client for LLM backends - HTTP APIs, locally
//! installed CLI tools and managed multi-engine hubs behind one streaming
//! interface.
//!
//! ## Overview
//!
//! This library normalizes one chat-completion request shape across wildly
//! different upstreams: OpenAI-compatible HTTP endpoints (including
//! aggregators), the Anthropic messages API, the Gemini generateContent API,
//! subprocess CLI tools speaking line-delimited output, and a deployment hub
//! that fronts several execution engines behind a resolver and TTL cache.
//! Callers see a single response type or a single incremental chunk stream,
//! regardless of which backend served the call.
//!
//! ## Core Philosophy
//!
//! - **Provider-Agnostic**: one [`ChatRequest`] in, one [`ChatResponse`] or
//!   chunk stream out, for every backend
//! - **Streaming-First**: one shared Server-Sent Events frame parser, shaped
//!   per backend by a small decoder seam
//! - **Explicit Construction**: providers live in a [`ProviderRegistry`]
//!   value the caller assembles; there is no ambient global state
//! - **Type-Safe**: strongly typed requests, chunks and errors; recoverable
//!   stream noise is logged, never surfaced as failure
//!
//! ## Key Features
//!
//! - **Unified Providers**: [`ChatProvider`] implementations for
//!   OpenAI-compatible, Anthropic, Gemini, subprocess and hub backends
//! - **Frame Parsing**: fragmentation-proof SSE decoding via [`stream`]
//! - **Deployment Resolution**: hub model-to-deployment lookup with TTL
//!   caching and health re-checks via [`hub`]
//! - **Model Catalog**: layered model listing (cache, persisted, live,
//!   defaults) with capability inference via [`catalog`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use llm_conduit::{ChatRequest, Message, ProviderConfig, ProviderKind, ProviderRegistry};
//!
//! #[tokio::main]
//! async fn main() -> llm_conduit::Result<()> {
//!     let registry = ProviderRegistry::builder()
//!         .provider(ProviderConfig::new(ProviderKind::OpenAi).with_api_key("sk-..."))
//!         .build()?;
//!
//!     let request = ChatRequest::new(
//!         "openai:gpt-4o-mini",
//!         vec![Message::user("Hello, how are you?")],
//!     );
//!
//!     let response = registry.chat(&request).await?;
//!     println!("{}", response.content);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Core type definitions (messages, requests, chunks, models) |
//! | [`config`] | Provider configuration and credential resolution |
//! | [`stream`] | Incremental streaming frame parser and decoder seam |
//! | [`transport`] | Shared HTTP client plumbing |
//! | [`providers`] | Backend adapters (OpenAI-compatible, Anthropic, Gemini, subprocess) |
//! | [`hub`] | Multi-engine deployment broker with resolver and TTL cache |
//! | [`catalog`] | Layered model catalog with capability inference |
//! | [`registry`] | Explicit provider registry and request routing |

pub mod catalog;
pub mod config;
pub mod hub;
pub mod providers;
pub mod registry;
pub mod stream;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use catalog::ModelCatalog;
pub use config::{HubAuthConfig, ProviderConfig, ProviderKind, RegistryConfig};
pub use providers::{create_provider, ChatProvider};
pub use registry::{ProviderRegistry, RegistryBuilder};
pub use types::{
    chunk::{ChatResponse, StreamChunk, Usage},
    message::{Message, MessageRole},
    model::{Capability, ModelInfo},
    request::{ChatOptions, ChatRequest},
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream of chunk results, as returned by
/// [`ChatProvider::chat_stream`]. The stream yields zero or more non-terminal
/// chunks followed by exactly one terminal chunk, then ends.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
