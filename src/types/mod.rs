//! 类型系统模块：定义跨后端统一的聊天补全核心数据类型。
//!
//! # Types Module
//!
//! This module defines the normalized type system shared by every backend
//! adapter: one request shape in, one response or chunk shape out.
//!
//! ## Overview
//!
//! The type system ensures:
//! - Type-safe message and request construction
//! - One chunk representation for all streaming framings
//! - Provider-prefixed model identifiers with deterministic splitting
//! - Serialization compatibility with the configuration file format
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Chat message with role and content |
//! | [`MessageRole`] | Message role (system, user, assistant) |
//! | [`ChatRequest`] | Normalized chat-completion request |
//! | [`ChatOptions`] | Optional sampling and tool parameters |
//! | [`StreamChunk`] | One incremental streaming delta |
//! | [`ModelInfo`] | Catalog entry with capability tags |
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`message`] | Message and role types |
//! | [`request`] | Request, options and tool definition types |
//! | [`chunk`] | Response, usage and streaming chunk types |
//! | [`model`] | Model metadata and capability types |
//!
//! ## Example
//!
//! ```rust
//! use llm_conduit::types::{ChatRequest, Message};
//!
//! let request = ChatRequest::new(
//!     "anthropic:claude-sonnet-4",
//!     vec![
//!         Message::system("You are a helpful assistant"),
//!         Message::user("What's the weather?"),
//!     ],
//! )
//! .with_temperature(0.2)
//! .with_max_tokens(512);
//!
//! assert_eq!(request.provider_tag(), Some("anthropic"));
//! assert_eq!(request.bare_model(), "claude-sonnet-4");
//! ```

pub mod chunk;
pub mod message;
pub mod model;
pub mod request;

pub use chunk::{ChatResponse, StreamChunk, Usage};
pub use message::{Message, MessageRole};
pub use model::{split_model_id, Capability, EngineKind, ModelInfo};
pub use request::{ChatOptions, ChatRequest, ToolDefinition};
