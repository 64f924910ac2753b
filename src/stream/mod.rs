//! 流式解析模块：一个共享的增量 SSE 帧解析状态机，按后端以解码器定制语义。
//!
//! # Streaming Module
//!
//! One incremental frame parser shared by every HTTP-streaming adapter.
//! The parser owns framing (buffering across arbitrary fragment boundaries,
//! `data: ` prefix handling, the `[DONE]` sentinel, terminal synthesis);
//! backends plug in a [`FrameDecoder`] that understands their payload shape
//! and nothing else.
//!
//! Guarantees, independent of how the transport fragments the bytes:
//!
//! - every stream yields exactly one chunk with `done = true`, always last;
//! - lines without the framing prefix are never forwarded;
//! - a malformed frame is logged and skipped, never fatal;
//! - transport EOF without a terminal signal synthesizes one.

use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use crate::types::chunk::StreamChunk;
use crate::Result;

mod sse;

pub use sse::sse_chunk_stream;

/// Raw byte fragments as produced by the transport layer.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Backend-specific payload decoding plugged into the shared parser.
///
/// `data` is one framed payload with the prefix already stripped. Returning
/// `Ok(None)` skips the frame (housekeeping events, contentless deltas);
/// returning a chunk with `done = true` terminates the stream. Errors are
/// recovered by the parser: the frame is dropped and parsing continues.
pub trait FrameDecoder: Send + Sync {
    fn decode_frame(&self, data: &str) -> Result<Option<StreamChunk>>;
}
