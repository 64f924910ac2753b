//! Response and streaming chunk types

use serde::{Deserialize, Serialize};

/// A complete (non-streaming) chat-completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    pub fn new(content: impl Into<String>, usage: Usage) -> Self {
        Self {
            content: content.into(),
            usage,
        }
    }
}

/// Token accounting as reported by the backend; all zero when the backend
/// reports nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// One incremental delta from a streaming response.
///
/// Every stream delivers zero or more non-terminal chunks followed by exactly
/// one chunk with `done = true`, which is always the last. Chunks with no
/// content and `done = false` never reach the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub content: Option<String>,
    pub done: bool,
}

impl StreamChunk {
    /// A non-terminal content delta.
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            done: false,
        }
    }

    /// The terminal marker ending a stream.
    pub fn terminal() -> Self {
        Self {
            content: None,
            done: true,
        }
    }

    /// Content text, empty for terminal or contentless chunks.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// True when this chunk carries nothing to forward.
    pub fn is_empty(&self) -> bool {
        !self.done && self.content.as_deref().map_or(true, str::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_totals() {
        let usage = Usage::new(1, 1);
        assert_eq!(usage.total_tokens, 2);
        assert_eq!(Usage::default().total_tokens, 0);
    }

    #[test]
    fn test_chunk_constructors() {
        let delta = StreamChunk::delta("A");
        assert!(!delta.done);
        assert_eq!(delta.text(), "A");

        let terminal = StreamChunk::terminal();
        assert!(terminal.done);
        assert_eq!(terminal.text(), "");
        assert!(!terminal.is_empty());
    }

    #[test]
    fn test_contentless_non_terminal_is_empty() {
        let chunk = StreamChunk {
            content: None,
            done: false,
        };
        assert!(chunk.is_empty());
    }
}
