//! Normalized chat-completion request and sampling options

use serde::{Deserialize, Serialize};

use super::model::split_model_id;
use crate::types::message::Message;

/// A provider-agnostic chat-completion request.
///
/// The `model` field uses provider-prefixed identifiers
/// (`"openai:gpt-4o-mini"`, `"anthropic:claude-sonnet-4"`). Adapters strip
/// the prefix that names them before building the wire body; unprefixed
/// identifiers pass through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub options: ChatOptions,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            options: ChatOptions::default(),
        }
    }

    /// Provider prefix of the model identifier, when one is present.
    pub fn provider_tag(&self) -> Option<&str> {
        split_model_id(&self.model).0
    }

    /// Model identifier with any provider prefix removed.
    pub fn bare_model(&self) -> &str {
        split_model_id(&self.model).1
    }

    /// The model name an adapter tagged `tag` should put on the wire: the
    /// prefix is stripped only when it names that adapter, otherwise the
    /// identifier is passed through whole.
    pub fn native_model(&self, tag: &str) -> &str {
        match split_model_id(&self.model) {
            (Some(prefix), bare) if prefix.eq_ignore_ascii_case(tag) => bare,
            _ => self.model.as_str(),
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.options.top_p = Some(top_p);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.options.stop = stop;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.options.tools = tools;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.options.seed = Some(seed);
        self
    }
}

/// Optional sampling and tool parameters. Every field is optional; adapters
/// forward only what the target wire format supports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

/// Tool definition passed through to backends that support function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_model_split() {
        let req = ChatRequest::new("openai:gpt-4o", vec![Message::user("hi")]);
        assert_eq!(req.provider_tag(), Some("openai"));
        assert_eq!(req.bare_model(), "gpt-4o");
        assert_eq!(req.native_model("openai"), "gpt-4o");
    }

    #[test]
    fn test_unprefixed_model_passes_through() {
        let req = ChatRequest::new("gpt-4o", vec![]);
        assert_eq!(req.provider_tag(), None);
        assert_eq!(req.native_model("openai"), "gpt-4o");
    }

    #[test]
    fn test_foreign_prefix_is_not_stripped() {
        // A prefix naming a different adapter is part of the model id as far
        // as this adapter is concerned.
        let req = ChatRequest::new("groq:llama-3.1-70b", vec![]);
        assert_eq!(req.native_model("openai"), "groq:llama-3.1-70b");
        assert_eq!(req.native_model("groq"), "llama-3.1-70b");
    }

    #[test]
    fn test_colon_inside_bare_name_survives() {
        let req = ChatRequest::new("local:llama3:8b", vec![]);
        assert_eq!(req.provider_tag(), Some("local"));
        assert_eq!(req.native_model("local"), "llama3:8b");
    }

    #[test]
    fn test_builder_options() {
        let req = ChatRequest::new("openai:gpt-4o", vec![])
            .with_temperature(0.1)
            .with_max_tokens(256)
            .with_stop(vec!["\n\n".to_string()]);
        assert_eq!(req.options.temperature, Some(0.1));
        assert_eq!(req.options.max_tokens, Some(256));
        assert_eq!(req.options.stop.len(), 1);
    }
}
