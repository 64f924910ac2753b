//! Model metadata, capability tags and identifier handling

use serde::{Deserialize, Serialize};

/// Split a model identifier into `(provider_prefix, bare_name)` on the first
/// colon. Identifiers without a colon have no prefix. The split is purely
/// mechanical; whether the prefix names a configured provider is decided by
/// the registry.
pub fn split_model_id(id: &str) -> (Option<&str>, &str) {
    match id.split_once(':') {
        Some((prefix, rest)) if !prefix.is_empty() && !rest.is_empty() => (Some(prefix), rest),
        _ => (None, id),
    }
}

/// Closed set of capability tags attached to catalog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Chat,
    Streaming,
    Vision,
    Audio,
    Reasoning,
    Embedding,
    Tools,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Chat => "chat",
            Capability::Streaming => "streaming",
            Capability::Vision => "vision",
            Capability::Audio => "audio",
            Capability::Reasoning => "reasoning",
            Capability::Embedding => "embedding",
            Capability::Tools => "tools",
        }
    }
}

/// Downstream execution technology behind a hub deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineKind {
    #[serde(rename = "azure-openai")]
    AzureOpenAi,
    #[serde(rename = "aws-bedrock")]
    AwsBedrock,
    #[serde(rename = "gcp-vertexai")]
    GcpVertexAi,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::AzureOpenAi => "azure-openai",
            EngineKind::AwsBedrock => "aws-bedrock",
            EngineKind::GcpVertexAi => "gcp-vertexai",
        }
    }
}

/// One catalog entry. The deployment fields are populated by the hub
/// provider only; plain HTTP and subprocess providers leave them unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Provider-prefixed identifier (`"openai:gpt-4o-mini"`).
    pub id: String,
    pub display_name: String,
    /// Tag of the provider instance serving this model.
    pub provider: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl ModelInfo {
    pub fn new(provider: impl Into<String>, bare_name: impl Into<String>) -> Self {
        let provider = provider.into();
        let bare_name = bare_name.into();
        Self {
            id: format!("{}:{}", provider, bare_name),
            display_name: bare_name,
            provider,
            capabilities: Vec::new(),
            enabled: true,
            deployment_id: None,
            deployment_url: None,
            engine: None,
            status: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_deployment(
        mut self,
        deployment_id: impl Into<String>,
        deployment_url: impl Into<String>,
        engine: EngineKind,
        status: impl Into<String>,
    ) -> Self {
        self.deployment_id = Some(deployment_id.into());
        self.deployment_url = Some(deployment_url.into());
        self.engine = Some(engine);
        self.status = Some(status.into());
        self
    }

    /// Identifier with the provider prefix removed.
    pub fn bare_name(&self) -> &str {
        split_model_id(&self.id).1
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}
