//! 提供商注册表 — 显式装配的路由入口，不依赖任何全局单例。
//!
//! Explicitly constructed registry of provider instances. The caller
//! assembles it (from code or a YAML file) and owns it; nothing in the crate
//! relies on ambient global state.
//!
//! Model identifiers route as follows:
//!
//! 1. a prefixed id (`"openai:gpt-4o"`) goes to the provider whose tag
//!    matches the prefix;
//! 2. an id with an unknown prefix is treated as a bare name (the colon may
//!    belong to the model itself, e.g. fine-tune ids);
//! 3. bare names route by model-name convention (`gpt-*`/`o<digit>*` to an
//!    OpenAI instance, `claude*` to an Anthropic instance, `gemini*` to a
//!    Gemini instance);
//! 4. anything still unmatched goes to the first configured provider.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::catalog::{merge_models, ModelCatalog};
use crate::config::{ProviderConfig, ProviderKind, RegistryConfig};
use crate::providers::{create_provider, ChatProvider};
use crate::types::chunk::ChatResponse;
use crate::types::model::{split_model_id, ModelInfo};
use crate::types::request::ChatRequest;
use crate::{ChunkStream, Error, Result};

/// Model-name conventions for routing unprefixed identifiers.
static CONVENTIONS: Lazy<Vec<(Regex, ProviderKind)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"^(gpt-|chatgpt|o\d|text-|ft:|dall-e)").expect("valid built-in pattern"),
            ProviderKind::OpenAi,
        ),
        (
            Regex::new(r"^claude").expect("valid built-in pattern"),
            ProviderKind::Anthropic,
        ),
        (
            Regex::new(r"^(gemini|gemma)").expect("valid built-in pattern"),
            ProviderKind::Gemini,
        ),
    ]
});

fn infer_kind(model: &str) -> Option<ProviderKind> {
    CONVENTIONS
        .iter()
        .find(|(pattern, _)| pattern.is_match(model))
        .map(|(_, kind)| *kind)
}

struct RegistryEntry {
    config: ProviderConfig,
    provider: Arc<dyn ChatProvider>,
}

pub struct ProviderRegistry {
    entries: Vec<RegistryEntry>,
    catalog: ModelCatalog,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("tags", &self.tags())
            .finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Validate the whole configuration, then construct every provider.
    /// Construction fails fast on the first bad entry.
    pub fn from_config(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        let mut entries = Vec::with_capacity(config.providers.len());
        for provider_config in config.providers {
            let provider = create_provider(&provider_config)?;
            entries.push(RegistryEntry {
                config: provider_config,
                provider,
            });
        }
        Ok(Self {
            entries,
            catalog: ModelCatalog::new(),
        })
    }

    pub fn from_yaml_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::from_config(RegistryConfig::from_path(path)?)
    }

    /// Configured provider tags, in configuration order.
    pub fn tags(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.provider.tag()).collect()
    }

    /// Provider with the given tag.
    pub fn provider(&self, tag: &str) -> Option<Arc<dyn ChatProvider>> {
        self.entries
            .iter()
            .find(|e| e.provider.tag().eq_ignore_ascii_case(tag))
            .map(|e| Arc::clone(&e.provider))
    }

    /// Route a model identifier to a provider instance.
    pub fn provider_for_model(&self, model: &str) -> Result<Arc<dyn ChatProvider>> {
        if self.entries.is_empty() {
            return Err(Error::configuration("no providers configured"));
        }

        let (prefix, _) = split_model_id(model);
        if let Some(prefix) = prefix {
            if let Some(provider) = self.provider(prefix) {
                return Ok(provider);
            }
            // Unknown prefix: the colon belongs to the model name itself.
        }

        if let Some(kind) = infer_kind(model) {
            if let Some(entry) = self.entries.iter().find(|e| e.provider.kind() == kind) {
                return Ok(Arc::clone(&entry.provider));
            }
        }

        debug!(model, "no provider matched; falling back to first configured");
        Ok(Arc::clone(&self.entries[0].provider))
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.provider_for_model(&request.model)?.chat(request).await
    }

    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        self.provider_for_model(&request.model)?
            .chat_stream(request)
            .await
    }

    /// Selectable models across every configured provider, deduplicated by
    /// id with the last writer winning.
    pub async fn models(&self, force_refresh: bool) -> Result<Vec<ModelInfo>> {
        let mut listings = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            listings.push(
                self.catalog
                    .models(entry.provider.as_ref(), &entry.config, force_refresh)
                    .await?,
            );
        }
        Ok(merge_models(listings))
    }

    /// Models for a single configured provider.
    pub async fn models_for(&self, tag: &str, force_refresh: bool) -> Result<Vec<ModelInfo>> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.provider.tag().eq_ignore_ascii_case(tag))
            .ok_or_else(|| Error::configuration(format!("unknown provider tag '{}'", tag)))?;
        self.catalog
            .models(entry.provider.as_ref(), &entry.config, force_refresh)
            .await
    }
}

/// Collects provider configurations and assembles the registry.
///
/// Keep this surface small and predictable.
pub struct RegistryBuilder {
    configs: Vec<ProviderConfig>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            configs: Vec::new(),
        }
    }

    pub fn provider(mut self, config: ProviderConfig) -> Self {
        self.configs.push(config);
        self
    }

    pub fn providers(mut self, configs: impl IntoIterator<Item = ProviderConfig>) -> Self {
        self.configs.extend(configs);
        self
    }

    pub fn build(self) -> Result<ProviderRegistry> {
        ProviderRegistry::from_config(RegistryConfig {
            providers: self.configs,
        })
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
