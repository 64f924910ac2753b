//! 模型目录：跨提供商实例的模型列表获取、缓存、过滤与去重。
//!
//! # Model Catalog
//!
//! Lookup precedence per configuration:
//!
//! 1. `force_refresh` bypasses every cache layer and fetches live;
//! 2. otherwise the in-memory per-configuration cache is checked (LRU keyed
//!    by a digest of provider kind, tag, credential and base URL);
//! 3. then the configuration's persisted model list;
//! 4. then a live `list_models` fetch;
//! 5. then a hard-coded per-kind default list when the fetch fails or
//!    returns nothing.
//!
//! Every path applies the configuration's regex filter, infers capability
//! tags for entries that carry none, and deduplicates by id with the last
//! writer winning.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::ErrorContext;
use crate::providers::openai::token_limit_param;
use crate::providers::ChatProvider;
use crate::types::model::{split_model_id, Capability, ModelInfo};
use crate::{Error, Result};

/// Number of distinct configurations whose listings stay cached.
const CACHE_CAPACITY: usize = 64;

const VISION_MARKERS: &[&str] = &[
    "vision",
    "gpt-4o",
    "gpt-4.1",
    "gemini",
    "claude-3",
    "claude-sonnet",
    "claude-opus",
    "llava",
    "pixtral",
];
const AUDIO_MARKERS: &[&str] = &["audio", "whisper", "realtime", "tts"];
const REASONING_MARKERS: &[&str] = &["thinking", "reasoner", "-r1", "qwq"];
const EMBEDDING_MARKERS: &[&str] = &["embed", "bge-", "e5-"];

pub struct ModelCatalog {
    cache: Mutex<LruCache<String, Vec<ModelInfo>>>,
}

impl std::fmt::Debug for ModelCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCatalog").finish_non_exhaustive()
    }
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("cache capacity is non-zero"),
            )),
        }
    }

    /// Selectable models for one provider instance, following the lookup
    /// precedence above.
    pub async fn models(
        &self,
        provider: &dyn ChatProvider,
        config: &ProviderConfig,
        force_refresh: bool,
    ) -> Result<Vec<ModelInfo>> {
        let key = config_key(config);

        if !force_refresh {
            let hit = { self.cache.lock().unwrap().get(&key).cloned() };
            if let Some(models) = hit {
                debug!(provider = config.tag(), "model catalog cache hit");
                return Ok(models);
            }
            if !config.model_list.is_empty() {
                return finalize(config, persisted_models(config));
            }
        }

        let models = match provider.list_models().await {
            Ok(models) if !models.is_empty() => models,
            Ok(_) => {
                debug!(provider = config.tag(), "live listing empty; using defaults");
                default_models(config)
            }
            Err(e) => {
                warn!(
                    provider = config.tag(),
                    error = %e,
                    "live model listing failed; using defaults"
                );
                default_models(config)
            }
        };
        let models = finalize(config, models)?;
        self.cache.lock().unwrap().put(key, models.clone());
        Ok(models)
    }

    /// Drop the cached listing for one configuration.
    pub fn invalidate(&self, config: &ProviderConfig) {
        self.cache.lock().unwrap().pop(&config_key(config));
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Digest identifying one configuration's listing: provider kind, tag,
/// credential and base URL, canonicalized through a sorted map.
fn config_key(config: &ProviderConfig) -> String {
    let mut parts: BTreeMap<&str, &str> = BTreeMap::new();
    parts.insert("kind", config.kind.default_tag());
    parts.insert("tag", config.tag());
    if let Some(key) = config.api_key.as_deref() {
        parts.insert("credential", key);
    }
    if let Some(url) = config.base_url.as_deref() {
        parts.insert("base_url", url);
    }
    let canonical = serde_json::to_string(&parts).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}

/// Entries a configuration pins explicitly. An entry already carrying this
/// provider's prefix is not prefixed twice.
fn persisted_models(config: &ProviderConfig) -> Vec<ModelInfo> {
    config
        .model_list
        .iter()
        .map(|entry| {
            let bare = match split_model_id(entry) {
                (Some(prefix), rest) if prefix.eq_ignore_ascii_case(config.tag()) => rest,
                _ => entry.as_str(),
            };
            ModelInfo::new(config.tag(), bare)
        })
        .collect()
}

/// Last-resort listing when nothing can be fetched.
fn default_models(config: &ProviderConfig) -> Vec<ModelInfo> {
    let names: &[&str] = match config.kind {
        ProviderKind::OpenAi => &["gpt-4o", "gpt-4o-mini", "gpt-4.1", "gpt-4.1-mini", "o1"],
        ProviderKind::Anthropic => &[
            "claude-sonnet-4-20250514",
            "claude-3-7-sonnet-20250219",
            "claude-3-5-haiku-20241022",
        ],
        ProviderKind::Gemini => &["gemini-2.0-flash", "gemini-1.5-pro", "gemini-1.5-flash"],
        // No sane universal defaults for aggregators, CLI tools or hubs.
        ProviderKind::Compatible | ProviderKind::Command | ProviderKind::Hub => &[],
    };
    names
        .iter()
        .map(|name| ModelInfo::new(config.tag(), *name))
        .collect()
}

/// Filter, infer capabilities, deduplicate. Applied on every lookup path.
fn finalize(config: &ProviderConfig, models: Vec<ModelInfo>) -> Result<Vec<ModelInfo>> {
    let filter = config
        .model_filter
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| {
            Error::configuration_with_context(
                format!("invalid model_filter: {}", e),
                ErrorContext::new().with_field_path("model_filter"),
            )
        })?;

    let mut out: Vec<ModelInfo> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for mut model in models {
        if let Some(re) = &filter {
            if !re.is_match(model.bare_name()) {
                continue;
            }
        }
        if model.capabilities.is_empty() {
            model.capabilities = infer_capabilities(model.bare_name());
        }
        match index.get(&model.id) {
            Some(&i) => out[i] = model,
            None => {
                index.insert(model.id.clone(), out.len());
                out.push(model);
            }
        }
    }
    Ok(out)
}

/// Capability tags from model-name markers. Pure and total: every input,
/// including the empty string, yields at least chat and streaming.
pub fn infer_capabilities(bare_name: &str) -> Vec<Capability> {
    let name = bare_name.to_lowercase();
    let mut caps = vec![Capability::Chat, Capability::Streaming];
    if VISION_MARKERS.iter().any(|m| name.contains(m)) {
        caps.push(Capability::Vision);
    }
    if AUDIO_MARKERS.iter().any(|m| name.contains(m)) {
        caps.push(Capability::Audio);
    }
    if token_limit_param(&name) == "max_completion_tokens"
        || REASONING_MARKERS.iter().any(|m| name.contains(m))
    {
        caps.push(Capability::Reasoning);
    }
    if EMBEDDING_MARKERS.iter().any(|m| name.contains(m)) {
        caps.push(Capability::Embedding);
    }
    caps
}

/// Merge per-provider listings into one; on duplicate ids the later entry
/// replaces the earlier one in place.
pub fn merge_models(listings: Vec<Vec<ModelInfo>>) -> Vec<ModelInfo> {
    let mut out: Vec<ModelInfo> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for listing in listings {
        for model in listing {
            match index.get(&model.id) {
                Some(&i) => out[i] = model,
                None => {
                    index.insert(model.id.clone(), out.len());
                    out.push(model);
                }
            }
        }
    }
    out
}
