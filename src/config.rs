//! 配置模块：提供商声明、凭证解析与注册表配置文件加载。
//!
//! # Configuration Module
//!
//! Declarative provider configuration, loadable from YAML, plus the
//! credential resolution chain shared by every backend adapter.
//!
//! ## Credential resolution
//!
//! An adapter's API key is resolved at construction time, before any network
//! call, in this order:
//!
//! 1. the explicit `api_key` field;
//! 2. the OS keyring (service `"llm-conduit"`, account = provider tag);
//! 3. the `<TAG>_API_KEY` environment variable.
//!
//! A provider kind that requires a key and resolves none fails fast with a
//! configuration error.
//!
//! ## Example configuration file
//!
//! ```yaml
//! providers:
//!   - kind: openai
//!     api_key: sk-...
//!   - kind: compatible
//!     name: openrouter
//!     base_url: https://openrouter.ai/api/v1
//!     model_filter: "^(openai|anthropic)/"
//!   - kind: command
//!     name: claude-cli
//!     command: claude
//!     args: ["-p"]
//!   - kind: hub
//!     base_url: https://api.hub.example.com/v2
//!     hub:
//!       auth_url: https://auth.example.com/oauth/token
//!       client_id: sb-client
//!       client_secret: secret
//!       resource_group: default
//! ```

use std::collections::HashMap;
use std::env;
use std::path::Path;

use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ErrorContext;
use crate::{Error, Result};

/// Service name used for OS keyring lookups.
const KEYRING_SERVICE: &str = "llm-conduit";

/// Closed set of provider kinds the factory can construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// The OpenAI chat-completions API at its canonical base URL.
    OpenAi,
    /// The Anthropic messages API.
    Anthropic,
    /// The Gemini generateContent API.
    Gemini,
    /// Any OpenAI-compatible endpoint (aggregators, local runtimes); differs
    /// from [`ProviderKind::OpenAi`] only in tag and base URL.
    Compatible,
    /// A locally installed CLI tool bridged over stdout.
    Command,
    /// A managed deployment hub fronting several execution engines.
    Hub,
}

impl ProviderKind {
    /// Default tag, used when the configuration does not name the instance.
    pub fn default_tag(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Compatible => "compatible",
            ProviderKind::Command => "command",
            ProviderKind::Hub => "hub",
        }
    }

    /// Canonical base URL, for kinds that have one.
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("https://api.openai.com/v1"),
            ProviderKind::Anthropic => Some("https://api.anthropic.com"),
            ProviderKind::Gemini => Some("https://generativelanguage.googleapis.com/v1beta"),
            ProviderKind::Compatible | ProviderKind::Command | ProviderKind::Hub => None,
        }
    }

    /// Whether this kind refuses to start without an API key. Compatible
    /// endpoints cover local runtimes with no auth, so their key stays
    /// optional and is attached only when resolved.
    pub fn requires_api_key(&self) -> bool {
        matches!(
            self,
            ProviderKind::OpenAi | ProviderKind::Anthropic | ProviderKind::Gemini
        )
    }
}

/// Declarative configuration for one provider instance. Read-only once the
/// provider is constructed; mutating a config never affects live providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Instance tag, used as the model-id prefix. Defaults to the kind tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Persisted model list, served by the catalog ahead of live fetches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub model_list: Vec<String>,
    /// Optional regex applied to catalog results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_filter: Option<String>,
    /// Program path for [`ProviderKind::Command`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Base arguments prepended before the prompt argument.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Flag used to pass the model name to the subprocess (e.g. `--model`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_flag: Option<String>,
    /// Extra environment variables for the subprocess.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// OAuth settings for [`ProviderKind::Hub`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub: Option<HubAuthConfig>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            name: None,
            api_key: None,
            base_url: None,
            model_list: Vec::new(),
            model_filter: None,
            command: None,
            args: Vec::new(),
            model_flag: None,
            env: HashMap::new(),
            hub: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_model_list(mut self, models: Vec<String>) -> Self {
        self.model_list = models;
        self
    }

    pub fn with_model_filter(mut self, pattern: impl Into<String>) -> Self {
        self.model_filter = Some(pattern.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_model_flag(mut self, flag: impl Into<String>) -> Self {
        self.model_flag = Some(flag.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_hub(mut self, hub: HubAuthConfig) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Instance tag used as the model-id prefix.
    pub fn tag(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.default_tag())
    }

    /// Base URL with the per-kind default applied.
    pub fn effective_base_url(&self) -> Result<String> {
        if let Some(url) = &self.base_url {
            return Ok(url.trim_end_matches('/').to_string());
        }
        self.kind
            .default_base_url()
            .map(String::from)
            .ok_or_else(|| {
                Error::configuration_with_context(
                    format!("provider '{}' requires a base_url", self.tag()),
                    ErrorContext::new().with_field_path("base_url"),
                )
            })
    }

    /// Structural validation, run before any provider is constructed.
    pub fn validate(&self) -> Result<()> {
        let tag = self.tag();
        if tag.is_empty() || tag.contains(':') || tag.contains(char::is_whitespace) {
            return Err(Error::configuration_with_context(
                format!("invalid provider tag '{}'", tag),
                ErrorContext::new()
                    .with_field_path("name")
                    .with_details("tags must be non-empty and free of ':' and whitespace"),
            ));
        }

        if let Some(url) = &self.base_url {
            url::Url::parse(url).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid base_url '{}': {}", url, e),
                    ErrorContext::new().with_field_path("base_url"),
                )
            })?;
        }

        if let Some(pattern) = &self.model_filter {
            regex::Regex::new(pattern).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid model_filter: {}", e),
                    ErrorContext::new().with_field_path("model_filter"),
                )
            })?;
        }

        match self.kind {
            ProviderKind::Command => {
                if self.command.as_deref().map_or(true, str::is_empty) {
                    return Err(Error::configuration_with_context(
                        format!("provider '{}' requires a command", tag),
                        ErrorContext::new().with_field_path("command"),
                    ));
                }
            }
            ProviderKind::Compatible => {
                if self.base_url.is_none() {
                    return Err(Error::configuration_with_context(
                        format!("provider '{}' requires a base_url", tag),
                        ErrorContext::new().with_field_path("base_url"),
                    ));
                }
            }
            ProviderKind::Hub => {
                if self.base_url.is_none() {
                    return Err(Error::configuration_with_context(
                        format!("provider '{}' requires a base_url", tag),
                        ErrorContext::new().with_field_path("base_url"),
                    ));
                }
                if self.hub.is_none() {
                    return Err(Error::configuration_with_context(
                        format!("provider '{}' requires a hub auth section", tag),
                        ErrorContext::new().with_field_path("hub"),
                    ));
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Resolve the API key through the explicit/keyring/environment chain.
    /// Fails fast for kinds that require one.
    pub fn resolve_api_key(&self) -> Result<Option<String>> {
        if let Some(key) = &self.api_key {
            return Ok(Some(key.clone()));
        }

        let tag = self.tag();
        if let Some(key) = lookup_credential(tag) {
            return Ok(Some(key));
        }

        if self.kind.requires_api_key() {
            Err(Error::configuration_with_context(
                format!("no API key found for provider '{}'", tag),
                ErrorContext::new()
                    .with_field_path("api_key")
                    .with_details(format!(
                        "set api_key, a keyring entry, or the {} environment variable",
                        credential_env_var(tag)
                    )),
            ))
        } else {
            Ok(None)
        }
    }
}

fn credential_env_var(tag: &str) -> String {
    format!("{}_API_KEY", tag.to_uppercase().replace('-', "_"))
}

fn lookup_credential(tag: &str) -> Option<String> {
    // 1. Try Keyring
    if let Ok(entry) = Entry::new(KEYRING_SERVICE, tag) {
        if let Ok(key) = entry.get_password() {
            debug!(provider = tag, "resolved API key from keyring");
            return Some(key);
        }
    }

    // 2. Try Environment Variable (TAG_API_KEY)
    env::var(credential_env_var(tag)).ok()
}

/// OAuth client-credentials settings for the hub provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubAuthConfig {
    /// Token endpoint; `/oauth/token` is appended when no path is present.
    pub auth_url: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_resource_group")]
    pub resource_group: String,
}

fn default_resource_group() -> String {
    "default".to_string()
}

/// Top-level configuration file shape: the full set of provider instances a
/// registry is built from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl RegistryConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid registry configuration: {}", e),
                ErrorContext::new().with_source("registry_config"),
            )
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Validate every provider entry and reject duplicate tags.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for config in &self.providers {
            config.validate()?;
            if !seen.insert(config.tag().to_string()) {
                return Err(Error::configuration_with_context(
                    format!("duplicate provider tag '{}'", config.tag()),
                    ErrorContext::new().with_field_path("name"),
                ));
            }
        }
        Ok(())
    }
}
