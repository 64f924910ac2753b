//! 集线器提供商：把一个提供商标签动态路由到多个执行引擎上的托管部署。
//!
//! One provider tag fronting several execution engines. Each request resolves
//! the model name to a RUNNING deployment (cached with TTL and health
//! re-checks, see [`resolver`]), picks the translator matching the
//! deployment's engine kind, and dispatches. Auth is OAuth
//! client-credentials with a private token cache ([`auth`]).
//!
//! When an engine's streaming call cannot be established, the hub downgrades
//! once to the buffered call and synthesizes a two-chunk stream. That
//! downgrade is the only built-in retry anywhere in the crate, and it fires
//! at most once per request.

pub mod auth;
pub mod engines;
pub mod resolver;

pub use engines::EngineAdapter;
pub use resolver::{Deployment, DeploymentResolver};

use std::fmt;

use async_trait::async_trait;
use tracing::warn;

use crate::config::{ProviderConfig, ProviderKind};
use crate::providers::{response_to_stream, ChatProvider};
use crate::transport::Transport;
use crate::types::chunk::ChatResponse;
use crate::types::model::ModelInfo;
use crate::types::request::ChatRequest;
use crate::{ChunkStream, Error, Result};

pub struct HubProvider {
    tag: String,
    transport: Transport,
    resolver: DeploymentResolver,
    tokens: auth::TokenCache,
    resource_group: String,
}

impl fmt::Debug for HubProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubProvider")
            .field("tag", &self.tag)
            .field("resource_group", &self.resource_group)
            .finish_non_exhaustive()
    }
}

impl HubProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let hub = config.hub.as_ref().ok_or_else(|| {
            Error::configuration(format!(
                "provider '{}' requires a hub auth section",
                config.tag()
            ))
        })?;
        Ok(Self {
            tag: config.tag().to_string(),
            transport: Transport::new()?,
            resolver: DeploymentResolver::new(config.effective_base_url()?),
            tokens: auth::TokenCache::new(hub),
            resource_group: hub.resource_group.clone(),
        })
    }

    async fn request_headers(&self) -> Result<Vec<(&'static str, String)>> {
        let token = self.tokens.bearer_token(&self.transport).await?;
        Ok(vec![
            ("authorization", format!("Bearer {}", token)),
            ("ai-resource-group", self.resource_group.clone()),
        ])
    }
}

#[async_trait]
impl ChatProvider for HubProvider {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Hub
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let headers = self.request_headers().await?;
        let model = request.native_model(&self.tag);
        let deployment = self
            .resolver
            .resolve(&self.transport, &headers, model, None)
            .await?;
        let engine = engines::engine_for(deployment.engine);
        engine
            .chat(&self.transport, &headers, &deployment, request)
            .await
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let headers = self.request_headers().await?;
        let model = request.native_model(&self.tag);
        let deployment = self
            .resolver
            .resolve(&self.transport, &headers, model, None)
            .await?;
        let engine = engines::engine_for(deployment.engine);

        match engine
            .chat_stream(&self.transport, &headers, &deployment, request)
            .await
        {
            Ok(stream) => Ok(stream),
            Err(e) => {
                warn!(
                    deployment_id = %deployment.id,
                    engine = deployment.engine.as_str(),
                    error = %e,
                    "streaming call failed; downgrading to buffered call"
                );
                let response = engine
                    .chat(&self.transport, &headers, &deployment, request)
                    .await?;
                Ok(response_to_stream(response))
            }
        }
    }

    /// RUNNING deployments presented as catalog entries, augmented with
    /// deployment address and engine kind.
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let headers = self.request_headers().await?;
        let deployments = self
            .resolver
            .list_running(&self.transport, &headers)
            .await?;
        Ok(deployments
            .into_iter()
            .map(|d| {
                ModelInfo::new(&self.tag, &d.model_name).with_deployment(
                    &d.id,
                    &d.url,
                    d.engine,
                    &d.status,
                )
            })
            .collect())
    }
}
