//! 部署解析器：把模型名映射到集线器里正在运行的具体部署。
//!
//! Maps a requested model name onto a concrete RUNNING deployment behind the
//! hub. Resolution lists deployments and configurations, matches by
//! case-insensitive substring against the advertised backend model name
//! (first match wins), and caches the result keyed by
//! `model_name[:model_version]`. Cached entries expire after five minutes;
//! a hit older than one minute is health-probed before being trusted, and a
//! failed probe evicts the entry and re-resolves once.
//!
//! The cache lock is never held across an await. Two concurrent resolutions
//! of the same unresolved name may both perform the remote lookup; the
//! lookup is idempotent and the last store wins.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ErrorContext;
use crate::transport::Transport;
use crate::types::model::EngineKind;
use crate::{Error, Result};

/// Resolved entries live this long before a full re-resolution.
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Hits older than this are probed for liveness before being trusted.
const HEALTH_CHECK_AFTER: Duration = Duration::from_secs(60);

/// A concrete, addressable running deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub id: String,
    pub url: String,
    pub model_name: String,
    pub model_version: Option<String>,
    pub engine: EngineKind,
    pub status: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedDeployment {
    deployment: Deployment,
    resolved_at: Instant,
    checked_at: Instant,
}

impl CachedDeployment {
    fn new(deployment: Deployment) -> Self {
        let now = Instant::now();
        Self {
            deployment,
            resolved_at: now,
            checked_at: now,
        }
    }

    fn is_expired(&self) -> bool {
        self.resolved_at.elapsed() > CACHE_TTL
    }

    fn needs_health_check(&self) -> bool {
        self.checked_at.elapsed() > HEALTH_CHECK_AFTER
    }
}

#[derive(Debug)]
pub struct DeploymentResolver {
    base_url: String,
    cache: Mutex<HashMap<String, CachedDeployment>>,
}

impl DeploymentResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Cache key: lowercased `model_name[:model_version]`.
    fn cache_key(model_name: &str, model_version: Option<&str>) -> String {
        match model_version {
            Some(version) => format!(
                "{}:{}",
                model_name.to_lowercase(),
                version.to_lowercase()
            ),
            None => model_name.to_lowercase(),
        }
    }

    /// Resolve a model name to a running deployment, consulting the cache
    /// first. `headers` must already carry the hub's auth and resource-group
    /// headers.
    pub async fn resolve(
        &self,
        transport: &Transport,
        headers: &[(&str, String)],
        model_name: &str,
        model_version: Option<&str>,
    ) -> Result<Deployment> {
        let key = Self::cache_key(model_name, model_version);

        let hit = {
            let cache = self.cache.lock().unwrap();
            cache.get(&key).filter(|e| !e.is_expired()).cloned()
        };

        if let Some(entry) = hit {
            if !entry.needs_health_check() {
                debug!(model = model_name, deployment_id = %entry.deployment.id, "deployment cache hit");
                return Ok(entry.deployment);
            }
            match self.check_health(transport, headers, &entry.deployment.id).await {
                Ok(()) => {
                    let mut cache = self.cache.lock().unwrap();
                    if let Some(e) = cache.get_mut(&key) {
                        e.checked_at = Instant::now();
                    }
                    return Ok(entry.deployment);
                }
                Err(e) => {
                    warn!(
                        model = model_name,
                        deployment_id = %entry.deployment.id,
                        error = %e,
                        "cached deployment failed health check; re-resolving"
                    );
                    self.cache.lock().unwrap().remove(&key);
                }
            }
        }

        let deployment = self.lookup(transport, headers, model_name, model_version).await?;
        info!(
            model = model_name,
            deployment_id = %deployment.id,
            engine = deployment.engine.as_str(),
            "resolved deployment"
        );
        self.cache
            .lock()
            .unwrap()
            .insert(key, CachedDeployment::new(deployment.clone()));
        Ok(deployment)
    }

    /// All RUNNING deployments, joined with their configurations. Used by
    /// resolution and by model listing.
    pub async fn list_running(
        &self,
        transport: &Transport,
        headers: &[(&str, String)],
    ) -> Result<Vec<Deployment>> {
        let url = format!(
            "{}/deployments?$filter=status eq 'RUNNING'",
            self.base_url
        );
        let body = transport.get_json(&url, headers).await?;
        let executables = self.list_configurations(transport, headers).await?;
        parse_deployments(&body, &executables)
    }

    async fn lookup(
        &self,
        transport: &Transport,
        headers: &[(&str, String)],
        model_name: &str,
        model_version: Option<&str>,
    ) -> Result<Deployment> {
        let deployments = self.list_running(transport, headers).await?;
        match_deployment(&deployments, model_name, model_version)
            .cloned()
            .ok_or_else(|| Error::Resolution {
                model: model_name.to_string(),
            })
    }

    /// Configuration id to executable id, for recovering the engine kind.
    async fn list_configurations(
        &self,
        transport: &Transport,
        headers: &[(&str, String)],
    ) -> Result<HashMap<String, String>> {
        let url = format!("{}/configurations", self.base_url);
        let body = transport.get_json(&url, headers).await?;
        Ok(parse_configurations(&body))
    }

    /// Liveness probe for one cached deployment.
    async fn check_health(
        &self,
        transport: &Transport,
        headers: &[(&str, String)],
        deployment_id: &str,
    ) -> Result<()> {
        let url = format!("{}/deployments/{}", self.base_url, deployment_id);
        let body = transport.get_json(&url, headers).await?;
        let status = body
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("UNKNOWN");
        if status.eq_ignore_ascii_case("RUNNING") {
            Ok(())
        } else {
            Err(Error::Health {
                deployment: deployment_id.to_string(),
            })
        }
    }

    #[cfg(test)]
    fn insert_backdated(&self, key: &str, deployment: Deployment, age: Duration) {
        let stamp = Instant::now().checked_sub(age).unwrap();
        self.cache.lock().unwrap().insert(
            key.to_string(),
            CachedDeployment {
                deployment,
                resolved_at: stamp,
                checked_at: stamp,
            },
        );
    }
}

/// First deployment whose advertised model name contains the requested name
/// (case-insensitive). A requested version narrows the match only when the
/// deployment advertises one.
fn match_deployment<'a>(
    deployments: &'a [Deployment],
    model_name: &str,
    model_version: Option<&str>,
) -> Option<&'a Deployment> {
    let needle = model_name.to_lowercase();
    deployments.iter().find(|d| {
        if !d.model_name.to_lowercase().contains(&needle) {
            return false;
        }
        match (model_version, d.model_version.as_deref()) {
            (Some(requested), Some(advertised)) => requested.eq_ignore_ascii_case(advertised),
            _ => true,
        }
    })
}

/// Map a configuration's executable id onto the engine family serving it.
/// Unrecognized executables get the converse translator, the most
/// schema-tolerant of the three.
pub(crate) fn engine_kind_for(executable_id: &str) -> EngineKind {
    let id = executable_id.to_lowercase();
    if id.contains("azure-openai") {
        EngineKind::AzureOpenAi
    } else if id.contains("aws-bedrock") {
        EngineKind::AwsBedrock
    } else {
        EngineKind::GcpVertexAi
    }
}

fn parse_configurations(body: &Value) -> HashMap<String, String> {
    body.get("resources")
        .and_then(|r| r.as_array())
        .map(|resources| {
            resources
                .iter()
                .filter_map(|c| {
                    let id = c.get("id").and_then(|i| i.as_str())?;
                    let executable = c.get("executableId").and_then(|e| e.as_str())?;
                    Some((id.to_string(), executable.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_deployments(
    body: &Value,
    executables: &HashMap<String, String>,
) -> Result<Vec<Deployment>> {
    let resources = body
        .get("resources")
        .and_then(|r| r.as_array())
        .ok_or_else(|| {
            Error::parse_with_context(
                "deployment listing has no resources array",
                ErrorContext::new()
                    .with_field_path("resources")
                    .with_source("deployment_resolver"),
            )
        })?;
    Ok(resources
        .iter()
        .filter_map(|d| parse_deployment(d, executables))
        .collect())
}

/// One listing entry. Entries without an address or an advertised model are
/// unusable for routing and are skipped.
fn parse_deployment(d: &Value, executables: &HashMap<String, String>) -> Option<Deployment> {
    let id = d.get("id").and_then(|i| i.as_str())?;
    let url = d.get("deploymentUrl").and_then(|u| u.as_str())?;
    let status = d
        .get("status")
        .and_then(|s| s.as_str())
        .unwrap_or("UNKNOWN");

    let model = d.pointer("/details/resources/backend_details/model");
    let model_name = model
        .and_then(|m| m.get("name"))
        .and_then(|n| n.as_str())?;
    let model_version = model
        .and_then(|m| m.get("version"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let executable = d
        .get("executableId")
        .and_then(|e| e.as_str())
        .map(str::to_string)
        .or_else(|| {
            d.get("configurationId")
                .and_then(|c| c.as_str())
                .and_then(|c| executables.get(c).cloned())
        });

    Some(Deployment {
        id: id.to_string(),
        url: url.trim_end_matches('/').to_string(),
        model_name: model_name.to_string(),
        model_version,
        engine: engine_kind_for(executable.as_deref().unwrap_or("")),
        status: status.to_string(),
        created_at: d
            .get("createdAt")
            .and_then(|c| c.as_str())
            .map(str::to_string),
    })
}
