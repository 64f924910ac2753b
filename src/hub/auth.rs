//! OAuth 客户端凭证流：获取并缓存集线器的访问令牌。
//!
//! Client-credentials token acquisition for the hub. Tokens are cached until
//! shortly before their reported expiry; concurrent refreshes may duplicate
//! one token fetch, and the last store wins.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use tracing::debug;

use crate::config::HubAuthConfig;
use crate::error::ErrorContext;
use crate::transport::Transport;
use crate::{Error, Result};

/// Refresh this long before the token's reported expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Assumed lifetime when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_SKEW < self.expires_at
    }
}

pub struct TokenCache {
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: ArcSwapOption<CachedToken>,
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    pub fn new(auth: &HubAuthConfig) -> Self {
        Self {
            token_url: token_url(&auth.auth_url),
            client_id: auth.client_id.clone(),
            client_secret: auth.client_secret.clone(),
            cached: ArcSwapOption::from(None),
        }
    }

    /// Current bearer token, refreshed through the token endpoint when the
    /// cached one is missing or about to expire.
    pub async fn bearer_token(&self, transport: &Transport) -> Result<String> {
        if let Some(token) = self.cached.load_full() {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }

        let response = transport
            .post_form(
                &self.token_url,
                &[],
                &[
                    ("grant_type", "client_credentials"),
                    ("client_id", &self.client_id),
                    ("client_secret", &self.client_secret),
                ],
            )
            .await?;

        let access_token = response
            .get("access_token")
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                Error::parse_with_context(
                    "token endpoint returned no access_token",
                    ErrorContext::new()
                        .with_field_path("access_token")
                        .with_source("hub_auth"),
                )
            })?
            .to_string();
        let expires_in = response
            .get("expires_in")
            .and_then(|e| e.as_u64())
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        debug!(expires_in, "fetched hub access token");

        let token = Arc::new(CachedToken {
            access_token,
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        });
        self.cached.store(Some(Arc::clone(&token)));
        Ok(token.access_token.clone())
    }

    /// Drop the cached token so the next call re-authenticates.
    pub fn invalidate(&self) {
        self.cached.store(None);
    }
}

/// Normalize the configured auth URL into a token endpoint: `/oauth/token`
/// is appended when the URL carries no path of its own.
pub(crate) fn token_url(auth_url: &str) -> String {
    let trimmed = auth_url.trim_end_matches('/');
    match url::Url::parse(trimmed) {
        Ok(parsed) if parsed.path().is_empty() || parsed.path() == "/" => {
            format!("{}/oauth/token", trimmed)
        }
        _ => trimmed.to_string(),
    }
}
