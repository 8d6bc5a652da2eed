//! Azure Active Directory authentication
//!
//! Bearer tokens for Resource Manager come from a service principal, the
//! Azure CLI's logged-in account, or a pre-issued token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::client::ArmError;
use crate::config::ProviderConfig;

/// Refresh tokens this long before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// TTL assumed when the token response carries no expiry
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Source of bearer tokens for Resource Manager requests
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn token(&self) -> Result<String, ArmError>;
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// Expiry with the buffer already applied
    expires_at: Instant,
}

impl CachedToken {
    fn new(token: String, ttl: Duration) -> Self {
        Self {
            token,
            expires_at: Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER),
        }
    }

    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Clone, Default)]
struct TokenCache {
    inner: Arc<RwLock<Option<CachedToken>>>,
}

impl TokenCache {
    async fn get(&self) -> Option<String> {
        let cache = self.inner.read().await;
        match cache.as_ref() {
            Some(cached) if cached.is_valid() => Some(cached.token.clone()),
            Some(_) => {
                log::debug!("Cached token expired, fetching new token");
                None
            }
            None => None,
        }
    }

    async fn store(&self, token: String, ttl: Duration) {
        let mut cache = self.inner.write().await;
        *cache = Some(CachedToken::new(token, ttl));
        log::debug!("New token cached, expires in ~{} minutes", ttl.as_secs() / 60);
    }
}

/// `expires_in` is a number on the v2 endpoint and a string on some clouds
#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(u64),
    Text(String),
}

impl ExpiresIn {
    fn as_duration(&self) -> Option<Duration> {
        match self {
            ExpiresIn::Seconds(s) => Some(Duration::from_secs(*s)),
            ExpiresIn::Text(s) => s.parse().ok().map(Duration::from_secs),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<ExpiresIn>,
}

/// OAuth2 client-credentials grant for a service principal
pub struct ClientSecretCredential {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cache: TokenCache,
}

impl ClientSecretCredential {
    pub fn new(
        http: reqwest::Client,
        authority: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        resource: &str,
    ) -> Self {
        Self {
            http,
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                authority.trim_end_matches('/'),
                tenant_id
            ),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scope: format!("{}/.default", resource.trim_end_matches('/')),
            cache: TokenCache::default(),
        }
    }

    async fn request_token(&self) -> Result<(String, Duration), ArmError> {
        log::debug!("Requesting token from {}", self.token_url);

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];
        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ArmError::Authentication(format!("token request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ArmError::Authentication(format!("failed to read token response: {}", e)))?;

        if !status.is_success() {
            return Err(ArmError::Authentication(format!(
                "token endpoint returned {}: {}",
                status,
                crate::client::sanitize_for_log(&body)
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ArmError::Authentication(format!("invalid token response: {}", e)))?;
        let ttl = parsed
            .expires_in
            .as_ref()
            .and_then(ExpiresIn::as_duration)
            .unwrap_or(DEFAULT_TOKEN_TTL);
        Ok((parsed.access_token, ttl))
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn token(&self) -> Result<String, ArmError> {
        if let Some(token) = self.cache.get().await {
            return Ok(token);
        }
        let (token, ttl) = self.request_token().await?;
        self.cache.store(token.clone(), ttl).await;
        Ok(token)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    /// Unix timestamp, present on recent CLI versions
    #[serde(rename = "expires_on")]
    expires_on: Option<i64>,
}

/// Tokens obtained from `az account get-access-token`
pub struct AzureCliCredential {
    resource: String,
    cache: TokenCache,
}

impl AzureCliCredential {
    pub fn new(resource: &str) -> Self {
        Self {
            resource: resource.trim_end_matches('/').to_string(),
            cache: TokenCache::default(),
        }
    }

    async fn request_token(&self) -> Result<(String, Duration), ArmError> {
        log::debug!("Requesting token from the Azure CLI for {}", self.resource);

        let output = tokio::process::Command::new("az")
            .args([
                "account",
                "get-access-token",
                "--resource",
                &self.resource,
                "--output",
                "json",
            ])
            .output()
            .await
            .map_err(|e| {
                ArmError::Authentication(format!(
                    "failed to run the Azure CLI, is `az` installed? ({})",
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(ArmError::Authentication(format!(
                "Azure CLI authentication failed, run `az login`: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_cli_token(&output.stdout, chrono::Utc::now().timestamp())
    }
}

fn parse_cli_token(stdout: &[u8], now: i64) -> Result<(String, Duration), ArmError> {
    let parsed: CliToken = serde_json::from_slice(stdout)
        .map_err(|e| ArmError::Authentication(format!("invalid Azure CLI output: {}", e)))?;
    let ttl = parsed
        .expires_on
        .map(|at| Duration::from_secs(at.saturating_sub(now).max(0) as u64))
        .unwrap_or(DEFAULT_TOKEN_TTL);
    Ok((parsed.access_token, ttl))
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn token(&self) -> Result<String, ArmError> {
        if let Some(token) = self.cache.get().await {
            return Ok(token);
        }
        let (token, ttl) = self.request_token().await?;
        self.cache.store(token.clone(), ttl).await;
        Ok(token)
    }
}

/// Fixed bearer token
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn token(&self) -> Result<String, ArmError> {
        Ok(self.token.clone())
    }
}

/// Pick the credential matching the configuration
///
/// A pre-issued token wins, then the Azure CLI, then the service principal.
pub fn credential_from_config(
    config: &ProviderConfig,
    http: reqwest::Client,
) -> Result<Arc<dyn TokenCredential>, ArmError> {
    let resource = config.environment.resource_manager_endpoint();

    if let Some(token) = &config.access_token {
        log::debug!("Authenticating with a pre-issued access token");
        return Ok(Arc::new(StaticTokenCredential::new(token.clone())));
    }

    if config.use_cli {
        log::debug!("Authenticating with the Azure CLI");
        return Ok(Arc::new(AzureCliCredential::new(resource)));
    }

    match (&config.tenant_id, &config.client_id, &config.client_secret) {
        (Some(tenant), Some(client_id), Some(secret)) => {
            log::debug!("Authenticating as service principal {}", client_id);
            Ok(Arc::new(ClientSecretCredential::new(
                http,
                config.environment.active_directory_endpoint(),
                tenant,
                client_id,
                secret,
                resource,
            )))
        }
        _ => Err(ArmError::Authentication(
            "no credentials configured: set ARM_TENANT_ID, ARM_CLIENT_ID and ARM_CLIENT_SECRET, or ARM_USE_CLI=true"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_token_honors_expiry_buffer() {
        assert!(CachedToken::new("t".into(), Duration::from_secs(3600)).is_valid());
        assert!(!CachedToken::new("t".into(), Duration::from_secs(30)).is_valid());
    }

    #[test]
    fn expires_in_accepts_numbers_and_strings() {
        let numeric: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":3599}"#).unwrap();
        assert_eq!(
            numeric.expires_in.unwrap().as_duration(),
            Some(Duration::from_secs(3599))
        );

        let text: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":"3599"}"#).unwrap();
        assert_eq!(
            text.expires_in.unwrap().as_duration(),
            Some(Duration::from_secs(3599))
        );
    }

    #[test]
    fn parses_cli_output() {
        let out = br#"{"accessToken":"eyJ0","expiresOn":"2030-01-01 00:00:00.000000","expires_on":1000600,"tokenType":"Bearer"}"#;
        let (token, ttl) = parse_cli_token(out, 1_000_000).unwrap();
        assert_eq!(token, "eyJ0");
        assert_eq!(ttl, Duration::from_secs(600));

        assert!(parse_cli_token(b"not json", 0).is_err());
    }

    #[tokio::test]
    async fn token_cache_returns_stored_token() {
        let cache = TokenCache::default();
        assert!(cache.get().await.is_none());
        cache.store("abc".to_string(), Duration::from_secs(3600)).await;
        assert_eq!(cache.get().await.as_deref(), Some("abc"));
    }

    #[test]
    fn credential_selection_requires_something() {
        let config = ProviderConfig::default();
        assert!(matches!(
            credential_from_config(&config, reqwest::Client::new()),
            Err(ArmError::Authentication(_))
        ));

        let config = ProviderConfig {
            use_cli: true,
            ..ProviderConfig::default()
        };
        assert!(credential_from_config(&config, reqwest::Client::new()).is_ok());
    }
}
