//! Azure Resource Manager REST client
//!
//! Thin wrapper over `reqwest` that authenticates requests, decodes ARM error
//! bodies and follows the long-running operation protocol until a PUT or
//! DELETE has actually finished.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use carina_provider_sdk::provider::{ProviderError, ProviderErrorKind};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::auth::{self, TokenCredential};
use crate::config::{PollingConfig, ProviderConfig};

/// Maximum length of response body to log
const MAX_LOG_BODY_LENGTH: usize = 200;

const USER_AGENT: &str = concat!("carina-provider-azurerm/", env!("CARGO_PKG_VERSION"));

/// Errors returned by Resource Manager calls
#[derive(Debug, thiserror::Error)]
pub enum ArmError {
    #[error("resource {path} was not found")]
    NotFound { path: String },

    #[error("Status={status} Code=\"{code}\" Message=\"{message}\"")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("long-running operation finished with status {status}: {message}")]
    OperationFailed { status: String, message: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("failed to serialize request: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ArmError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArmError::NotFound { .. })
    }

    fn kind(&self) -> ProviderErrorKind {
        match self {
            ArmError::NotFound { .. } => ProviderErrorKind::NotFound,
            ArmError::Authentication(_) => ProviderErrorKind::Configuration,
            _ => ProviderErrorKind::Api,
        }
    }

    pub fn into_provider_error(self) -> ProviderError {
        ProviderError::new(self.to_string())
            .with_kind(self.kind())
            .with_cause(self)
    }

    /// Wrap with a description of the failed operation
    pub fn with_context(self, context: impl fmt::Display) -> ProviderError {
        ProviderError::new(format!("{}: {}", context, self))
            .with_kind(self.kind())
            .with_cause(self)
    }
}

/// Truncate response bodies before they reach the logs
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = match body.char_indices().nth(MAX_LOG_BODY_LENGTH) {
        Some((idx, _)) => format!(
            "{}... [truncated, {} bytes total]",
            &body[..idx],
            body.len()
        ),
        None => body.to_string(),
    };
    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl RawResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn retry_after(&self) -> Option<Duration> {
        self.header("Retry-After")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

fn provisioning_state(body: &Value) -> Option<&str> {
    body.pointer("/properties/provisioningState")
        .and_then(Value::as_str)
}

fn is_terminal(state: &str) -> bool {
    ["Succeeded", "Failed", "Canceled"]
        .iter()
        .any(|s| s.eq_ignore_ascii_case(state))
}

fn operation_error_message(body: &Value) -> String {
    body.pointer("/error/message")
        .or_else(|| body.pointer("/properties/error/message"))
        .and_then(Value::as_str)
        .unwrap_or("no error details returned")
        .to_string()
}

/// Authenticated client for one subscription
#[derive(Clone)]
pub struct ArmClient {
    http: reqwest::Client,
    endpoint: String,
    subscription_id: String,
    credential: Arc<dyn TokenCredential>,
    polling: PollingConfig,
}

impl ArmClient {
    pub fn new(
        endpoint: &str,
        subscription_id: &str,
        credential: Arc<dyn TokenCredential>,
        polling: PollingConfig,
    ) -> Result<Self, ArmError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            subscription_id: subscription_id.to_string(),
            credential,
            polling,
        })
    }

    /// Build a client with the credential the configuration selects
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ArmError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        let credential = auth::credential_from_config(config, http.clone())?;
        Ok(Self {
            http,
            endpoint: config.resource_manager_endpoint(),
            subscription_id: config.subscription_id.clone(),
            credential,
            polling: config.polling,
        })
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn polling(&self) -> PollingConfig {
        self.polling
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.endpoint, path)
        }
    }

    /// Send one request; non-success statuses become errors
    ///
    /// `api_version` is omitted for URLs handed out by the API itself
    /// (operation status, `nextLink`), which already carry it.
    async fn send(
        &self,
        method: Method,
        path: &str,
        api_version: Option<&str>,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<RawResponse, ArmError> {
        let url = self.url(path);
        log::debug!("{} {}", method, url);

        let token = self.credential.token().await?;
        let mut request = self.http.request(method, &url).bearer_auth(token);
        if let Some(version) = api_version {
            request = request.query(&[("api-version", version)]);
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(ArmError::NotFound {
                path: path.to_string(),
            });
        }

        if !status.is_success() {
            log::debug!("API error: {} - {}", status, sanitize_for_log(&text));
            let parsed: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            let code = parsed
                .pointer("/error/code")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string());
            let message = parsed
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| sanitize_for_log(&text));
            return Err(ArmError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| {
                ArmError::InvalidResponse(format!(
                    "{} ({})",
                    e,
                    sanitize_for_log(&text)
                ))
            })?
        };

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    /// GET a resource
    pub async fn get(&self, path: &str, api_version: &str) -> Result<Value, ArmError> {
        self.get_with_query(path, api_version, &[]).await
    }

    /// GET with additional query parameters
    pub async fn get_with_query(
        &self,
        path: &str,
        api_version: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, ArmError> {
        let response = self
            .send(Method::GET, path, Some(api_version), query, None)
            .await?;
        Ok(response.body)
    }

    /// PUT a resource and wait for the operation to finish
    pub async fn put_and_wait(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
    ) -> Result<(), ArmError> {
        let response = self
            .send(Method::PUT, path, Some(api_version), &[], Some(body))
            .await?;
        self.wait_for_completion(path, api_version, response, false)
            .await
    }

    /// DELETE a resource and wait for the operation to finish
    pub async fn delete_and_wait(&self, path: &str, api_version: &str) -> Result<(), ArmError> {
        let response = self
            .send(Method::DELETE, path, Some(api_version), &[], None)
            .await?;
        self.wait_for_completion(path, api_version, response, true)
            .await
    }

    /// Collect every item of a paged list, following `nextLink`
    pub async fn list_all(
        &self,
        path: &str,
        api_version: &str,
        filter: Option<&str>,
    ) -> Result<Vec<Value>, ArmError> {
        let query: Vec<(&str, &str)> = filter.map(|f| vec![("$filter", f)]).unwrap_or_default();
        let mut response = self
            .send(Method::GET, path, Some(api_version), &query, None)
            .await?;

        let mut items = Vec::new();
        loop {
            match response.body.get("value") {
                Some(Value::Array(page)) => items.extend(page.iter().cloned()),
                Some(Value::Null) | None => {}
                Some(_) => {
                    return Err(ArmError::InvalidResponse(
                        "`value` of a list response is not an array".to_string(),
                    ));
                }
            }

            let Some(next) = response
                .body
                .get("nextLink")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
            else {
                break;
            };
            log::debug!("Following nextLink ({} items so far)", items.len());
            response = self.send(Method::GET, &next, None, &[], None).await?;
        }

        Ok(items)
    }

    /// ARM id of the resource at `path` when it already exists
    pub async fn exists(&self, path: &str, api_version: &str) -> Result<Option<String>, ArmError> {
        match self.get(path, api_version).await {
            Ok(body) => Ok(Some(
                body.get("id")
                    .and_then(Value::as_str)
                    .unwrap_or(path)
                    .to_string(),
            )),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn poll_delay(&self, response: &RawResponse) -> Duration {
        response.retry_after().unwrap_or(self.polling.lro_interval)
    }

    async fn wait_for_completion(
        &self,
        path: &str,
        api_version: &str,
        initial: RawResponse,
        deleting: bool,
    ) -> Result<(), ArmError> {
        if let Some(operation) = initial.header("Azure-AsyncOperation") {
            let operation = operation.to_string();
            let delay = self.poll_delay(&initial);
            return self.poll_async_operation(&operation, delay, deleting).await;
        }

        if initial.status == StatusCode::ACCEPTED
            && let Some(location) = initial.header("Location")
        {
            let location = location.to_string();
            let delay = self.poll_delay(&initial);
            return self.poll_location(&location, delay, deleting).await;
        }

        if !deleting
            && let Some(state) = provisioning_state(&initial.body)
            && !is_terminal(state)
        {
            let delay = self.poll_delay(&initial);
            return self
                .poll_provisioning_state(path, api_version, delay)
                .await;
        }

        Ok(())
    }

    async fn poll_async_operation(
        &self,
        url: &str,
        mut delay: Duration,
        deleting: bool,
    ) -> Result<(), ArmError> {
        loop {
            tokio::time::sleep(delay).await;

            let response = match self.send(Method::GET, url, None, &[], None).await {
                Ok(r) => r,
                Err(e) if deleting && e.is_not_found() => return Ok(()),
                Err(e) => return Err(e),
            };

            let status = response
                .body
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("InProgress");
            log::debug!("Operation status: {}", status);

            if status.eq_ignore_ascii_case("Succeeded") {
                return Ok(());
            }
            if status.eq_ignore_ascii_case("Failed") || status.eq_ignore_ascii_case("Canceled") {
                return Err(ArmError::OperationFailed {
                    status: status.to_string(),
                    message: operation_error_message(&response.body),
                });
            }
            delay = self.poll_delay(&response);
        }
    }

    async fn poll_location(
        &self,
        url: &str,
        mut delay: Duration,
        deleting: bool,
    ) -> Result<(), ArmError> {
        loop {
            tokio::time::sleep(delay).await;

            let response = match self.send(Method::GET, url, None, &[], None).await {
                Ok(r) => r,
                Err(e) if deleting && e.is_not_found() => return Ok(()),
                Err(e) => return Err(e),
            };

            if response.status != StatusCode::ACCEPTED {
                return Ok(());
            }
            log::debug!("Operation still in progress");
            delay = self.poll_delay(&response);
        }
    }

    async fn poll_provisioning_state(
        &self,
        path: &str,
        api_version: &str,
        mut delay: Duration,
    ) -> Result<(), ArmError> {
        loop {
            tokio::time::sleep(delay).await;

            let response = self
                .send(Method::GET, path, Some(api_version), &[], None)
                .await?;
            let state = provisioning_state(&response.body).unwrap_or("Succeeded");
            log::debug!("Provisioning state of {}: {}", path, state);

            if state.eq_ignore_ascii_case("Succeeded") {
                return Ok(());
            }
            if is_terminal(state) {
                return Err(ArmError::OperationFailed {
                    status: state.to_string(),
                    message: operation_error_message(&response.body),
                });
            }
            delay = self.poll_delay(&response);
        }
    }
}
