//! Resource handlers grouped by Azure service

pub mod advisor;
pub mod netapp;
pub mod network;
pub mod portal;
pub mod privatedns;
pub mod resource;

use carina_provider_sdk::provider::{ProviderError, ProviderErrorKind, ProviderResult};
use carina_provider_sdk::resource::State;
use carina_provider_sdk::wait::WaitError;
use serde_json::Value;

use crate::azure::IdParseError;
use crate::client::{ArmClient, ArmError};

pub(crate) fn id_error(err: IdParseError) -> ProviderError {
    ProviderError::validation(err.to_string()).with_cause(err)
}

pub(crate) fn wait_error(err: WaitError<ArmError>, context: impl std::fmt::Display) -> ProviderError {
    let kind = match &err {
        WaitError::Timeout { .. } => ProviderErrorKind::Timeout,
        WaitError::Refresh(e) if e.is_not_found() => ProviderErrorKind::NotFound,
        WaitError::NotFound { .. } => ProviderErrorKind::NotFound,
        _ => ProviderErrorKind::Api,
    };
    ProviderError::new(format!("{}: {}", context, err))
        .with_kind(kind)
        .with_cause(err)
}

/// GET a resource, `None` once it has gone away
pub(crate) async fn get_or_none(
    client: &ArmClient,
    path: &str,
    api_version: &str,
) -> Result<Option<Value>, ArmError> {
    match client.get(path, api_version).await {
        Ok(body) => Ok(Some(body)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// The read following a create or update must find the resource
pub(crate) fn require_exists(state: State, description: &str) -> ProviderResult<State> {
    if state.exists {
        Ok(state)
    } else {
        Err(ProviderError::not_found(format!(
            "Cannot read {} after it was written",
            description
        )))
    }
}

/// `id` of a response body, falling back to the requested path
pub(crate) fn response_id(body: &Value, path: &str) -> String {
    body.get("id")
        .and_then(Value::as_str)
        .unwrap_or(path)
        .to_string()
}
