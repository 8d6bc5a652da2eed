//! Shared helpers for the mocked Resource Manager tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use carina_provider_azurerm::auth::StaticTokenCredential;
use carina_provider_azurerm::config::{Features, PollingConfig};
use carina_provider_azurerm::{ArmClient, AzurermProvider};
use wiremock::MockServer;

pub const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";
pub const TOKEN: &str = "test-token";

pub fn fast_polling() -> PollingConfig {
    PollingConfig {
        lro_interval: Duration::from_millis(5),
        state_min_timeout: Duration::from_millis(5),
    }
}

pub fn client(server: &MockServer) -> ArmClient {
    ArmClient::new(
        &server.uri(),
        SUBSCRIPTION,
        Arc::new(StaticTokenCredential::new(TOKEN)),
        fast_polling(),
    )
    .expect("client should build")
}

pub fn provider(server: &MockServer) -> AzurermProvider {
    AzurermProvider::with_client(client(server), Features::default())
}

pub fn provider_without_import_check(server: &MockServer) -> AzurermProvider {
    AzurermProvider::with_client(
        client(server),
        Features {
            resources_must_be_imported: false,
        },
    )
}

pub fn resource_group_path(name: &str) -> String {
    format!("/subscriptions/{}/resourceGroups/{}", SUBSCRIPTION, name)
}

pub fn resource_path(resource_group: &str, provider: &str, segments: &str) -> String {
    format!(
        "{}/providers/{}/{}",
        resource_group_path(resource_group),
        provider,
        segments
    )
}
