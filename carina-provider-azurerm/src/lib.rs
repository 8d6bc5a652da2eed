//! Carina Azure Resource Manager Provider
//!
//! Manages Azure resources through the Resource Manager REST API.
//!
//! ## Module Structure
//!
//! - `config` - Provider configuration from `ARM_*` variables and the provider block
//! - `auth` - Token credentials (service principal, Azure CLI, static token)
//! - `client` - Resource Manager client with long-running operation polling
//! - `azure` - Shared helpers: IDs, locations, tags, validators
//! - `resources` - Handler traits and registry
//! - `services` - Handlers per Azure service
//! - `provider` - AzurermProvider implementation

pub mod auth;
pub mod azure;
pub mod client;
pub mod config;
pub mod provider;
pub mod resources;
pub mod services;

// Re-export main types
pub use client::{ArmClient, ArmError};
pub use config::{CloudEnvironment, ProviderConfig};
pub use provider::AzurermProvider;

use carina_provider_sdk::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use carina_provider_sdk::resource::{Resource, ResourceId, State};

impl Provider for AzurermProvider {
    fn name(&self) -> &'static str {
        "azurerm"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resources::resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_resource(&id, identifier.as_deref()).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.read_data_source_resource(&resource).await })
    }
}
