//! Resource handler framework and registry
//!
//! Each Azure resource type implements `ArmResource`, each data source
//! `ArmDataSource`. The provider looks handlers up by type name.

use std::collections::HashMap;

use async_trait::async_trait;
use carina_provider_sdk::provider::{ProviderError, ProviderResult, ResourceType};
use carina_provider_sdk::resource::{Resource, ResourceId, State, Value};
use carina_provider_sdk::schema::ResourceSchema;
use carina_provider_sdk::timeouts::Timeouts;

use crate::client::ArmClient;
use crate::config::Features;
use crate::services;

/// What every handler needs to talk to Azure
#[derive(Clone)]
pub struct ArmContext {
    pub client: ArmClient,
    pub features: Features,
}

impl ArmContext {
    pub fn new(client: ArmClient, features: Features) -> Self {
        Self { client, features }
    }

    pub fn subscription_id(&self) -> &str {
        self.client.subscription_id()
    }
}

/// A managed Azure resource type
#[async_trait]
pub trait ArmResource: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Create from prepared, validated attributes
    async fn create(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        attrs: &HashMap<String, Value>,
    ) -> ProviderResult<State>;

    /// Read by ARM ID; a vanished resource is `State::not_found`
    async fn read(&self, ctx: &ArmContext, id: &ResourceId, identifier: &str)
    -> ProviderResult<State>;

    async fn update(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &HashMap<String, Value>,
    ) -> ProviderResult<State>;

    /// Delete by ARM ID; a vanished resource is not an error
    async fn delete(&self, ctx: &ArmContext, id: &ResourceId, identifier: &str)
    -> ProviderResult<()>;
}

/// A read-only Azure lookup
#[async_trait]
pub trait ArmDataSource: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    async fn read(&self, ctx: &ArmContext, resource: &Resource) -> ProviderResult<State>;
}

/// Refuse to create a resource that already exists outside of state
///
/// Skipped when `resources_must_be_imported` is off.
pub async fn import_as_exists_check(
    ctx: &ArmContext,
    resource_type: &str,
    path: &str,
    api_version: &str,
) -> ProviderResult<()> {
    if !ctx.features.resources_must_be_imported {
        return Ok(());
    }

    log::debug!("Checking for an existing {} at {}", resource_type, path);
    let existing = ctx.client.exists(path, api_version).await.map_err(|e| {
        e.with_context(format!(
            "Error checking for presence of existing {} {:?}",
            resource_type, path
        ))
    })?;

    match existing {
        Some(existing_id) => Err(ProviderError::already_exists(resource_type, &existing_id)),
        None => Ok(()),
    }
}

/// Every managed resource type
pub fn resources() -> Vec<Box<dyn ArmResource>> {
    vec![
        Box::new(services::resource::ResourceGroup),
        Box::new(services::network::PrivateLinkService),
        Box::new(services::privatedns::PrivateDnsZone),
        Box::new(services::privatedns::PrivateDnsAaaaRecord),
        Box::new(services::portal::Dashboard),
        Box::new(services::netapp::NetAppAccount),
    ]
}

/// Every data source
pub fn data_sources() -> Vec<Box<dyn ArmDataSource>> {
    vec![
        Box::new(services::network::PrivateLinkEndpointConnection),
        Box::new(services::advisor::AdvisorRecommendations),
    ]
}

/// Schema and timeouts of a handler, as seen by Carina
struct HandlerType {
    name: &'static str,
    schema: ResourceSchema,
    timeouts: Timeouts,
    data_source: bool,
}

impl ResourceType for HandlerType {
    fn name(&self) -> &'static str {
        self.name
    }

    fn schema(&self) -> ResourceSchema {
        self.schema.clone()
    }

    fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    fn is_data_source(&self) -> bool {
        self.data_source
    }
}

/// Returns all resource types and data sources supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    let managed = resources().into_iter().map(|r| {
        Box::new(HandlerType {
            name: r.type_name(),
            schema: r.schema(),
            timeouts: r.timeouts(),
            data_source: false,
        }) as Box<dyn ResourceType>
    });
    let lookups = data_sources().into_iter().map(|d| {
        Box::new(HandlerType {
            name: d.type_name(),
            schema: d.schema(),
            timeouts: d.timeouts(),
            data_source: true,
        }) as Box<dyn ResourceType>
    });
    managed.chain(lookups).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn type_names_are_unique_and_prefixed() {
        let types = resource_types();
        let names: HashSet<&str> = types.iter().map(|t| t.name()).collect();
        assert_eq!(names.len(), types.len());
        assert!(names.iter().all(|n| n.starts_with("azurerm_")));
    }

    #[test]
    fn schemas_match_their_type_names() {
        for t in resource_types() {
            assert_eq!(t.schema().resource_type, t.name());
        }
    }

    #[test]
    fn data_sources_are_flagged() {
        let types = resource_types();
        let advisor = types
            .iter()
            .find(|t| t.name() == "azurerm_advisor_recommendations")
            .unwrap();
        assert!(advisor.is_data_source());
        assert_eq!(advisor.timeouts().read, std::time::Duration::from_secs(600));

        let rg = types
            .iter()
            .find(|t| t.name() == "azurerm_resource_group")
            .unwrap();
        assert!(!rg.is_data_source());
    }
}
