//! Azure Resource Manager Provider
//!
//! Dispatches Carina operations to resource handlers after validating the
//! desired attributes, and runs every handler under its deadline.

use std::collections::HashMap;
use std::sync::Arc;

use carina_provider_sdk::provider::{ProviderError, ProviderResult};
use carina_provider_sdk::resource::{Resource, ResourceId, State, Value};
use carina_provider_sdk::schema::ResourceSchema;
use carina_provider_sdk::timeouts::with_timeout;

use crate::client::ArmClient;
use crate::config::{ConfigError, Features, ProviderConfig, provider_schema};
use crate::resources::{self, ArmContext, ArmDataSource, ArmResource};

/// Azure Resource Manager Provider
pub struct AzurermProvider {
    ctx: ArmContext,
    resources: HashMap<&'static str, Arc<dyn ArmResource>>,
    data_sources: HashMap<&'static str, Arc<dyn ArmDataSource>>,
}

impl AzurermProvider {
    /// Create a provider from validated configuration
    pub fn new(config: &ProviderConfig) -> ProviderResult<Self> {
        config.validate().map_err(config_error)?;
        let client = ArmClient::from_config(config).map_err(|e| {
            e.with_context("Failed to build the Azure Resource Manager client")
        })?;
        log::debug!(
            "Configured azurerm provider for subscription {} ({:?})",
            config.subscription_id,
            config.environment
        );
        Ok(Self::with_client(client, config.features))
    }

    /// Create a provider from `ARM_*` environment variables
    pub fn from_env() -> ProviderResult<Self> {
        let config = ProviderConfig::from_env().map_err(config_error)?;
        Self::new(&config)
    }

    /// Create a provider from a provider block, falling back to `ARM_*` variables
    pub fn from_config_attributes(attrs: &HashMap<String, Value>) -> ProviderResult<Self> {
        Self::from_lookup_and_attributes(|key| std::env::var(key).ok(), attrs)
    }

    /// Provider block attributes take precedence over the looked-up variables
    pub fn from_lookup_and_attributes<F>(
        lookup: F,
        attrs: &HashMap<String, Value>,
    ) -> ProviderResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::resolve_config(lookup, attrs)?;
        Self::new(&config)
    }

    fn resolve_config<F>(lookup: F, attrs: &HashMap<String, Value>) -> ProviderResult<ProviderConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Defaults are not filled in: unset attributes keep the environment's values
        if let Err(errors) = provider_schema().validate(attrs) {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(ProviderError::configuration(format!(
                "invalid provider configuration: {}",
                messages.join("; ")
            )));
        }
        let mut config = ProviderConfig::from_lookup(lookup).map_err(config_error)?;
        config.merge_attributes(attrs).map_err(config_error)?;
        Ok(config)
    }

    /// Create a provider around an existing client
    pub fn with_client(client: ArmClient, features: Features) -> Self {
        let resources = resources::resources()
            .into_iter()
            .map(|r| (r.type_name(), Arc::from(r)))
            .collect();
        let data_sources = resources::data_sources()
            .into_iter()
            .map(|d| (d.type_name(), Arc::from(d)))
            .collect();
        Self {
            ctx: ArmContext::new(client, features),
            resources,
            data_sources,
        }
    }

    /// Schema of a resource type or data source
    pub fn schema_for(&self, resource_type: &str) -> Option<ResourceSchema> {
        self.resources
            .get(resource_type)
            .map(|r| r.schema())
            .or_else(|| self.data_sources.get(resource_type).map(|d| d.schema()))
    }

    fn resource(&self, id: &ResourceId) -> ProviderResult<Arc<dyn ArmResource>> {
        self.resources
            .get(id.resource_type.as_str())
            .cloned()
            .ok_or_else(|| {
                ProviderError::unsupported(format!(
                    "Unknown resource type: {}",
                    id.resource_type
                ))
                .for_resource(id.clone())
            })
    }

    fn data_source(&self, id: &ResourceId) -> ProviderResult<Arc<dyn ArmDataSource>> {
        self.data_sources
            .get(id.resource_type.as_str())
            .cloned()
            .ok_or_else(|| {
                ProviderError::unsupported(format!("Unknown data source: {}", id.resource_type))
                    .for_resource(id.clone())
            })
    }

    /// Validate against the schema and fill defaults
    pub fn prepare_attributes(
        schema: &ResourceSchema,
        id: &ResourceId,
        attributes: &HashMap<String, Value>,
    ) -> ProviderResult<HashMap<String, Value>> {
        if let Err(errors) = schema.validate(attributes) {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(ProviderError::validation(messages.join("; ")).for_resource(id.clone()));
        }
        let mut prepared = attributes.clone();
        schema.prepare(&mut prepared);
        Ok(prepared)
    }

    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };
        let handler = self.resource(id)?;

        log::debug!("Reading {} ({})", id, identifier);
        let state = with_timeout(
            handler.timeouts().read,
            "read",
            handler.read(&self.ctx, id, identifier),
        )
        .await
        .map_err(|e| attach(e, id))?;

        if !state.exists {
            log::info!("{} {:?} does not exist - removing from state", id, identifier);
        }
        Ok(state)
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let handler = self.resource(&resource.id)?;
        let attrs = Self::prepare_attributes(&handler.schema(), &resource.id, &resource.attributes)?;

        log::debug!("Creating {}", resource.id);
        let state = with_timeout(
            handler.timeouts().create,
            "create",
            handler.create(&self.ctx, &resource.id, &attrs),
        )
        .await
        .map_err(|e| attach(e, &resource.id))?;
        log::debug!("Created {} ({:?})", resource.id, state.identifier);
        Ok(state)
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let handler = self.resource(id)?;
        let schema = handler.schema();
        let attrs = Self::prepare_attributes(&schema, id, &to.attributes)?;

        let prepared = Resource {
            id: to.id.clone(),
            attributes: attrs,
            read_only: to.read_only,
        };
        let replacements = schema.force_new_changes(from, &prepared);
        if !replacements.is_empty() {
            return Err(ProviderError::validation(format!(
                "cannot update {} in place, the resource must be replaced",
                replacements.join(", ")
            ))
            .for_resource(id.clone()));
        }

        log::debug!("Updating {} ({})", id, identifier);
        with_timeout(
            handler.timeouts().update,
            "update",
            handler.update(&self.ctx, id, identifier, from, &prepared.attributes),
        )
        .await
        .map_err(|e| attach(e, id))
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let handler = self.resource(id)?;

        log::debug!("Deleting {} ({})", id, identifier);
        with_timeout(
            handler.timeouts().delete,
            "delete",
            handler.delete(&self.ctx, id, identifier),
        )
        .await
        .map_err(|e| attach(e, id))
    }

    pub async fn read_data_source_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let handler = self.data_source(&resource.id)?;
        let attrs = Self::prepare_attributes(&handler.schema(), &resource.id, &resource.attributes)?;
        let prepared = Resource {
            id: resource.id.clone(),
            attributes: attrs,
            read_only: true,
        };

        log::debug!("Reading data source {}", resource.id);
        with_timeout(
            handler.timeouts().read,
            "read",
            handler.read(&self.ctx, &prepared),
        )
        .await
        .map_err(|e| attach(e, &resource.id))
    }
}

fn config_error(e: ConfigError) -> ProviderError {
    ProviderError::configuration(e.to_string()).with_cause(e)
}

fn attach(err: ProviderError, id: &ResourceId) -> ProviderError {
    if err.resource_id.is_some() {
        err
    } else {
        err.for_resource(id.clone())
    }
}
