use std::collections::HashMap;

use async_trait::async_trait;
use carina_provider_sdk::provider::ProviderResult;
use carina_provider_sdk::resource::{Attributes, ResourceId, State, Value};
use carina_provider_sdk::schema::{AttributeSchema, ResourceSchema};
use carina_provider_sdk::timeouts::Timeouts;
use serde_json::json;

use crate::azure::{
    self, expand_tags, flatten_tags, normalize_location, parse_azure_resource_id,
    resource_group_id, tags_schema,
};
use crate::resources::{ArmContext, ArmResource, import_as_exists_check};
use crate::services::{get_or_none, id_error, require_exists, response_id};

const API_VERSION: &str = "2019-05-01";

pub struct ResourceGroup;

fn expand(attrs: &HashMap<String, Value>) -> serde_json::Value {
    json!({
        "location": attrs.get_str("location").unwrap_or_default(),
        "tags": expand_tags(attrs),
    })
}

fn flatten(body: &serde_json::Value, name: &str) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert(
        "name".to_string(),
        Value::string(body.get("name").and_then(|v| v.as_str()).unwrap_or(name)),
    );
    if let Some(location) = body.get("location").and_then(|v| v.as_str()) {
        attrs.insert(
            "location".to_string(),
            Value::string(normalize_location(location)),
        );
    }
    attrs.insert("tags".to_string(), flatten_tags(body.get("tags")));
    attrs
}

#[async_trait]
impl ArmResource for ResourceGroup {
    fn type_name(&self) -> &'static str {
        "azurerm_resource_group"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.type_name())
            .with_description("A Resource Group, the container for related Azure resources.")
            .attribute(
                AttributeSchema::new("name", azure::validate::resource_group_name())
                    .required()
                    .force_new(),
            )
            .attribute(azure::schema::location_schema())
            .attribute(tags_schema())
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::uniform(90)
    }

    async fn create(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        attrs: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let name = attrs.get_str("name").unwrap_or_default();
        let path = resource_group_id(ctx.subscription_id(), name);

        import_as_exists_check(ctx, self.type_name(), &path, API_VERSION).await?;

        ctx.client
            .put_and_wait(&path, API_VERSION, &expand(attrs))
            .await
            .map_err(|e| e.with_context(format!("Error creating Resource Group {:?}", name)))?;

        let state = self.read(ctx, id, &path).await?;
        require_exists(state, &format!("Resource Group {:?}", name))
    }

    async fn read(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let parsed = parse_azure_resource_id(identifier).map_err(id_error)?;
        let name = parsed.resource_group;
        let path = resource_group_id(&parsed.subscription_id, &name);

        let body = get_or_none(&ctx.client, &path, API_VERSION)
            .await
            .map_err(|e| e.with_context(format!("Error reading Resource Group {:?}", name)))?;
        let Some(body) = body else {
            return Ok(State::not_found(id.clone()));
        };

        Ok(State::existing(id.clone(), flatten(&body, &name)).with_identifier(response_id(&body, &path)))
    }

    async fn update(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let name = to.get_str("name").unwrap_or_default();
        ctx.client
            .put_and_wait(identifier, API_VERSION, &expand(to))
            .await
            .map_err(|e| e.with_context(format!("Error updating Resource Group {:?}", name)))?;

        let state = self.read(ctx, id, identifier).await?;
        require_exists(state, &format!("Resource Group {:?}", name))
    }

    async fn delete(
        &self,
        ctx: &ArmContext,
        _id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<()> {
        let parsed = parse_azure_resource_id(identifier).map_err(id_error)?;
        let name = parsed.resource_group;
        let path = resource_group_id(&parsed.subscription_id, &name);

        match ctx.client.delete_and_wait(&path, API_VERSION).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.with_context(format!("Error deleting Resource Group {:?}", name))),
        }
    }
}
