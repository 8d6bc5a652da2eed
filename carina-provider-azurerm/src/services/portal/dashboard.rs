use std::collections::HashMap;

use async_trait::async_trait;
use carina_provider_sdk::provider::{ProviderError, ProviderResult};
use carina_provider_sdk::resource::{Attributes, ResourceId, State, Value};
use carina_provider_sdk::schema::{AttributeSchema, AttributeType, ResourceSchema};
use serde_json::json;

use crate::azure::{
    self, expand_tags, flatten_tags, format_resource_id, normalize_location,
    parse_azure_resource_id, tags_schema,
};
use crate::resources::{ArmContext, ArmResource, import_as_exists_check};
use crate::services::{get_or_none, id_error, require_exists};

const API_VERSION: &str = "2019-01-01-preview";

pub struct Dashboard;

/// Serialized the same way the API response is
pub fn canonical_json(value: &Value) -> Value {
    match value {
        Value::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(parsed) => Value::String(parsed.to_string()),
            Err(_) => value.clone(),
        },
        other => other.clone(),
    }
}

fn json_document() -> AttributeType {
    AttributeType::Custom {
        name: "JsonDocument".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) => serde_json::from_str::<serde_json::Value>(s)
                .map(|_| ())
                .map_err(|e| format!("dashboard_properties is not valid JSON: {}", e)),
            _ => Err("Expected string".to_string()),
        },
    }
}

fn expand(attrs: &HashMap<String, Value>) -> ProviderResult<serde_json::Value> {
    let properties = match attrs.get_str("dashboard_properties") {
        Some(raw) => serde_json::from_str::<serde_json::Value>(raw).map_err(|e| {
            ProviderError::validation(format!("Error parsing JSON: {}", e)).with_cause(e)
        })?,
        None => json!({}),
    };
    Ok(json!({
        "location": attrs.get_str("location").unwrap_or_default(),
        "tags": expand_tags(attrs),
        "properties": properties,
    }))
}

fn flatten(body: &serde_json::Value, name: &str, resource_group: &str) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert(
        "name".to_string(),
        Value::string(body.get("name").and_then(|v| v.as_str()).unwrap_or(name)),
    );
    attrs.insert("resource_group_name".to_string(), Value::string(resource_group));
    if let Some(location) = body.get("location").and_then(|v| v.as_str()) {
        attrs.insert(
            "location".to_string(),
            Value::string(normalize_location(location)),
        );
    }
    if let Some(props) = body.get("properties").filter(|p| !p.is_null()) {
        attrs.insert(
            "dashboard_properties".to_string(),
            Value::String(props.to_string()),
        );
    }
    attrs.insert("tags".to_string(), flatten_tags(body.get("tags")));
    attrs
}

impl Dashboard {
    async fn put(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        path: &str,
        attrs: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let name = attrs.get_str("name").unwrap_or_default();
        let resource_group = attrs.get_str("resource_group_name").unwrap_or_default();

        ctx.client
            .put_and_wait(path, API_VERSION, &expand(attrs)?)
            .await
            .map_err(|e| {
                e.with_context(format!(
                    "Error creating/updating Dashboard {:?} (Resource Group {:?})",
                    name, resource_group
                ))
            })?;

        let state = self.read(ctx, id, path).await?;
        require_exists(state, &format!("Dashboard {:?}", name))
    }
}

#[async_trait]
impl ArmResource for Dashboard {
    fn type_name(&self) -> &'static str {
        "azurerm_dashboard"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.type_name())
            .with_description("A shared Azure portal dashboard.")
            .attribute(
                AttributeSchema::new("name", azure::validate::dashboard_name())
                    .required()
                    .force_new(),
            )
            .attribute(azure::schema::resource_group_name_schema())
            .attribute(azure::schema::location_schema())
            .attribute(tags_schema())
            .attribute(
                AttributeSchema::new("dashboard_properties", json_document())
                    .optional_computed()
                    .with_normalizer(canonical_json)
                    .with_description("JSON document describing the dashboard lenses and parts."),
            )
    }

    async fn create(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        attrs: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let name = attrs.get_str("name").unwrap_or_default();
        let resource_group = attrs.get_str("resource_group_name").unwrap_or_default();
        let path = format_resource_id(
            ctx.subscription_id(),
            resource_group,
            "Microsoft.Portal",
            &[("dashboards", name)],
        );

        import_as_exists_check(ctx, self.type_name(), &path, API_VERSION).await?;
        self.put(ctx, id, &path, attrs).await
    }

    async fn read(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let mut parsed = parse_azure_resource_id(identifier).map_err(id_error)?;
        let name = parsed.pop_segment("dashboards").map_err(id_error)?;

        let body = get_or_none(&ctx.client, identifier, API_VERSION)
            .await
            .map_err(|e| {
                e.with_context(format!(
                    "Error making Read request on Dashboard {:?} (Resource Group {:?})",
                    name, parsed.resource_group
                ))
            })?;
        let Some(body) = body else {
            return Ok(State::not_found(id.clone()));
        };

        Ok(
            State::existing(id.clone(), flatten(&body, &name, &parsed.resource_group))
                .with_identifier(identifier),
        )
    }

    async fn update(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        self.put(ctx, id, identifier, to).await
    }

    async fn delete(
        &self,
        ctx: &ArmContext,
        _id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<()> {
        match ctx.client.delete_and_wait(identifier, API_VERSION).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.with_context(format!("Error deleting Dashboard {:?}", identifier))),
        }
    }
}
