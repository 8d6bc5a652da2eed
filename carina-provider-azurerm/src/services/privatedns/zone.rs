use std::collections::HashMap;

use async_trait::async_trait;
use carina_provider_sdk::provider::ProviderResult;
use carina_provider_sdk::resource::{Attributes, ResourceId, State, Value};
use carina_provider_sdk::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use serde_json::json;

use super::API_VERSION;
use crate::azure::{
    self, expand_tags, flatten_tags, format_resource_id, parse_azure_resource_id, tags_schema,
};
use crate::resources::{ArmContext, ArmResource, import_as_exists_check};
use crate::services::{get_or_none, id_error, require_exists};

/// Private DNS zones are not regional
const LOCATION: &str = "global";

const COUNTERS: [(&str, &str); 4] = [
    ("number_of_record_sets", "numberOfRecordSets"),
    ("max_number_of_record_sets", "maxNumberOfRecordSets"),
    (
        "max_number_of_virtual_network_links",
        "maxNumberOfVirtualNetworkLinks",
    ),
    (
        "max_number_of_virtual_network_links_with_registration",
        "maxNumberOfVirtualNetworkLinksWithRegistration",
    ),
];

pub struct PrivateDnsZone;

pub(super) fn zone_path(subscription_id: &str, resource_group: &str, zone: &str) -> String {
    format_resource_id(
        subscription_id,
        resource_group,
        "Microsoft.Network",
        &[("privateDnsZones", zone)],
    )
}

fn expand(attrs: &HashMap<String, Value>) -> serde_json::Value {
    json!({
        "location": LOCATION,
        "tags": expand_tags(attrs),
    })
}

fn flatten(body: &serde_json::Value, name: &str, resource_group: &str) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert(
        "name".to_string(),
        Value::string(body.get("name").and_then(|v| v.as_str()).unwrap_or(name)),
    );
    attrs.insert("resource_group_name".to_string(), Value::string(resource_group));
    for (attr, field) in COUNTERS {
        if let Some(n) = body
            .get("properties")
            .and_then(|p| p.get(field))
            .and_then(|v| v.as_i64())
        {
            attrs.insert(attr.to_string(), Value::Int(n));
        }
    }
    attrs.insert("tags".to_string(), flatten_tags(body.get("tags")));
    attrs
}

#[async_trait]
impl ArmResource for PrivateDnsZone {
    fn type_name(&self) -> &'static str {
        "azurerm_private_dns_zone"
    }

    fn schema(&self) -> ResourceSchema {
        let mut schema = ResourceSchema::new(self.type_name())
            .with_description("A Private DNS zone, resolvable from linked virtual networks.")
            .attribute(
                AttributeSchema::new("name", types::non_empty_string())
                    .required()
                    .force_new(),
            )
            .attribute(azure::schema::resource_group_name_schema())
            .attribute(tags_schema());
        for (attr, _) in COUNTERS {
            schema = schema.attribute(AttributeSchema::new(attr, AttributeType::Int).computed());
        }
        schema
    }

    async fn create(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        attrs: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let name = attrs.get_str("name").unwrap_or_default();
        let resource_group = attrs.get_str("resource_group_name").unwrap_or_default();
        let path = zone_path(ctx.subscription_id(), resource_group, name);

        import_as_exists_check(ctx, self.type_name(), &path, API_VERSION).await?;

        ctx.client
            .put_and_wait(&path, API_VERSION, &expand(attrs))
            .await
            .map_err(|e| {
                e.with_context(format!(
                    "Error creating Private DNS Zone {:?} (Resource Group {:?})",
                    name, resource_group
                ))
            })?;

        let state = self.read(ctx, id, &path).await?;
        require_exists(state, &format!("Private DNS Zone {:?}", name))
    }

    async fn read(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let mut parsed = parse_azure_resource_id(identifier).map_err(id_error)?;
        let name = parsed.pop_segment("privateDnsZones").map_err(id_error)?;
        parsed.validate_no_empty_segments(identifier).map_err(id_error)?;

        let body = get_or_none(&ctx.client, identifier, API_VERSION)
            .await
            .map_err(|e| {
                e.with_context(format!(
                    "Error reading Private DNS Zone {:?} (Resource Group {:?})",
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
        let name = to.get_str("name").unwrap_or_default();
        ctx.client
            .put_and_wait(identifier, API_VERSION, &expand(to))
            .await
            .map_err(|e| e.with_context(format!("Error updating Private DNS Zone {:?}", name)))?;

        let state = self.read(ctx, id, identifier).await?;
        require_exists(state, &format!("Private DNS Zone {:?}", name))
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
            Err(e) => Err(e.with_context(format!("Error deleting Private DNS Zone {:?}", identifier))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_is_always_global() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::string("internal.contoso.com"));
        assert_eq!(expand(&attrs)["location"], "global");
    }

    #[test]
    fn flatten_reads_counters() {
        let body = json!({
            "name": "internal.contoso.com",
            "location": "global",
            "properties": {
                "maxNumberOfRecordSets": 25000,
                "maxNumberOfVirtualNetworkLinks": 1000,
                "maxNumberOfVirtualNetworkLinksWithRegistration": 100,
                "numberOfRecordSets": 1,
                "provisioningState": "Succeeded"
            }
        });
        let attrs = flatten(&body, "internal.contoso.com", "rg");
        assert_eq!(attrs.get_int("number_of_record_sets"), Some(1));
        assert_eq!(attrs.get_int("max_number_of_record_sets"), Some(25000));
        assert_eq!(
            attrs.get_int("max_number_of_virtual_network_links_with_registration"),
            Some(100)
        );
        assert!(!attrs.contains_key("location"));
    }

    #[test]
    fn counters_are_computed() {
        let schema = PrivateDnsZone.schema();
        assert!(schema.attributes["number_of_record_sets"].is_computed_only());
        assert!(schema.attributes["name"].force_new);
    }
}
