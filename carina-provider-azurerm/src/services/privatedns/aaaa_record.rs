use std::collections::HashMap;
use std::net::Ipv6Addr;

use async_trait::async_trait;
use carina_provider_sdk::provider::ProviderResult;
use carina_provider_sdk::resource::{Attributes, ResourceId, State, Value};
use carina_provider_sdk::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use serde_json::json;

use super::API_VERSION;
use super::zone::zone_path;
use crate::azure::{self, expand_string_slice, expand_tags, flatten_tags, parse_azure_resource_id, tags_schema};
use crate::resources::{ArmContext, ArmResource, import_as_exists_check};
use crate::services::{get_or_none, id_error, require_exists};

pub struct PrivateDnsAaaaRecord;

/// Compressed form, so equal addresses compare equal
pub fn normalize_ipv6(address: &str) -> String {
    address
        .parse::<Ipv6Addr>()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| address.to_string())
}

fn normalize_records(value: &Value) -> Value {
    match value {
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|v| match v {
                    Value::String(s) => Value::String(normalize_ipv6(s)),
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn ttl() -> AttributeType {
    AttributeType::Custom {
        name: "Ttl".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| match value {
            Value::Int(n) if (1..=2_147_483_647).contains(n) => Ok(()),
            Value::Int(n) => Err(format!("ttl must be between 1 and 2147483647, got {}", n)),
            _ => Err("Expected integer".to_string()),
        },
    }
}

fn record_path(subscription_id: &str, resource_group: &str, zone: &str, name: &str) -> String {
    format!("{}/AAAA/{}", zone_path(subscription_id, resource_group, zone), name)
}

fn expand(attrs: &HashMap<String, Value>) -> serde_json::Value {
    let records: Vec<serde_json::Value> = expand_string_slice(attrs.get_list("records"))
        .into_iter()
        .map(|ip| json!({ "ipv6Address": ip }))
        .collect();
    json!({
        "properties": {
            "ttl": attrs.get_int("ttl").unwrap_or_default(),
            "aaaaRecords": records,
            "metadata": expand_tags(attrs),
        }
    })
}

fn flatten(
    body: &serde_json::Value,
    name: &str,
    zone: &str,
    resource_group: &str,
) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert(
        "name".to_string(),
        Value::string(body.get("name").and_then(|v| v.as_str()).unwrap_or(name)),
    );
    attrs.insert("zone_name".to_string(), Value::string(zone));
    attrs.insert("resource_group_name".to_string(), Value::string(resource_group));

    let props = body.get("properties");
    if let Some(ttl) = props.and_then(|p| p.get("ttl")).and_then(|v| v.as_i64()) {
        attrs.insert("ttl".to_string(), Value::Int(ttl));
    }
    if let Some(fqdn) = props.and_then(|p| p.get("fqdn")).and_then(|v| v.as_str()) {
        attrs.insert("fqdn".to_string(), Value::string(fqdn));
    }

    let records = props
        .and_then(|p| p.get("aaaaRecords"))
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|r| r.get("ipv6Address").and_then(|v| v.as_str()))
                .map(|ip| Value::String(normalize_ipv6(ip)))
                .collect()
        })
        .unwrap_or_default();
    attrs.insert("records".to_string(), Value::List(records));
    attrs.insert("tags".to_string(), flatten_tags(props.and_then(|p| p.get("metadata"))));
    attrs
}

#[async_trait]
impl ArmResource for PrivateDnsAaaaRecord {
    fn type_name(&self) -> &'static str {
        "azurerm_private_dns_aaaa_record"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.type_name())
            .with_description("An AAAA record set within a Private DNS zone.")
            .attribute(
                AttributeSchema::new("name", azure::validate::private_dns_record_name())
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("zone_name", types::non_empty_string())
                    .required()
                    .force_new(),
            )
            .attribute(azure::schema::resource_group_name_schema())
            .attribute(AttributeSchema::new("ttl", ttl()).required())
            .attribute(
                AttributeSchema::new(
                    "records",
                    AttributeType::Set(Box::new(types::ipv6_address())),
                )
                .required()
                .with_min_items(1)
                .with_normalizer(normalize_records),
            )
            .attribute(tags_schema())
            .attribute(AttributeSchema::new("fqdn", AttributeType::String).computed())
    }

    async fn create(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        attrs: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let name = attrs.get_str("name").unwrap_or_default();
        let zone = attrs.get_str("zone_name").unwrap_or_default();
        let resource_group = attrs.get_str("resource_group_name").unwrap_or_default();
        let path = record_path(ctx.subscription_id(), resource_group, zone, name);

        import_as_exists_check(ctx, self.type_name(), &path, API_VERSION).await?;

        ctx.client
            .put_and_wait(&path, API_VERSION, &expand(attrs))
            .await
            .map_err(|e| {
                e.with_context(format!(
                    "Error creating/updating Private DNS AAAA Record {:?} (Zone {:?} / Resource Group {:?})",
                    name, zone, resource_group
                ))
            })?;

        let state = self.read(ctx, id, &path).await?;
        require_exists(state, &format!("Private DNS AAAA Record {:?}", name))
    }

    async fn read(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let mut parsed = parse_azure_resource_id(identifier).map_err(id_error)?;
        let zone = parsed.pop_segment("privateDnsZones").map_err(id_error)?;
        let name = parsed.pop_segment("AAAA").map_err(id_error)?;
        parsed.validate_no_empty_segments(identifier).map_err(id_error)?;

        let body = get_or_none(&ctx.client, identifier, API_VERSION)
            .await
            .map_err(|e| {
                e.with_context(format!(
                    "Error retrieving Private DNS AAAA Record {:?} (Zone {:?} / Resource Group {:?})",
                    name, zone, parsed.resource_group
                ))
            })?;
        let Some(body) = body else {
            return Ok(State::not_found(id.clone()));
        };

        Ok(State::existing(
            id.clone(),
            flatten(&body, &name, &zone, &parsed.resource_group),
        )
        .with_identifier(identifier))
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
            .map_err(|e| {
                e.with_context(format!(
                    "Error creating/updating Private DNS AAAA Record {:?}",
                    name
                ))
            })?;

        let state = self.read(ctx, id, identifier).await?;
        require_exists(state, &format!("Private DNS AAAA Record {:?}", name))
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
            Err(e) => Err(e.with_context(format!(
                "Error deleting Private DNS AAAA Record {:?}",
                identifier
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv6_addresses_are_compressed() {
        assert_eq!(
            normalize_ipv6("fd5d:70bc:930e:d008:0000:0000:0000:7334"),
            "fd5d:70bc:930e:d008::7334"
        );
        assert_eq!(normalize_ipv6("FD73:5E76:3AB5:D2E9::1"), "fd73:5e76:3ab5:d2e9::1");
        assert_eq!(normalize_ipv6("not-an-ip"), "not-an-ip");
    }

    #[test]
    fn expand_builds_record_set() {
        let mut attrs = HashMap::new();
        attrs.insert("ttl".to_string(), Value::Int(300));
        attrs.insert(
            "records".to_string(),
            Value::string_list(["fd5d:70bc:930e:d008::7334"]),
        );
        let body = expand(&attrs);
        assert_eq!(body["properties"]["ttl"], 300);
        assert_eq!(
            body["properties"]["aaaaRecords"],
            json!([{ "ipv6Address": "fd5d:70bc:930e:d008::7334" }])
        );
        assert_eq!(body["properties"]["metadata"], json!({}));
    }

    #[test]
    fn prepared_records_match_flattened_records() {
        let schema = PrivateDnsAaaaRecord.schema();
        let mut desired = HashMap::new();
        desired.insert(
            "records".to_string(),
            Value::string_list(["fd5d:70bc:930e:d008:0000:0000:0000:7334"]),
        );
        schema.prepare(&mut desired);

        let body = json!({
            "name": "www",
            "properties": {
                "ttl": 300,
                "fqdn": "www.internal.contoso.com.",
                "aaaaRecords": [{"ipv6Address": "fd5d:70bc:930e:d008::7334"}],
                "metadata": {"env": "test"}
            }
        });
        let state = flatten(&body, "www", "internal.contoso.com", "rg");
        assert_eq!(desired["records"], state["records"]);
        assert_eq!(state.get_str("fqdn"), Some("www.internal.contoso.com."));
        assert_eq!(state.get_string_map("tags")["env"], "test");
    }

    #[test]
    fn records_equal_after_compression_are_duplicates() {
        let schema = PrivateDnsAaaaRecord.schema();
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::string("www"));
        attrs.insert("zone_name".to_string(), Value::string("internal.contoso.com"));
        attrs.insert("resource_group_name".to_string(), Value::string("rg"));
        attrs.insert("ttl".to_string(), Value::Int(300));
        attrs.insert(
            "records".to_string(),
            Value::string_list(["fd5d::1", "FD5D:0000::1"]),
        );

        let errors = schema.validate(&attrs).unwrap_err();
        assert!(errors[0].to_string().contains("Duplicate set element"));
    }

    #[test]
    fn ttl_bounds() {
        let t = ttl();
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(2_147_483_647)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(2_147_483_648)).is_err());
    }
}
