use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use carina_provider_sdk::provider::{ProviderError, ProviderResult};
use carina_provider_sdk::resource::{Attributes, ResourceId, State, Value};
use carina_provider_sdk::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use carina_provider_sdk::timeouts::Timeouts;
use carina_provider_sdk::wait::StateChangeConf;
use serde_json::json;

use super::parse::parse_private_link_service_id;
use crate::azure::{
    self, expand_string_slice, expand_sub_resource_ids, expand_tags, flatten_string_slice,
    flatten_sub_resource_ids, flatten_tags, format_resource_id, normalize_location, tags_schema,
};
use crate::client::ArmError;
use crate::resources::{ArmContext, ArmResource, import_as_exists_check};
use crate::services::{get_or_none, id_error, require_exists, wait_error};

pub(super) const API_VERSION: &str = "2019-09-01";

const READY_TIMEOUT: Duration = Duration::from_secs(60 * 60);

pub struct PrivateLinkService;

fn nat_ip_configuration_block() -> AttributeType {
    AttributeType::Block(vec![
        AttributeSchema::new("name", azure::validate::private_link_name())
            .required()
            .force_new(),
        AttributeSchema::new("private_ip_address", types::ipv4_address()),
        AttributeSchema::new(
            "private_ip_address_version",
            AttributeType::Enum(vec!["IPv4".to_string()]),
        )
        .with_default(Value::string("IPv4")),
        AttributeSchema::new("subnet_id", azure::validate::resource_id()).required(),
        AttributeSchema::new("primary", AttributeType::Bool)
            .required()
            .force_new(),
    ])
}

fn primary_configuration(attrs: &HashMap<String, Value>) -> Option<&HashMap<String, Value>> {
    attrs
        .get_list("nat_ip_configuration")
        .iter()
        .filter_map(Value::as_map)
        .find(|c| c.get_bool("primary") == Some(true))
}

/// Exactly one primary configuration, whose subnet and IP version are fixed
/// once the service exists
pub fn validate_nat_ip_configuration(
    current: Option<&HashMap<String, Value>>,
    desired: &HashMap<String, Value>,
) -> Result<(), String> {
    let primaries = desired
        .get_list("nat_ip_configuration")
        .iter()
        .filter_map(Value::as_map)
        .filter(|c| c.get_bool("primary") == Some(true))
        .count();
    if primaries != 1 {
        return Err(format!(
            "exactly one `nat_ip_configuration` must be marked as primary, got {}",
            primaries
        ));
    }

    let (Some(old), Some(new)) = (current.and_then(primary_configuration), primary_configuration(desired))
    else {
        return Ok(());
    };

    for field in ["subnet_id", "private_ip_address_version"] {
        let (before, after) = (old.get_str(field), new.get_str(field));
        if let (Some(before), Some(after)) = (before, after)
            && before != after
        {
            return Err(format!(
                "the `{}` of the primary `nat_ip_configuration` cannot be changed from {:?} to {:?}, the Private Link Service must be recreated",
                field, before, after
            ));
        }
    }
    Ok(())
}

fn expand_ip_configurations(configs: &[Value]) -> serde_json::Value {
    let items = configs
        .iter()
        .filter_map(Value::as_map)
        .map(|c| {
            let private_ip = c.get_str("private_ip_address").unwrap_or_default();
            let mut properties = json!({
                "privateIPAddressVersion": c.get_str("private_ip_address_version").unwrap_or("IPv4"),
                "privateIPAllocationMethod": if private_ip.is_empty() { "Dynamic" } else { "Static" },
                "subnet": { "id": c.get_str("subnet_id").unwrap_or_default() },
                "primary": c.get_bool("primary").unwrap_or(false),
            });
            if !private_ip.is_empty() {
                properties["privateIPAddress"] = json!(private_ip);
            }
            json!({
                "name": c.get_str("name").unwrap_or_default(),
                "properties": properties,
            })
        })
        .collect();
    serde_json::Value::Array(items)
}

fn flatten_ip_configurations(configs: Option<&serde_json::Value>) -> Value {
    let items = configs
        .and_then(serde_json::Value::as_array)
        .map(|arr| {
            arr.iter()
                .map(|item| {
                    let mut c = HashMap::new();
                    if let Some(name) = item.get("name").and_then(|v| v.as_str()) {
                        c.insert("name".to_string(), Value::string(name));
                    }
                    if let Some(props) = item.get("properties") {
                        if let Some(ip) = props.get("privateIPAddress").and_then(|v| v.as_str()) {
                            c.insert("private_ip_address".to_string(), Value::string(ip));
                        }
                        let version = props
                            .get("privateIPAddressVersion")
                            .and_then(|v| v.as_str())
                            .unwrap_or("IPv4");
                        c.insert(
                            "private_ip_address_version".to_string(),
                            Value::string(version),
                        );
                        if let Some(subnet) = props.pointer("/subnet/id").and_then(|v| v.as_str()) {
                            c.insert("subnet_id".to_string(), Value::string(subnet));
                        }
                        if let Some(primary) = props.get("primary").and_then(|v| v.as_bool()) {
                            c.insert("primary".to_string(), Value::Bool(primary));
                        }
                    }
                    Value::Map(c)
                })
                .collect()
        })
        .unwrap_or_default();
    Value::List(items)
}

fn expand(attrs: &HashMap<String, Value>) -> serde_json::Value {
    json!({
        "location": attrs.get_str("location").unwrap_or_default(),
        "tags": expand_tags(attrs),
        "properties": {
            "autoApproval": {
                "subscriptions": expand_string_slice(attrs.get_list("auto_approval_subscription_ids")),
            },
            "visibility": {
                "subscriptions": expand_string_slice(attrs.get_list("visibility_subscription_ids")),
            },
            "ipConfigurations": expand_ip_configurations(attrs.get_list("nat_ip_configuration")),
            "loadBalancerFrontendIpConfigurations": expand_sub_resource_ids(
                attrs.get_list("load_balancer_frontend_ip_configuration_ids"),
            ),
        },
    })
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

    if let Some(props) = body.get("properties") {
        if let Some(alias) = props.get("alias").and_then(|v| v.as_str()) {
            attrs.insert("alias".to_string(), Value::string(alias));
        }
        attrs.insert(
            "auto_approval_subscription_ids".to_string(),
            flatten_string_slice(props.pointer("/autoApproval/subscriptions")),
        );
        attrs.insert(
            "visibility_subscription_ids".to_string(),
            flatten_string_slice(props.pointer("/visibility/subscriptions")),
        );
        attrs.insert(
            "nat_ip_configuration".to_string(),
            flatten_ip_configurations(props.get("ipConfigurations")),
        );
        attrs.insert(
            "load_balancer_frontend_ip_configuration_ids".to_string(),
            flatten_sub_resource_ids(props.get("loadBalancerFrontendIpConfigurations")),
        );
        attrs.insert(
            "network_interface_ids".to_string(),
            flatten_sub_resource_ids(props.get("networkInterfaces")),
        );
    }

    attrs.insert("tags".to_string(), flatten_tags(body.get("tags")));
    attrs
}

impl PrivateLinkService {
    async fn create_update(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        current: Option<&State>,
        attrs: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let name = attrs.get_str("name").unwrap_or_default();
        let resource_group = attrs.get_str("resource_group_name").unwrap_or_default();
        let path = format_resource_id(
            ctx.subscription_id(),
            resource_group,
            "Microsoft.Network",
            &[("privateLinkServices", name)],
        );
        let description = format!(
            "Private Link Service {:?} (Resource Group {:?})",
            name, resource_group
        );

        validate_nat_ip_configuration(current.map(|s| &s.attributes), attrs)
            .map_err(ProviderError::validation)?;

        if current.is_none() {
            import_as_exists_check(ctx, self.type_name(), &path, API_VERSION).await?;
        }

        let verb = if current.is_none() { "creating" } else { "updating" };
        ctx.client
            .put_and_wait(&path, API_VERSION, &expand(attrs))
            .await
            .map_err(|e| e.with_context(format!("Error {} {}", verb, description)))?;

        log::debug!("Waiting for {} to become ready", description);
        let client = &ctx.client;
        let path_ref = path.as_str();
        StateChangeConf::new(["Pending", "Updating", "Creating"], ["Succeeded"], READY_TIMEOUT)
            .with_min_timeout(client.polling().state_min_timeout)
            .wait_for_state(|| async move {
                let body = client.get(path_ref, API_VERSION).await?;
                let state = body
                    .pointer("/properties/provisioningState")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .unwrap_or("Pending")
                    .to_string();
                Ok::<_, ArmError>(Some((body, state)))
            })
            .await
            .map_err(|e| wait_error(e, format!("Error waiting for {} to complete", description)))?;

        let state = self.read(ctx, id, &path).await?;
        require_exists(state, &description)
    }
}

#[async_trait]
impl ArmResource for PrivateLinkService {
    fn type_name(&self) -> &'static str {
        "azurerm_private_link_service"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.type_name())
            .with_description("A Private Link Service exposing a Standard Load Balancer to private endpoints.")
            .attribute(
                AttributeSchema::new("name", azure::validate::private_link_name())
                    .required()
                    .force_new(),
            )
            .attribute(azure::schema::location_schema())
            .attribute(azure::schema::resource_group_name_schema())
            .attribute(AttributeSchema::new(
                "auto_approval_subscription_ids",
                AttributeType::Set(Box::new(azure::validate::guid())),
            ))
            .attribute(AttributeSchema::new(
                "visibility_subscription_ids",
                AttributeType::Set(Box::new(azure::validate::guid())),
            ))
            .attribute(
                AttributeSchema::new("nat_ip_configuration", nat_ip_configuration_block())
                    .required()
                    .with_min_items(1)
                    .with_max_items(8)
                    .with_description(
                        "Once the primary configuration is set it can only change by recreating the service.",
                    ),
            )
            .attribute(
                AttributeSchema::new(
                    "load_balancer_frontend_ip_configuration_ids",
                    AttributeType::Set(Box::new(azure::validate::resource_id())),
                )
                .required()
                .with_min_items(1),
            )
            .attribute(AttributeSchema::new("alias", AttributeType::String).computed())
            .attribute(
                AttributeSchema::new(
                    "network_interface_ids",
                    AttributeType::Set(Box::new(AttributeType::String)),
                )
                .computed(),
            )
            .attribute(tags_schema())
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::uniform(60)
    }

    async fn create(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        attrs: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        self.create_update(ctx, id, None, attrs).await
    }

    async fn read(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let parsed = parse_private_link_service_id(identifier).map_err(id_error)?;
        let body = get_or_none(&ctx.client, identifier, API_VERSION)
            .await
            .map_err(|e| {
                e.with_context(format!(
                    "Error reading Private Link Service {:?} (Resource Group {:?})",
                    parsed.name, parsed.resource_group
                ))
            })?;
        let Some(body) = body else {
            return Ok(State::not_found(id.clone()));
        };

        Ok(
            State::existing(id.clone(), flatten(&body, &parsed.name, &parsed.resource_group))
                .with_identifier(identifier),
        )
    }

    async fn update(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        _identifier: &str,
        from: &State,
        to: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        self.create_update(ctx, id, Some(from), to).await
    }

    async fn delete(
        &self,
        ctx: &ArmContext,
        _id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<()> {
        let parsed = parse_private_link_service_id(identifier).map_err(id_error)?;
        match ctx.client.delete_and_wait(identifier, API_VERSION).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.with_context(format!(
                "Error deleting Private Link Service {:?} (Resource Group {:?})",
                parsed.name, parsed.resource_group
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBNET: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet/subnets/subnet";

    fn config(name: &str, primary: bool, private_ip: Option<&str>) -> Value {
        let mut c = HashMap::new();
        c.insert("name".to_string(), Value::string(name));
        c.insert("primary".to_string(), Value::Bool(primary));
        c.insert("subnet_id".to_string(), Value::string(SUBNET));
        c.insert("private_ip_address_version".to_string(), Value::string("IPv4"));
        if let Some(ip) = private_ip {
            c.insert("private_ip_address".to_string(), Value::string(ip));
        }
        Value::Map(c)
    }

    fn attrs_with(configs: Vec<Value>) -> HashMap<String, Value> {
        let mut attrs = HashMap::new();
        attrs.insert("nat_ip_configuration".to_string(), Value::List(configs));
        attrs
    }

    #[test]
    fn allocation_method_follows_private_ip() {
        let expanded = expand_ip_configurations(&[
            config("primary", true, None),
            config("secondary", false, Some("10.5.1.17")),
        ]);
        assert_eq!(expanded[0]["properties"]["privateIPAllocationMethod"], "Dynamic");
        assert!(expanded[0]["properties"].get("privateIPAddress").is_none());
        assert_eq!(expanded[1]["properties"]["privateIPAllocationMethod"], "Static");
        assert_eq!(expanded[1]["properties"]["privateIPAddress"], "10.5.1.17");
        assert_eq!(expanded[1]["properties"]["subnet"]["id"], SUBNET);
    }

    #[test]
    fn exactly_one_primary() {
        assert!(validate_nat_ip_configuration(None, &attrs_with(vec![config("a", true, None)])).is_ok());
        assert!(
            validate_nat_ip_configuration(
                None,
                &attrs_with(vec![config("a", true, None), config("b", true, None)])
            )
            .unwrap_err()
            .contains("got 2")
        );
        assert!(
            validate_nat_ip_configuration(None, &attrs_with(vec![config("a", false, None)]))
                .unwrap_err()
                .contains("got 0")
        );
    }

    #[test]
    fn primary_subnet_cannot_change() {
        let current = attrs_with(vec![config("a", true, None)]);
        let mut moved = HashMap::new();
        moved.insert("name".to_string(), Value::string("a"));
        moved.insert("primary".to_string(), Value::Bool(true));
        moved.insert("subnet_id".to_string(), Value::string(format!("{}2", SUBNET)));
        let desired = attrs_with(vec![Value::Map(moved)]);

        let err = validate_nat_ip_configuration(Some(&current), &desired).unwrap_err();
        assert!(err.contains("subnet_id"));

        let added_secondary = attrs_with(vec![
            config("a", true, None),
            config("b", false, Some("10.5.1.40")),
        ]);
        assert!(validate_nat_ip_configuration(Some(&current), &added_secondary).is_ok());
    }

    #[test]
    fn flatten_reads_nested_properties() {
        let body = json!({
            "name": "pls",
            "location": "West Europe",
            "properties": {
                "alias": "pls.guid.westeurope.azure.privatelinkservice",
                "autoApproval": {"subscriptions": ["00000000-0000-0000-0000-000000000000"]},
                "visibility": {"subscriptions": []},
                "ipConfigurations": [{
                    "name": "primary",
                    "properties": {
                        "privateIPAllocationMethod": "Dynamic",
                        "subnet": {"id": SUBNET},
                        "primary": true,
                        "privateIPAddressVersion": "IPv4"
                    }
                }],
                "loadBalancerFrontendIpConfigurations": [{"id": "/lb/frontend"}],
                "networkInterfaces": [{"id": "/nic/1"}],
                "provisioningState": "Succeeded"
            }
        });
        let attrs = flatten(&body, "pls", "rg");
        assert_eq!(attrs.get_str("location"), Some("westeurope"));
        assert_eq!(attrs.get_str("resource_group_name"), Some("rg"));
        assert_eq!(
            attrs.get_str("alias"),
            Some("pls.guid.westeurope.azure.privatelinkservice")
        );
        assert_eq!(attrs.get_string_list("network_interface_ids"), vec!["/nic/1"]);
        let nat = attrs.get_list("nat_ip_configuration")[0].as_map().unwrap();
        assert_eq!(nat.get_bool("primary"), Some(true));
        assert_eq!(nat.get_str("subnet_id"), Some(SUBNET));
        assert!(nat.get_str("private_ip_address").is_none());
    }
}
