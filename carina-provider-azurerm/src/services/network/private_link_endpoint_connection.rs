use std::collections::HashMap;

use async_trait::async_trait;
use carina_provider_sdk::provider::{ProviderError, ProviderResult};
use carina_provider_sdk::resource::{Attributes, Resource, State, Value};
use carina_provider_sdk::schema::{AttributeSchema, AttributeType, ResourceSchema};
use serde_json::Value as Json;

use super::parse::parse_network_interface_id;
use super::private_link_service::API_VERSION;
use crate::azure::{self, format_resource_id, normalize_location};
use crate::resources::{ArmContext, ArmDataSource};
use crate::services::get_or_none;

/// Connections of a private endpoint to private link services
pub struct PrivateLinkEndpointConnection;

/// First IP configuration's private address of a network interface
///
/// Lookup failures are tolerated and read as an empty address.
async fn private_ip_address(ctx: &ArmContext, network_interface_id: &str) -> String {
    if let Err(e) = parse_network_interface_id(network_interface_id) {
        log::warn!(
            "Cannot parse network interface ID {:?}: {}",
            network_interface_id,
            e
        );
        return String::new();
    }

    match ctx.client.get(network_interface_id, API_VERSION).await {
        Ok(nic) => nic
            .pointer("/properties/ipConfigurations/0/properties/privateIPAddress")
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_string(),
        Err(e) => {
            log::warn!(
                "Cannot read network interface {:?}: {}",
                network_interface_id,
                e
            );
            String::new()
        }
    }
}

fn flatten_connections(connections: Option<&Json>, private_ip: &str) -> impl Iterator<Item = Value> {
    connections
        .and_then(Json::as_array)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(move |item| {
            let mut c = HashMap::new();
            c.insert("private_ip_address".to_string(), Value::string(private_ip));
            if let Some(name) = item.get("name").and_then(Json::as_str) {
                c.insert("name".to_string(), Value::string(name));
            }
            if let Some(state) = item.pointer("/properties/privateLinkServiceConnectionState") {
                if let Some(status) = state.get("status").and_then(Json::as_str) {
                    c.insert("status".to_string(), Value::string(status));
                }
                if let Some(description) = state.get("description").and_then(Json::as_str) {
                    c.insert("request_response".to_string(), Value::string(description));
                }
            }
            Value::Map(c)
        })
}

/// Automatic connections first, then manual ones
pub fn flatten_service_connections(properties: &Json, private_ip: &str) -> Value {
    let automatic = flatten_connections(properties.get("privateLinkServiceConnections"), private_ip);
    let manual = flatten_connections(
        properties.get("manualPrivateLinkServiceConnections"),
        private_ip,
    );
    Value::List(automatic.chain(manual).collect())
}

#[async_trait]
impl ArmDataSource for PrivateLinkEndpointConnection {
    fn type_name(&self) -> &'static str {
        "azurerm_private_link_endpoint_connection"
    }

    fn schema(&self) -> ResourceSchema {
        let computed = |name: &str| AttributeSchema::new(name, AttributeType::String).computed();
        ResourceSchema::new(self.type_name())
            .with_description("Connection details of an existing private endpoint.")
            .attribute(AttributeSchema::new("name", azure::validate::private_link_name()).required())
            .attribute(azure::schema::location_for_data_source())
            .attribute(azure::schema::resource_group_name_for_data_source())
            .attribute(
                AttributeSchema::new(
                    "private_service_connection",
                    AttributeType::Block(vec![
                        computed("name"),
                        computed("request_response"),
                        computed("status"),
                        computed("private_ip_address"),
                    ]),
                )
                .computed(),
            )
    }

    async fn read(&self, ctx: &ArmContext, resource: &Resource) -> ProviderResult<State> {
        let name = resource.attributes.get_str("name").unwrap_or_default();
        let resource_group = resource
            .attributes
            .get_str("resource_group_name")
            .unwrap_or_default();
        let path = format_resource_id(
            ctx.subscription_id(),
            resource_group,
            "Microsoft.Network",
            &[("privateEndpoints", name)],
        );

        let body = get_or_none(&ctx.client, &path, API_VERSION)
            .await
            .map_err(|e| {
                e.with_context(format!(
                    "Error reading Private Link Endpoint {:?} (Resource Group {:?})",
                    name, resource_group
                ))
            })?;
        let Some(body) = body else {
            return Ok(State::not_found(resource.id.clone()));
        };

        let Some(endpoint_id) = body.get("id").and_then(Json::as_str).filter(|s| !s.is_empty())
        else {
            return Err(ProviderError::new(format!(
                "API returns a nil/empty id on Private Link Endpoint {:?} (Resource Group {:?})",
                name, resource_group
            )));
        };

        let mut attrs = HashMap::new();
        attrs.insert(
            "name".to_string(),
            Value::string(body.get("name").and_then(Json::as_str).unwrap_or(name)),
        );
        attrs.insert("resource_group_name".to_string(), Value::string(resource_group));
        if let Some(location) = body.get("location").and_then(Json::as_str) {
            attrs.insert(
                "location".to_string(),
                Value::string(normalize_location(location)),
            );
        }

        if let Some(props) = body.get("properties") {
            let nic_id = props
                .pointer("/networkInterfaces/0/id")
                .and_then(Json::as_str)
                .filter(|s| !s.is_empty());
            let private_ip = match nic_id {
                Some(nic_id) => private_ip_address(ctx, nic_id).await,
                None => String::new(),
            };
            attrs.insert(
                "private_service_connection".to_string(),
                flatten_service_connections(props, &private_ip),
            );
        }

        Ok(State::existing(resource.id.clone(), attrs).with_identifier(endpoint_id))
    }
}
