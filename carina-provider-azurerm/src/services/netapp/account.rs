use std::collections::HashMap;

use async_trait::async_trait;
use carina_provider_sdk::provider::ProviderResult;
use carina_provider_sdk::resource::{Attributes, ResourceId, State, Value};
use carina_provider_sdk::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use carina_provider_sdk::wait::StateChangeConf;
use serde_json::json;

use crate::azure::{
    self, expand_tags, flatten_tags, format_resource_id, normalize_location,
    parse_azure_resource_id, tags_schema,
};
use crate::client::ArmError;
use crate::resources::{ArmContext, ArmResource, import_as_exists_check};
use crate::services::{get_or_none, id_error, require_exists, wait_error};

const API_VERSION: &str = "2019-06-01";

const DEFAULT_ORGANIZATIONAL_UNIT: &str = "CN=Computers";

pub struct NetAppAccount;

fn active_directory_block() -> AttributeType {
    AttributeType::Block(vec![
        AttributeSchema::new(
            "dns_servers",
            AttributeType::List(Box::new(types::ipv4_address())),
        )
        .required()
        .with_min_items(1),
        AttributeSchema::new("domain", types::non_empty_string()).required(),
        AttributeSchema::new("smb_server_name", types::non_empty_string()).required(),
        AttributeSchema::new("username", types::non_empty_string()).required(),
        AttributeSchema::new("password", types::non_empty_string())
            .required()
            .sensitive(),
        AttributeSchema::new("organizational_unit", AttributeType::String)
            .with_default(Value::string(DEFAULT_ORGANIZATIONAL_UNIT)),
    ])
}

fn expand_active_directories(blocks: &[Value]) -> serde_json::Value {
    let items = blocks
        .iter()
        .filter_map(Value::as_map)
        .map(|ad| {
            json!({
                "dns": ad.get_string_list("dns_servers").join(","),
                "domain": ad.get_str("domain").unwrap_or_default(),
                "smbServerName": ad.get_str("smb_server_name").unwrap_or_default(),
                "username": ad.get_str("username").unwrap_or_default(),
                "password": ad.get_str("password").unwrap_or_default(),
                "organizationalUnit": ad
                    .get_str("organizational_unit")
                    .unwrap_or(DEFAULT_ORGANIZATIONAL_UNIT),
            })
        })
        .collect();
    serde_json::Value::Array(items)
}

/// The API never returns the password
fn flatten_active_directories(directories: Option<&serde_json::Value>) -> Value {
    let items = directories
        .and_then(serde_json::Value::as_array)
        .map(|arr| {
            arr.iter()
                .map(|ad| {
                    let field = |key: &str| ad.get(key).and_then(|v| v.as_str());
                    let mut block = HashMap::new();
                    let dns: Vec<String> = field("dns")
                        .map(|s| {
                            s.split(',')
                                .map(str::trim)
                                .filter(|s| !s.is_empty())
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();
                    block.insert("dns_servers".to_string(), Value::string_list(dns));
                    for (attr, key) in [
                        ("domain", "domain"),
                        ("smb_server_name", "smbServerName"),
                        ("username", "username"),
                        ("organizational_unit", "organizationalUnit"),
                    ] {
                        if let Some(v) = field(key) {
                            block.insert(attr.to_string(), Value::string(v));
                        }
                    }
                    Value::Map(block)
                })
                .collect()
        })
        .unwrap_or_default();
    Value::List(items)
}

/// Copy configured passwords into the read state, block by block
fn keep_passwords(state: &mut State, desired: &HashMap<String, Value>) {
    let passwords: Vec<Option<&Value>> = desired
        .get_list("active_directory")
        .iter()
        .map(|b| b.as_map().and_then(|m| m.get("password")))
        .collect();

    if let Some(Value::List(blocks)) = state.attributes.get_mut("active_directory") {
        for (block, password) in blocks.iter_mut().zip(passwords) {
            if let (Value::Map(block), Some(password)) = (block, password) {
                block.insert("password".to_string(), password.clone());
            }
        }
    }
}

fn expand(attrs: &HashMap<String, Value>) -> serde_json::Value {
    json!({
        "location": attrs.get_str("location").unwrap_or_default(),
        "tags": expand_tags(attrs),
        "properties": {
            "activeDirectories": expand_active_directories(attrs.get_list("active_directory")),
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
    attrs.insert(
        "active_directory".to_string(),
        flatten_active_directories(body.pointer("/properties/activeDirectories")),
    );
    attrs.insert("tags".to_string(), flatten_tags(body.get("tags")));
    attrs
}

impl NetAppAccount {
    async fn put(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        path: &str,
        attrs: &HashMap<String, Value>,
        action: &str,
    ) -> ProviderResult<State> {
        let name = attrs.get_str("name").unwrap_or_default();
        let resource_group = attrs.get_str("resource_group_name").unwrap_or_default();

        ctx.client
            .put_and_wait(path, API_VERSION, &expand(attrs))
            .await
            .map_err(|e| {
                e.with_context(format!(
                    "Error {} NetApp Account {:?} (Resource Group {:?})",
                    action, name, resource_group
                ))
            })?;

        let mut state = require_exists(
            self.read(ctx, id, path).await?,
            &format!("NetApp Account {:?}", name),
        )?;
        keep_passwords(&mut state, attrs);
        Ok(state)
    }
}

#[async_trait]
impl ArmResource for NetAppAccount {
    fn type_name(&self) -> &'static str {
        "azurerm_netapp_account"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.type_name())
            .with_description("An Azure NetApp Files account.")
            .attribute(
                AttributeSchema::new("name", azure::validate::netapp_account_name())
                    .required()
                    .force_new(),
            )
            .attribute(azure::schema::resource_group_name_schema())
            .attribute(azure::schema::location_schema())
            .attribute(
                AttributeSchema::new("active_directory", active_directory_block())
                    .with_max_items(1),
            )
            .attribute(tags_schema())
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
            "Microsoft.NetApp",
            &[("netAppAccounts", name)],
        );

        import_as_exists_check(ctx, self.type_name(), &path, API_VERSION).await?;
        self.put(ctx, id, &path, attrs, "creating").await
    }

    async fn read(
        &self,
        ctx: &ArmContext,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let mut parsed = parse_azure_resource_id(identifier).map_err(id_error)?;
        let name = parsed.pop_segment("netAppAccounts").map_err(id_error)?;

        let body = get_or_none(&ctx.client, identifier, API_VERSION)
            .await
            .map_err(|e| {
                e.with_context(format!(
                    "Error reading NetApp Account {:?} (Resource Group {:?})",
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
        self.put(ctx, id, identifier, to, "updating").await
    }

    async fn delete(
        &self,
        ctx: &ArmContext,
        _id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<()> {
        let mut parsed = parse_azure_resource_id(identifier).map_err(id_error)?;
        let name = parsed.pop_segment("netAppAccounts").map_err(id_error)?;
        let description = format!(
            "NetApp Account {:?} (Resource Group {:?})",
            name, parsed.resource_group
        );

        match ctx.client.delete_and_wait(identifier, API_VERSION).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.with_context(format!("Error deleting {}", description))),
        }

        // The account lingers for a while after the operation completes
        log::debug!("Waiting for {} to be deleted", description);
        let client = &ctx.client;
        StateChangeConf::new(["200"], ["404"], self.timeouts().delete)
            .with_min_timeout(client.polling().state_min_timeout)
            .wait_for_state(|| async move {
                match client.get(identifier, API_VERSION).await {
                    Ok(_) => Ok(Some(((), "200".to_string()))),
                    Err(e) if e.is_not_found() => Ok(Some(((), "404".to_string()))),
                    Err(e) => Err::<_, ArmError>(e),
                }
            })
            .await
            .map_err(|e| wait_error(e, format!("Error waiting for {} to be deleted", description)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> HashMap<String, Value> {
        let mut ad = HashMap::new();
        ad.insert(
            "dns_servers".to_string(),
            Value::string_list(["1.2.3.4", "1.2.3.5"]),
        );
        ad.insert("domain".to_string(), Value::string("westcentralus.com"));
        ad.insert("smb_server_name".to_string(), Value::string("SMBSERVER"));
        ad.insert("username".to_string(), Value::string("aduser"));
        ad.insert("password".to_string(), Value::string("aduserpwd"));
        ad
    }

    #[test]
    fn expand_joins_dns_servers_and_defaults_ou() {
        let expanded = expand_active_directories(&[Value::Map(directory())]);
        assert_eq!(expanded[0]["dns"], "1.2.3.4,1.2.3.5");
        assert_eq!(expanded[0]["organizationalUnit"], "CN=Computers");
        assert_eq!(expanded[0]["password"], "aduserpwd");
    }

    #[test]
    fn schema_fills_default_organizational_unit() {
        let mut attrs = HashMap::new();
        attrs.insert(
            "active_directory".to_string(),
            Value::List(vec![Value::Map(directory())]),
        );
        NetAppAccount.schema().prepare(&mut attrs);
        let ad = attrs.get_list("active_directory")[0].as_map().unwrap();
        assert_eq!(ad.get_str("organizational_unit"), Some("CN=Computers"));
    }

    #[test]
    fn read_keeps_configured_password() {
        let body = json!({
            "name": "acctest-NetAppAccount",
            "location": "westcentralus",
            "properties": {
                "activeDirectories": [{
                    "dns": "1.2.3.4, 1.2.3.5",
                    "domain": "westcentralus.com",
                    "smbServerName": "SMBSERVER",
                    "username": "aduser",
                    "organizationalUnit": "OU=FirstLevel"
                }]
            }
        });
        let mut state = State::existing(
            ResourceId::new("azurerm_netapp_account", "test"),
            flatten(&body, "acctest-NetAppAccount", "rg"),
        );
        let ad = state.attributes.get_list("active_directory")[0].as_map().unwrap();
        assert_eq!(ad.get_string_list("dns_servers"), vec!["1.2.3.4", "1.2.3.5"]);
        assert!(ad.get_str("password").is_none());

        let mut desired = HashMap::new();
        desired.insert(
            "active_directory".to_string(),
            Value::List(vec![Value::Map(directory())]),
        );
        keep_passwords(&mut state, &desired);
        let ad = state.attributes.get_list("active_directory")[0].as_map().unwrap();
        assert_eq!(ad.get_str("password"), Some("aduserpwd"));
        assert_eq!(ad.get_str("organizational_unit"), Some("OU=FirstLevel"));
    }
}
