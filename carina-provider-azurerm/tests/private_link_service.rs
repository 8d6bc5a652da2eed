//! Private Link Services against a mocked Resource Manager

mod common;

use carina_provider_sdk::provider::{Provider, ProviderErrorKind};
use carina_provider_sdk::resource::{Attributes, Resource, ResourceId, State, Value};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{provider, resource_path};

const API_VERSION: &str = "2019-09-01";

fn service_path() -> String {
    resource_path("pls-rg", "Microsoft.Network", "privateLinkServices/pls-01")
}

fn subnet_id() -> String {
    resource_path(
        "pls-rg",
        "Microsoft.Network",
        "virtualNetworks/vnet/subnets/pls-subnet",
    )
}

fn frontend_id() -> String {
    resource_path(
        "pls-rg",
        "Microsoft.Network",
        "loadBalancers/lb/frontendIPConfigurations/frontend",
    )
}

fn nat_config(name: &str, primary: bool, private_ip: Option<&str>) -> Value {
    let mut config: std::collections::HashMap<String, Value> = [
        ("name".to_string(), Value::string(name)),
        ("subnet_id".to_string(), Value::string(subnet_id())),
        ("primary".to_string(), Value::Bool(primary)),
    ]
    .into();
    if let Some(ip) = private_ip {
        config.insert("private_ip_address".to_string(), Value::string(ip));
    }
    Value::Map(config)
}

fn service(configs: Vec<Value>) -> Resource {
    Resource::new("azurerm_private_link_service", "pls")
        .with_attribute("name", Value::string("pls-01"))
        .with_attribute("resource_group_name", Value::string("pls-rg"))
        .with_attribute("location", Value::string("westeurope"))
        .with_attribute("nat_ip_configuration", Value::List(configs))
        .with_attribute(
            "load_balancer_frontend_ip_configuration_ids",
            Value::string_list([frontend_id()]),
        )
}

fn body(provisioning_state: &str) -> serde_json::Value {
    json!({
        "id": service_path(),
        "name": "pls-01",
        "location": "westeurope",
        "properties": {
            "provisioningState": provisioning_state,
            "alias": "pls-01.2f3b.westeurope.azure.privatelinkservice",
            "ipConfigurations": [{
                "name": "primary",
                "properties": {
                    "privateIPAddress": "10.5.1.17",
                    "privateIPAllocationMethod": "Static",
                    "privateIPAddressVersion": "IPv4",
                    "subnet": {"id": subnet_id()},
                    "primary": true
                }
            }],
            "loadBalancerFrontendIpConfigurations": [{"id": frontend_id()}],
            "networkInterfaces": [{"id": "/nic/1"}],
            "visibility": {"subscriptions": []},
            "autoApproval": {"subscriptions": []}
        }
    })
}

#[tokio::test]
async fn create_waits_for_the_service_to_be_ready() {
    let server = MockServer::start().await;
    let pls = service_path();

    Mock::given(method("GET"))
        .and(path(pls.as_str()))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(pls.as_str()))
        .and(query_param("api-version", API_VERSION))
        .and(body_partial_json(json!({
            "properties": {"ipConfigurations": [{
                "name": "primary",
                "properties": {
                    "privateIPAddress": "10.5.1.17",
                    "privateIPAllocationMethod": "Static",
                    "primary": true
                }
            }]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body("Succeeded")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(pls.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body("Updating")))
        .up_to_n_times(1)
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(pls.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body("Succeeded")))
        .mount(&server)
        .await;

    let state = provider(&server)
        .create(&service(vec![nat_config("primary", true, Some("10.5.1.17"))]))
        .await
        .unwrap();

    assert_eq!(state.identifier.as_deref(), Some(pls.as_str()));
    assert_eq!(
        state.attributes.get_str("alias"),
        Some("pls-01.2f3b.westeurope.azure.privatelinkservice")
    );
    let configs = state.attributes.get_list("nat_ip_configuration");
    assert_eq!(
        configs[0].as_map().unwrap().get_str("private_ip_address"),
        Some("10.5.1.17")
    );
}

#[tokio::test]
async fn failed_provisioning_state_stops_the_wait() {
    let server = MockServer::start().await;
    let pls = service_path();

    Mock::given(method("GET"))
        .and(path(pls.as_str()))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(pls.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body("Succeeded")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(pls.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body("Failed")))
        .mount(&server)
        .await;

    let err = provider(&server)
        .create(&service(vec![nat_config("primary", true, None)]))
        .await
        .unwrap_err();
    assert!(err.message.contains("Error waiting for Private Link Service"), "{}", err.message);
    assert!(err.message.contains("Failed"), "{}", err.message);
}

#[tokio::test]
async fn exactly_one_primary_configuration() {
    let server = MockServer::start().await;

    let err = provider(&server)
        .create(&service(vec![
            nat_config("first", true, None),
            nat_config("second", true, None),
        ]))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::Validation);
    assert!(err.message.contains("primary"));
}

#[tokio::test]
async fn primary_subnet_cannot_move() {
    let server = MockServer::start().await;
    let pls = service_path();

    let id = ResourceId::new("azurerm_private_link_service", "pls");
    let mut moved = nat_config("primary", true, None);
    if let Value::Map(config) = &mut moved {
        config.insert(
            "subnet_id".to_string(),
            Value::string(resource_path(
                "pls-rg",
                "Microsoft.Network",
                "virtualNetworks/vnet/subnets/other",
            )),
        );
    }
    let mut current = service(vec![nat_config("primary", true, None)]).attributes;
    current.insert(
        "nat_ip_configuration".to_string(),
        Value::List(vec![nat_config("primary", true, None)]),
    );
    let from = State::existing(id.clone(), current).with_identifier(pls.as_str());

    let err = provider(&server)
        .update(&id, &pls, &from, &service(vec![moved]))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::Validation);
    assert!(err.message.contains("subnet_id"), "{}", err.message);
}
