//! Portal dashboards against a mocked Resource Manager

mod common;

use carina_provider_sdk::provider::{Provider, ProviderErrorKind};
use carina_provider_sdk::resource::{Attributes, Resource, ResourceId, Value};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{provider, resource_path};

const API_VERSION: &str = "2019-01-01-preview";

fn dashboard_path(name: &str) -> String {
    resource_path("portal-rg", "Microsoft.Portal", &format!("dashboards/{}", name))
}

#[tokio::test]
async fn create_sends_the_parsed_document() {
    let server = MockServer::start().await;
    let dashboard = dashboard_path("ops-board");
    let properties = json!({"lenses": {"0": {"order": 0, "parts": {}}}});

    Mock::given(method("GET"))
        .and(path(dashboard.as_str()))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(dashboard.as_str()))
        .and(query_param("api-version", API_VERSION))
        .and(body_json(json!({
            "location": "westeurope",
            "tags": {"hidden-title": "Ops"},
            "properties": properties
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": dashboard})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(dashboard.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": dashboard,
            "name": "ops-board",
            "location": "westeurope",
            "tags": {"hidden-title": "Ops"},
            "properties": properties
        })))
        .mount(&server)
        .await;

    let resource = Resource::new("azurerm_dashboard", "ops")
        .with_attribute("name", Value::string("ops-board"))
        .with_attribute("resource_group_name", Value::string("portal-rg"))
        .with_attribute("location", Value::string("westeurope"))
        .with_attribute(
            "tags",
            Value::Map([("hidden-title".to_string(), Value::string("Ops"))].into()),
        )
        .with_attribute(
            "dashboard_properties",
            Value::string("{\n  \"lenses\": {\"0\": {\"order\": 0, \"parts\": {}}}\n}"),
        );
    let state = provider(&server).create(&resource).await.unwrap();

    assert_eq!(
        state.attributes.get_str("dashboard_properties"),
        Some(properties.to_string().as_str())
    );
}

#[tokio::test]
async fn names_with_spaces_are_rejected() {
    let server = MockServer::start().await;

    let resource = Resource::new("azurerm_dashboard", "ops")
        .with_attribute("name", Value::string("ops board"))
        .with_attribute("resource_group_name", Value::string("portal-rg"))
        .with_attribute("location", Value::string("westeurope"));
    let err = provider(&server).create(&resource).await.unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::Validation);
}

#[tokio::test]
async fn delete_accepts_no_content() {
    let server = MockServer::start().await;
    let dashboard = dashboard_path("gone");

    Mock::given(method("DELETE"))
        .and(path(dashboard.as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let id = ResourceId::new("azurerm_dashboard", "gone");
    provider(&server).delete(&id, &dashboard).await.unwrap();
}
