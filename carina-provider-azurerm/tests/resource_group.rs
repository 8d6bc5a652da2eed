//! Resource Group lifecycle against a mocked Resource Manager

mod common;

use carina_provider_sdk::provider::{Provider, ProviderErrorKind};
use carina_provider_sdk::resource::{Attributes, Resource, ResourceId, Value};
use serde_json::json;
use wiremock::matchers::{bearer_token, body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{TOKEN, provider, provider_without_import_check, resource_group_path};

const API_VERSION: &str = "2019-05-01";

fn resource_group(name: &str) -> Resource {
    Resource::new("azurerm_resource_group", name)
        .with_attribute("name", Value::string(name))
        .with_attribute("location", Value::string("West Europe"))
        .with_attribute(
            "tags",
            Value::Map([("env".to_string(), Value::string("test"))].into()),
        )
}

fn body(name: &str) -> serde_json::Value {
    json!({
        "id": resource_group_path(name),
        "name": name,
        "location": "westeurope",
        "tags": {"env": "test"},
        "properties": {"provisioningState": "Succeeded"}
    })
}

#[tokio::test]
async fn create_puts_and_reads_back() {
    let server = MockServer::start().await;
    let rg = resource_group_path("acctest-rg");

    Mock::given(method("GET"))
        .and(path(rg.as_str()))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": "ResourceGroupNotFound", "message": "not found"}
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(rg.as_str()))
        .and(query_param("api-version", API_VERSION))
        .and(bearer_token(TOKEN))
        .and(body_json(json!({"location": "westeurope", "tags": {"env": "test"}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(body("acctest-rg")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(rg.as_str()))
        .and(query_param("api-version", API_VERSION))
        .respond_with(ResponseTemplate::new(200).set_body_json(body("acctest-rg")))
        .mount(&server)
        .await;

    let state = provider(&server)
        .create(&resource_group("acctest-rg"))
        .await
        .unwrap();

    assert!(state.exists);
    assert_eq!(state.identifier.as_deref(), Some(rg.as_str()));
    assert_eq!(state.attributes.get_str("location"), Some("westeurope"));
    assert_eq!(state.attributes.get_string_map("tags")["env"], "test");
}

#[tokio::test]
async fn create_refuses_an_existing_group() {
    let server = MockServer::start().await;
    let rg = resource_group_path("taken");

    Mock::given(method("GET"))
        .and(path(rg.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body("taken")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = provider(&server)
        .create(&resource_group("taken"))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ProviderErrorKind::AlreadyExists);
    assert!(err.message.contains(&rg), "{}", err.message);
}

#[tokio::test]
async fn create_skips_the_import_check_when_disabled() {
    let server = MockServer::start().await;
    let rg = resource_group_path("adopted");

    Mock::given(method("PUT"))
        .and(path(rg.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body("adopted")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(rg.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body("adopted")))
        .expect(1)
        .mount(&server)
        .await;

    let state = provider_without_import_check(&server)
        .create(&resource_group("adopted"))
        .await
        .unwrap();
    assert!(state.exists);
}

#[tokio::test]
async fn read_of_a_deleted_group_reports_not_found() {
    let server = MockServer::start().await;
    let rg = resource_group_path("gone");

    Mock::given(method("GET"))
        .and(path(rg.as_str()))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let id = ResourceId::new("azurerm_resource_group", "gone");
    let state = provider(&server).read(&id, Some(&rg)).await.unwrap();
    assert!(!state.exists);
}

#[tokio::test]
async fn read_surfaces_api_errors() {
    let server = MockServer::start().await;
    let rg = resource_group_path("forbidden");

    Mock::given(method("GET"))
        .and(path(rg.as_str()))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": "AuthorizationFailed",
                "message": "The client does not have authorization"
            }
        })))
        .mount(&server)
        .await;

    let id = ResourceId::new("azurerm_resource_group", "forbidden");
    let err = provider(&server).read(&id, Some(&rg)).await.unwrap_err();

    assert_eq!(err.kind, ProviderErrorKind::Api);
    assert!(err.message.contains("Error reading Resource Group"));
    assert!(err.message.contains("AuthorizationFailed"));
    assert_eq!(err.resource_id, Some(id));
}

#[tokio::test]
async fn delete_follows_the_location_header() {
    let server = MockServer::start().await;
    let rg = resource_group_path("doomed");
    let operation = format!("{}/operationresults/abc", server.uri());

    Mock::given(method("DELETE"))
        .and(path(rg.as_str()))
        .and(query_param("api-version", API_VERSION))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Location", operation.as_str())
                .insert_header("Retry-After", "0"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operationresults/abc"))
        .respond_with(ResponseTemplate::new(202).insert_header("Retry-After", "0"))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operationresults/abc"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let id = ResourceId::new("azurerm_resource_group", "doomed");
    provider(&server).delete(&id, &rg).await.unwrap();
}

#[tokio::test]
async fn delete_of_a_missing_group_succeeds() {
    let server = MockServer::start().await;
    let rg = resource_group_path("already-gone");

    Mock::given(method("DELETE"))
        .and(path(rg.as_str()))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let id = ResourceId::new("azurerm_resource_group", "already-gone");
    provider(&server).delete(&id, &rg).await.unwrap();
}

#[tokio::test]
async fn changing_the_name_requires_replacement() {
    let server = MockServer::start().await;
    let rg = resource_group_path("old");

    let id = ResourceId::new("azurerm_resource_group", "old");
    let from = carina_provider_sdk::resource::State::existing(
        id.clone(),
        [
            ("name".to_string(), Value::string("old")),
            ("location".to_string(), Value::string("westeurope")),
        ]
        .into(),
    )
    .with_identifier(rg.as_str());

    let err = provider(&server)
        .update(&id, &rg, &from, &resource_group("new"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::Validation);
    assert!(err.message.contains("name"));
}
