use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use carina_provider_sdk::provider::{ProviderError, ProviderResult};
use carina_provider_sdk::resource::{Attributes, Resource, State, Value};
use carina_provider_sdk::schema::{AttributeSchema, AttributeType, ResourceSchema};
use carina_provider_sdk::timeouts::Timeouts;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as Json;

use crate::azure::{self, expand_string_slice};
use crate::resources::{ArmContext, ArmDataSource};

const API_VERSION: &str = "2020-01-01";

const CATEGORIES: [&str; 5] = [
    "HighAvailability",
    "Security",
    "Performance",
    "Cost",
    "OperationalExcellence",
];

/// Azure Advisor recommendations for the subscription
pub struct AdvisorRecommendations;

fn category() -> AttributeType {
    AttributeType::Custom {
        name: "AdvisorCategory".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) if CATEGORIES.iter().any(|c| c.eq_ignore_ascii_case(s)) => Ok(()),
            Value::String(s) => Err(format!(
                "expected one of {}, got {:?}",
                CATEGORIES.join(", "),
                s
            )),
            _ => Err("Expected string".to_string()),
        },
    }
}

/// `(Field eq 'a' or Field eq 'b')`, empty for no values
fn or_clause(field: &str, values: &[String]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let terms: Vec<String> = values
        .iter()
        .map(|v| format!("{} eq '{}'", field, v))
        .collect();
    Some(format!("({})", terms.join(" or ")))
}

/// OData filter for the list call
pub fn build_filter(categories: &[String], resource_groups: &[String]) -> String {
    [
        or_clause("Category", categories),
        or_clause("ResourceGroup", resource_groups),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" and ")
}

fn text(value: Option<&Json>) -> Value {
    Value::string(value.and_then(Json::as_str).unwrap_or_default())
}

fn format_updated_time(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => t
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        Err(_) => raw.to_string(),
    }
}

fn flatten_recommendation(item: &Json) -> ProviderResult<Value> {
    let Some(name) = item.get("name").and_then(Json::as_str).filter(|s| !s.is_empty()) else {
        return Err(ProviderError::new(
            "advisor Recommendation Name was nil or empty",
        ));
    };

    let props = item.get("properties");
    let field = |pointer: &str| props.and_then(|p| p.pointer(pointer));

    let mut r = HashMap::new();
    r.insert("category".to_string(), text(field("/category")));
    r.insert("description".to_string(), text(field("/shortDescription/problem")));
    r.insert("impact".to_string(), text(field("/impact")));
    r.insert("recommendation_name".to_string(), Value::string(name));
    r.insert(
        "recommendation_type_id".to_string(),
        text(field("/recommendationTypeId")),
    );
    r.insert("resource_name".to_string(), text(field("/impactedValue")));
    r.insert("resource_type".to_string(), text(field("/impactedField")));
    r.insert(
        "suppression_names".to_string(),
        azure::flatten_string_slice(field("/suppressionIds")),
    );
    r.insert(
        "updated_time".to_string(),
        Value::string(
            field("/lastUpdated")
                .and_then(Json::as_str)
                .map(format_updated_time)
                .unwrap_or_default(),
        ),
    );
    Ok(Value::Map(r))
}

#[async_trait]
impl ArmDataSource for AdvisorRecommendations {
    fn type_name(&self) -> &'static str {
        "azurerm_advisor_recommendations"
    }

    fn schema(&self) -> ResourceSchema {
        let computed = |name: &str| AttributeSchema::new(name, AttributeType::String).computed();
        ResourceSchema::new(self.type_name())
            .with_description("Azure Advisor recommendations, optionally filtered.")
            .attribute(AttributeSchema::new(
                "filter_by_category",
                AttributeType::Set(Box::new(category())),
            ))
            .attribute(azure::schema::resource_group_name_set_optional())
            .attribute(
                AttributeSchema::new(
                    "recommendations",
                    AttributeType::Block(vec![
                        computed("category"),
                        computed("description"),
                        computed("impact"),
                        computed("recommendation_name"),
                        computed("recommendation_type_id"),
                        computed("resource_name"),
                        computed("resource_type"),
                        AttributeSchema::new(
                            "suppression_names",
                            AttributeType::Set(Box::new(AttributeType::String)),
                        )
                        .computed(),
                        computed("updated_time"),
                    ]),
                )
                .computed(),
            )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::default().with_read(Duration::from_secs(10 * 60))
    }

    async fn read(&self, ctx: &ArmContext, resource: &Resource) -> ProviderResult<State> {
        let categories = expand_string_slice(resource.attributes.get_list("filter_by_category"));
        let resource_groups =
            expand_string_slice(resource.attributes.get_list("filter_by_resource_groups"));
        let filter = build_filter(&categories, &resource_groups);

        let path = format!(
            "/subscriptions/{}/providers/Microsoft.Advisor/recommendations",
            ctx.subscription_id()
        );
        log::debug!("Listing Advisor recommendations (filter: {:?})", filter);
        let items = ctx
            .client
            .list_all(&path, API_VERSION, Some(filter.as_str()).filter(|f| !f.is_empty()))
            .await
            .map_err(|e| e.with_context("loading Advisor Recommendation List"))?;

        let recommendations = items
            .iter()
            .map(flatten_recommendation)
            .collect::<ProviderResult<Vec<_>>>()?;

        let mut attrs = resource.attributes.clone();
        attrs.insert("recommendations".to_string(), Value::List(recommendations));

        let identifier = format!(
            "advisor/recommendations/{}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
        );
        Ok(State::existing(resource.id.clone(), attrs).with_identifier(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_combines_clauses() {
        assert_eq!(
            build_filter(
                &["cost".to_string(), "Security".to_string()],
                &["rg1".to_string()]
            ),
            "(Category eq 'cost' or Category eq 'Security') and (ResourceGroup eq 'rg1')"
        );
        assert_eq!(
            build_filter(&[], &["a".to_string(), "b".to_string()]),
            "(ResourceGroup eq 'a' or ResourceGroup eq 'b')"
        );
        assert_eq!(build_filter(&[], &[]), "");
    }

    #[test]
    fn categories_are_case_insensitive() {
        let t = category();
        assert!(t.validate(&Value::string("cost")).is_ok());
        assert!(t.validate(&Value::string("OPERATIONALEXCELLENCE")).is_ok());
        assert!(t.validate(&Value::string("Speed")).is_err());
    }

    #[test]
    fn flattens_recommendation() {
        let item = json!({
            "name": "rec-1",
            "properties": {
                "category": "Cost",
                "impact": "High",
                "impactedField": "Microsoft.Compute/virtualMachines",
                "impactedValue": "vm1",
                "lastUpdated": "2020-02-11T02:01:13.4541796+00:00",
                "recommendationTypeId": "e10b1381-5f0a-47ff-8c7b-37bd13d7c974",
                "shortDescription": {"problem": "Right-size underutilized virtual machines"},
                "suppressionIds": ["11111111-1111-1111-1111-111111111111"]
            }
        });
        let Value::Map(r) = flatten_recommendation(&item).unwrap() else {
            panic!("expected map");
        };
        assert_eq!(r.get_str("recommendation_name"), Some("rec-1"));
        assert_eq!(
            r.get_str("description"),
            Some("Right-size underutilized virtual machines")
        );
        assert_eq!(r.get_str("resource_type"), Some("Microsoft.Compute/virtualMachines"));
        assert_eq!(r.get_str("updated_time"), Some("2020-02-11T02:01:13Z"));
        assert_eq!(
            r.get_string_list("suppression_names"),
            vec!["11111111-1111-1111-1111-111111111111"]
        );
    }

    #[test]
    fn missing_fields_read_as_empty() {
        let Value::Map(r) = flatten_recommendation(&json!({"name": "rec-2"})).unwrap() else {
            panic!("expected map");
        };
        assert_eq!(r.get_str("category"), Some(""));
        assert_eq!(r.get_str("updated_time"), Some(""));
        assert!(r.get_list("suppression_names").is_empty());
    }

    #[test]
    fn nameless_recommendation_is_an_error() {
        assert!(flatten_recommendation(&json!({"properties": {}})).is_err());
        assert!(flatten_recommendation(&json!({"name": ""})).is_err());
    }
}
