//! Resource tags

use std::collections::HashMap;

use carina_provider_sdk::resource::{Attributes, Value};
use carina_provider_sdk::schema::{AttributeSchema, AttributeType};

const MAX_TAGS: usize = 50;
const MAX_KEY_LENGTH: usize = 512;
const MAX_VALUE_LENGTH: usize = 256;

/// Tags attribute as sent to the API
pub fn expand_tags(attrs: &HashMap<String, Value>) -> serde_json::Value {
    let tags: serde_json::Map<String, serde_json::Value> = attrs
        .get_string_map("tags")
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect();
    serde_json::Value::Object(tags)
}

/// Tags from an API response; missing tags read as an empty map
pub fn flatten_tags(tags: Option<&serde_json::Value>) -> Value {
    let map = tags
        .and_then(serde_json::Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), Value::string(s))))
                .collect()
        })
        .unwrap_or_default();
    Value::Map(map)
}

pub fn validate_tags(value: &Value) -> Result<(), String> {
    let Value::Map(tags) = value else {
        return Err("Expected map".to_string());
    };

    if tags.len() > MAX_TAGS {
        return Err(format!(
            "a maximum of {} tags can be applied to each ARM resource",
            MAX_TAGS
        ));
    }

    let mut keys: Vec<&String> = tags.keys().collect();
    keys.sort();
    for key in keys {
        if key.len() > MAX_KEY_LENGTH {
            return Err(format!(
                "the maximum length for a tag key is {} characters: {:?} is {} characters",
                MAX_KEY_LENGTH,
                key,
                key.len()
            ));
        }
        let value = match &tags[key] {
            Value::String(s) => s.clone(),
            other => other.to_json().to_string(),
        };
        if value.len() > MAX_VALUE_LENGTH {
            return Err(format!(
                "the maximum length for a tag value is {} characters: the value for {:?} is {} characters",
                MAX_VALUE_LENGTH,
                key,
                value.len()
            ));
        }
    }
    Ok(())
}

fn tags_type() -> AttributeType {
    AttributeType::Custom {
        name: "Tags".to_string(),
        base: Box::new(AttributeType::Map(Box::new(AttributeType::String))),
        validate: validate_tags,
    }
}

pub fn tags_schema() -> AttributeSchema {
    AttributeSchema::new("tags", tags_type())
        .optional()
        .with_description("Tags to assign to the resource.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tag_map(pairs: impl IntoIterator<Item = (String, String)>) -> Value {
        Value::Map(pairs.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
    }

    #[test]
    fn expand_and_flatten() {
        let mut attrs = HashMap::new();
        attrs.insert(
            "tags".to_string(),
            tag_map([("env".to_string(), "test".to_string())]),
        );
        assert_eq!(expand_tags(&attrs), json!({"env": "test"}));
        assert_eq!(expand_tags(&HashMap::new()), json!({}));

        let flat = flatten_tags(Some(&json!({"cost-center": "Finance"})));
        assert_eq!(flat.as_map().unwrap().get_str("cost-center"), Some("Finance"));
        assert_eq!(flatten_tags(None), Value::Map(HashMap::new()));
    }

    #[test]
    fn validates_limits() {
        let ok = tag_map((0..50).map(|i| (format!("k{}", i), "v".to_string())));
        assert!(validate_tags(&ok).is_ok());

        let too_many = tag_map((0..51).map(|i| (format!("k{}", i), "v".to_string())));
        assert!(validate_tags(&too_many).unwrap_err().contains("maximum of 50"));

        let long_key = tag_map([("k".repeat(513), "v".to_string())]);
        assert!(validate_tags(&long_key).unwrap_err().contains("tag key"));

        let long_value = tag_map([("k".to_string(), "v".repeat(257))]);
        assert!(validate_tags(&long_value).unwrap_err().contains("tag value"));

        let edge = tag_map([("k".repeat(512), "v".repeat(256))]);
        assert!(validate_tags(&edge).is_ok());
    }

    #[test]
    fn schema_rejects_non_string_values() {
        let mut m = HashMap::new();
        m.insert("count".to_string(), Value::Int(1));
        assert!(tags_schema().attr_type.validate(&Value::Map(m)).is_err());
    }
}
