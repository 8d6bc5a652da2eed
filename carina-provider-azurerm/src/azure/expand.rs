//! Conversions between attribute lists and API payload fragments

use carina_provider_sdk::resource::Value;
use serde_json::json;

/// String items of a list or set attribute
pub fn expand_string_slice(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// String array from an API response; missing arrays read as empty
pub fn flatten_string_slice(values: Option<&serde_json::Value>) -> Value {
    let items = values
        .and_then(serde_json::Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(Value::string))
                .collect()
        })
        .unwrap_or_default();
    Value::List(items)
}

/// `[{"id": ...}]` sub-resource references
pub fn expand_sub_resource_ids(values: &[Value]) -> serde_json::Value {
    serde_json::Value::Array(
        expand_string_slice(values)
            .into_iter()
            .map(|id| json!({ "id": id }))
            .collect(),
    )
}

/// IDs of `[{"id": ...}]` sub-resource references
pub fn flatten_sub_resource_ids(values: Option<&serde_json::Value>) -> Value {
    let items = values
        .and_then(serde_json::Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.get("id").and_then(serde_json::Value::as_str))
                .map(Value::string)
                .collect()
        })
        .unwrap_or_default();
    Value::List(items)
}
