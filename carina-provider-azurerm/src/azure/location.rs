use carina_provider_sdk::resource::Value;

/// Canonical form of an Azure region: lower case without spaces
pub fn normalize_location(location: &str) -> String {
    location.replace(' ', "").to_lowercase()
}

/// Schema normalizer for location attributes
pub fn normalize_location_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(normalize_location(s)),
        other => other.clone(),
    }
}
