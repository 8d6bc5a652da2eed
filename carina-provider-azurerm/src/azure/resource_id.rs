//! Azure Resource Manager IDs
//!
//! `/subscriptions/{id}/resourceGroups/{name}/providers/{namespace}/{type}/{name}/...`

use std::collections::HashMap;

/// Errors while parsing an ARM ID
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    #[error("cannot parse Azure ID {id:?}: the number of path segments is not divisible by 2")]
    OddSegments { id: String },

    #[error("cannot parse Azure ID {id:?}: key/value cannot be empty strings (key: {key:?}, value: {value:?})")]
    EmptySegment {
        id: String,
        key: String,
        value: String,
    },

    #[error("no subscription ID found in {id:?}")]
    MissingSubscription { id: String },

    #[error("ID was missing the `{key}` element")]
    MissingSegment { key: String },

    #[error("ID contained more segments than required: {id:?}, {remaining:?}")]
    UnexpectedSegments {
        id: String,
        remaining: Vec<String>,
    },
}

/// A parsed ARM ID
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceIdentifier {
    pub subscription_id: String,
    pub resource_group: String,
    /// Namespace after `providers`, e.g. `Microsoft.Network`
    pub provider: String,
    /// Remaining `key/value` pairs
    pub path: HashMap<String, String>,
}

impl ResourceIdentifier {
    /// Remove a required path segment, returning its value
    pub fn pop_segment(&mut self, key: &str) -> Result<String, IdParseError> {
        match self.path.remove(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(IdParseError::MissingSegment {
                key: key.to_string(),
            }),
        }
    }

    /// Fail when segments are left after the expected ones were popped
    pub fn validate_no_empty_segments(&self, id: &str) -> Result<(), IdParseError> {
        if self.path.is_empty() {
            return Ok(());
        }
        let mut remaining: Vec<String> = self
            .path
            .iter()
            .map(|(k, v)| format!("{}/{}", k, v))
            .collect();
        remaining.sort();
        Err(IdParseError::UnexpectedSegments {
            id: id.to_string(),
            remaining,
        })
    }
}

/// Split an ARM ID into its components
pub fn parse_azure_resource_id(id: &str) -> Result<ResourceIdentifier, IdParseError> {
    let trimmed = id.trim_matches('/');
    let components: Vec<&str> = if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    };

    if components.len() % 2 != 0 {
        return Err(IdParseError::OddSegments { id: id.to_string() });
    }

    let mut parsed = ResourceIdentifier::default();
    let mut subscription = None;

    for pair in components.chunks(2) {
        let (key, value) = (pair[0], pair[1]);
        if key.is_empty() || value.is_empty() {
            return Err(IdParseError::EmptySegment {
                id: id.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            });
        }

        match key {
            "subscriptions" => subscription = Some(value.to_string()),
            "providers" => parsed.provider = value.to_string(),
            k if k.eq_ignore_ascii_case("resourceGroups") => {
                parsed.resource_group = value.to_string()
            }
            _ => {
                parsed.path.insert(key.to_string(), value.to_string());
            }
        }
    }

    parsed.subscription_id =
        subscription.ok_or_else(|| IdParseError::MissingSubscription { id: id.to_string() })?;
    Ok(parsed)
}

/// Path of a resource group
pub fn resource_group_id(subscription_id: &str, resource_group: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}",
        subscription_id, resource_group
    )
}

/// Path of a provider resource, nested segments given as `(type, name)` pairs
pub fn format_resource_id(
    subscription_id: &str,
    resource_group: &str,
    provider: &str,
    segments: &[(&str, &str)],
) -> String {
    let mut id = format!(
        "{}/providers/{}",
        resource_group_id(subscription_id, resource_group),
        provider
    );
    for (key, value) in segments {
        id.push('/');
        id.push_str(key);
        id.push('/');
        id.push_str(value);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUB: &str = "00000000-0000-0000-0000-000000000000";

    #[test]
    fn parses_nested_resource() {
        let id = format!(
            "/subscriptions/{}/resourceGroups/rg1/providers/Microsoft.Network/privateLinkServices/pls1",
            SUB
        );
        let mut parsed = parse_azure_resource_id(&id).unwrap();
        assert_eq!(parsed.subscription_id, SUB);
        assert_eq!(parsed.resource_group, "rg1");
        assert_eq!(parsed.provider, "Microsoft.Network");
        assert_eq!(parsed.pop_segment("privateLinkServices").unwrap(), "pls1");
        assert!(parsed.validate_no_empty_segments(&id).is_ok());
    }

    #[test]
    fn resource_groups_key_is_case_insensitive() {
        let parsed =
            parse_azure_resource_id(&format!("/subscriptions/{}/resourcegroups/RG/", SUB)).unwrap();
        assert_eq!(parsed.resource_group, "RG");
        assert!(parsed.path.is_empty());
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(matches!(
            parse_azure_resource_id("/subscriptions/x/resourceGroups"),
            Err(IdParseError::OddSegments { .. })
        ));
        assert!(matches!(
            parse_azure_resource_id("/subscriptions//resourceGroups/rg"),
            Err(IdParseError::EmptySegment { .. })
        ));
        assert!(matches!(
            parse_azure_resource_id("/resourceGroups/rg"),
            Err(IdParseError::MissingSubscription { .. })
        ));
        assert!(matches!(
            parse_azure_resource_id(""),
            Err(IdParseError::MissingSubscription { .. })
        ));
    }

    #[test]
    fn leftover_segments_are_reported() {
        let id = format!(
            "/subscriptions/{}/resourceGroups/rg/providers/Microsoft.Network/privateLinkServices/a/extra/b",
            SUB
        );
        let mut parsed = parse_azure_resource_id(&id).unwrap();
        parsed.pop_segment("privateLinkServices").unwrap();
        match parsed.validate_no_empty_segments(&id) {
            Err(IdParseError::UnexpectedSegments { remaining, .. }) => {
                assert_eq!(remaining, vec!["extra/b".to_string()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            parsed.pop_segment("privateEndpoints"),
            Err(IdParseError::MissingSegment { .. })
        ));
    }

    #[test]
    fn formats_ids() {
        assert_eq!(
            format_resource_id(
                SUB,
                "rg",
                "Microsoft.Network",
                &[("privateDnsZones", "z.com"), ("AAAA", "www")]
            ),
            format!(
                "/subscriptions/{}/resourceGroups/rg/providers/Microsoft.Network/privateDnsZones/z.com/AAAA/www",
                SUB
            )
        );
    }
}
