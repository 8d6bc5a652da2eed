//! Validators for Azure naming rules
//!
//! Each returns an `AttributeType::Custom` so the rule runs during schema
//! validation, before any API call is made.

use std::sync::LazyLock;

use carina_provider_sdk::resource::Value;
use carina_provider_sdk::schema::AttributeType;
use regex::Regex;

use super::resource_id::parse_azure_resource_id;

static RESOURCE_GROUP_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_.()]+$").ok());

static PRIVATE_LINK_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9._-]{0,78}[a-zA-Z0-9_])?$").ok());

static DASHBOARD_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9]{3,160}$").ok());

static NETAPP_ACCOUNT_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[-_\da-zA-Z]{3,64}$").ok());

static DNS_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_*]([a-zA-Z0-9_-]{0,61}[a-zA-Z0-9_])?$").ok());

fn is_match(re: &LazyLock<Option<Regex>>, s: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(s))
}

fn custom(name: &str, validate: fn(&Value) -> Result<(), String>) -> AttributeType {
    AttributeType::Custom {
        name: name.to_string(),
        base: Box::new(AttributeType::String),
        validate,
    }
}

fn with_str(value: &Value, check: fn(&str) -> Result<(), String>) -> Result<(), String> {
    match value {
        Value::String(s) => check(s),
        _ => Err("Expected string".to_string()),
    }
}

/// Hyphenated 36 character GUID
pub fn is_guid(s: &str) -> Result<(), String> {
    if s.len() == 36 && uuid::Uuid::parse_str(s).is_ok() {
        Ok(())
    } else {
        Err(format!("{:?} is not a valid UUID", s))
    }
}

pub fn is_resource_id(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("resource ID must not be empty".to_string());
    }
    parse_azure_resource_id(s)
        .map(|_| ())
        .map_err(|e| format!("Can not parse {:?} as a resource id: {}", s, e))
}

pub fn is_resource_group_name(s: &str) -> Result<(), String> {
    if s.is_empty() || s.len() > 90 {
        return Err(format!(
            "resource group name {:?} must be between 1 and 90 characters",
            s
        ));
    }
    if s.ends_with('.') {
        return Err(format!("resource group name {:?} cannot end with a period", s));
    }
    if !is_match(&RESOURCE_GROUP_NAME, s) {
        return Err(format!(
            "resource group name {:?} may only contain alphanumeric characters, dash, underscores, parentheses and periods",
            s
        ));
    }
    Ok(())
}

pub fn is_private_link_name(s: &str) -> Result<(), String> {
    if is_match(&PRIVATE_LINK_NAME, s) {
        Ok(())
    } else {
        Err(format!(
            "{:?} must be between 1 and 80 characters, begin with a letter or number, end with a letter, number or underscore, and may contain only letters, numbers, underscores, periods, or hyphens",
            s
        ))
    }
}

pub fn is_dashboard_name(s: &str) -> Result<(), String> {
    if is_match(&DASHBOARD_NAME, s) {
        Ok(())
    } else {
        Err(format!(
            "{:?} may only contain alphanumeric characters and hyphens and must be between 3 and 160 characters",
            s
        ))
    }
}

pub fn is_netapp_account_name(s: &str) -> Result<(), String> {
    if is_match(&NETAPP_ACCOUNT_NAME, s) {
        Ok(())
    } else {
        Err(format!(
            "{:?} must be between 3 and 64 characters in length and contain only letters, numbers, underscores or hyphens",
            s
        ))
    }
}

/// Relative record name within a zone, `@` for the apex
pub fn is_private_dns_record_name(s: &str) -> Result<(), String> {
    if s == "@" {
        return Ok(());
    }
    if s.is_empty() || s.len() > 253 {
        return Err(format!(
            "record name {:?} must be between 1 and 253 characters",
            s
        ));
    }
    match s.split('.').find(|label| !is_match(&DNS_LABEL, label)) {
        Some(label) => Err(format!(
            "record name {:?} contains an invalid label {:?}",
            s, label
        )),
        None => Ok(()),
    }
}

pub fn guid() -> AttributeType {
    custom("Guid", |v| with_str(v, is_guid))
}

pub fn resource_id() -> AttributeType {
    custom("ResourceId", |v| with_str(v, is_resource_id))
}

pub fn resource_group_name() -> AttributeType {
    custom("ResourceGroupName", |v| with_str(v, is_resource_group_name))
}

pub fn private_link_name() -> AttributeType {
    custom("PrivateLinkName", |v| with_str(v, is_private_link_name))
}

pub fn dashboard_name() -> AttributeType {
    custom("DashboardName", |v| with_str(v, is_dashboard_name))
}

pub fn netapp_account_name() -> AttributeType {
    custom("NetAppAccountName", |v| with_str(v, is_netapp_account_name))
}

pub fn private_dns_record_name() -> AttributeType {
    custom("PrivateDnsRecordName", |v| {
        with_str(v, is_private_dns_record_name)
    })
}
