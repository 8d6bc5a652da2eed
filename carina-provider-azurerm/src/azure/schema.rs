//! Attribute schemas shared by most resource types

use carina_provider_sdk::schema::{AttributeSchema, AttributeType};

use super::location::normalize_location_value;
use super::validate;

pub fn location_schema() -> AttributeSchema {
    AttributeSchema::new("location", AttributeType::String)
        .required()
        .force_new()
        .with_normalizer(normalize_location_value)
        .with_description("Azure region where the resource exists.")
}

pub fn location_for_data_source() -> AttributeSchema {
    AttributeSchema::new("location", AttributeType::String).computed()
}

pub fn resource_group_name_schema() -> AttributeSchema {
    AttributeSchema::new("resource_group_name", validate::resource_group_name())
        .required()
        .force_new()
        .with_description("Name of the resource group the resource belongs to.")
}

pub fn resource_group_name_for_data_source() -> AttributeSchema {
    AttributeSchema::new("resource_group_name", validate::resource_group_name()).required()
}

pub fn resource_group_name_set_optional() -> AttributeSchema {
    AttributeSchema::new(
        "filter_by_resource_groups",
        AttributeType::Set(Box::new(validate::resource_group_name())),
    )
    .optional()
}
