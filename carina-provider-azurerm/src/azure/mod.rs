//! Helpers shared by all Azure resource handlers

pub mod expand;
pub mod location;
pub mod resource_id;
pub mod schema;
pub mod tags;
pub mod validate;

pub use expand::{
    expand_string_slice, expand_sub_resource_ids, flatten_string_slice, flatten_sub_resource_ids,
};
pub use location::normalize_location;
pub use resource_id::{
    IdParseError, ResourceIdentifier, format_resource_id, parse_azure_resource_id,
    resource_group_id,
};
pub use tags::{expand_tags, flatten_tags, tags_schema, validate_tags};
