//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type, enabling type validation
//! before any API call is made, default filling, and detection of changes
//! that can only be applied by replacing the resource.

use std::collections::HashMap;
use std::fmt;

use crate::resource::{Resource, State, Value};

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// Ordered list
    List(Box<AttributeType>),
    /// Unordered collection of unique values
    Set(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// List of nested attribute maps
    Block(Vec<AttributeSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                // Extract variant from "Type.variant" format
                let variant = s.split('.').next_back().unwrap_or(s);
                if variants.iter().any(|v| v == variant || s == v) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { base, validate, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Set(inner), Value::List(items)) => {
                let mut seen = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                    let key = set_key(item);
                    if seen.contains(&key) {
                        return Err(TypeError::DuplicateSetElement { value: key });
                    }
                    seen.push(key);
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(fields), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    let Value::Map(attrs) = item else {
                        return Err(TypeError::ListItemError {
                            index: i,
                            inner: Box::new(TypeError::TypeMismatch {
                                expected: "Block".to_string(),
                                got: item.type_name(),
                            }),
                        });
                    };
                    if let Some(e) = validate_attributes(fields.iter(), attrs).into_iter().next() {
                        return Err(TypeError::ListItemError {
                            index: i,
                            inner: Box::new(e),
                        });
                    }
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }

    fn is_set(&self) -> bool {
        matches!(self, AttributeType::Set(_))
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", .expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ComputedOnly { name: String },

    #[error("Attribute '{name}' has {got} items, at most {max} allowed")]
    TooManyItems { name: String, max: usize, got: usize },

    #[error("Attribute '{name}' has {got} items, at least {min} required")]
    TooFewItems { name: String, min: usize, got: usize },

    #[error("Duplicate set element {value}")]
    DuplicateSetElement { value: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Stable key for set membership and order-insensitive comparison
fn set_key(value: &Value) -> String {
    value.to_json().to_string()
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    /// Changing this attribute requires replacing the resource
    pub force_new: bool,
    /// Value must not be printed
    pub sensitive: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub max_items: Option<usize>,
    pub min_items: Option<usize>,
    /// Canonical form stored in state (e.g., normalized locations)
    pub normalize: Option<fn(&Value) -> Value>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            optional: true,
            computed: false,
            force_new: false,
            sensitive: false,
            default: None,
            description: None,
            max_items: None,
            min_items: None,
            normalize: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.optional = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self.optional = true;
        self
    }

    /// Computed only, unless combined with `optional()`
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self.optional = false;
        self.required = false;
        self
    }

    pub fn optional_computed(mut self) -> Self {
        self.computed = true;
        self.optional = true;
        self.required = false;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    pub fn with_min_items(mut self, min: usize) -> Self {
        self.min_items = Some(min);
        self
    }

    pub fn with_normalizer(mut self, normalize: fn(&Value) -> Value) -> Self {
        self.normalize = Some(normalize);
        self
    }

    /// Set by the provider only
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }

    fn validate_value(&self, value: &Value) -> Result<(), TypeError> {
        if let Value::List(items) = value {
            if let Some(max) = self.max_items
                && items.len() > max
            {
                return Err(TypeError::TooManyItems {
                    name: self.name.clone(),
                    max,
                    got: items.len(),
                });
            }
            if let Some(min) = self.min_items
                && items.len() < min
            {
                return Err(TypeError::TooFewItems {
                    name: self.name.clone(),
                    min,
                    got: items.len(),
                });
            }
        }
        self.attr_type
            .validate(value)
            .and_then(|()| self.check_normalized_set(value))
            .map_err(|e| TypeError::AttributeError {
                name: self.name.clone(),
                inner: Box::new(e),
            })
    }

    /// Set elements must stay unique once normalized into their stored form
    fn check_normalized_set(&self, value: &Value) -> Result<(), TypeError> {
        let (true, Some(normalize)) = (self.attr_type.is_set(), self.normalize) else {
            return Ok(());
        };
        let Value::List(items) = normalize(value) else {
            return Ok(());
        };
        let mut seen = Vec::with_capacity(items.len());
        for item in &items {
            let key = set_key(item);
            if seen.contains(&key) {
                return Err(TypeError::DuplicateSetElement { value: key });
            }
            seen.push(key);
        }
        Ok(())
    }
}

fn validate_attributes<'a>(
    schemas: impl Iterator<Item = &'a AttributeSchema>,
    attributes: &HashMap<String, Value>,
) -> Vec<TypeError> {
    let mut errors = Vec::new();

    for schema in schemas {
        match attributes.get(&schema.name) {
            None => {
                if schema.required && schema.default.is_none() {
                    errors.push(TypeError::MissingRequired {
                        name: schema.name.clone(),
                    });
                }
            }
            Some(_) if schema.is_computed_only() => {
                errors.push(TypeError::ComputedOnly {
                    name: schema.name.clone(),
                });
            }
            Some(value) => {
                if let Err(e) = schema.validate_value(value) {
                    errors.push(e);
                }
            }
        }
        // Unknown attributes are allowed (for flexibility)
    }

    errors
}

fn prepare_attributes<'a>(
    schemas: impl Iterator<Item = &'a AttributeSchema>,
    attributes: &mut HashMap<String, Value>,
) {
    for schema in schemas {
        if !attributes.contains_key(&schema.name)
            && let Some(default) = &schema.default
        {
            attributes.insert(schema.name.clone(), default.clone());
        }

        let Some(value) = attributes.get_mut(&schema.name) else {
            continue;
        };

        if let (AttributeType::Block(fields), Value::List(items)) = (&schema.attr_type, &mut *value)
        {
            for item in items.iter_mut() {
                if let Value::Map(nested) = item {
                    prepare_attributes(fields.iter(), nested);
                }
            }
        }

        if let Some(normalize) = schema.normalize {
            *value = normalize(value);
        }
    }
}

fn values_equal(attr_type: &AttributeType, a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::List(xs), Value::List(ys)) if attr_type.is_set() => {
            let mut xs: Vec<String> = xs.iter().map(set_key).collect();
            let mut ys: Vec<String> = ys.iter().map(set_key).collect();
            xs.sort();
            ys.sort();
            xs == ys
        }
        _ => a == b,
    }
}

fn collect_force_new<'a>(
    prefix: &str,
    schemas: impl Iterator<Item = &'a AttributeSchema>,
    from: &HashMap<String, Value>,
    to: &HashMap<String, Value>,
    changes: &mut Vec<String>,
) {
    for schema in schemas {
        let path = format!("{}{}", prefix, schema.name);
        let (old, new) = (from.get(&schema.name), to.get(&schema.name));

        if let (AttributeType::Block(fields), Some(Value::List(old_items)), Some(Value::List(new_items))) =
            (&schema.attr_type, old, new)
        {
            for (i, (o, n)) in old_items.iter().zip(new_items.iter()).enumerate() {
                if let (Value::Map(o), Value::Map(n)) = (o, n) {
                    collect_force_new(&format!("{}.{}.", path, i), fields.iter(), o, n, changes);
                }
            }
        }

        if !schema.force_new {
            continue;
        }

        let changed = match (old, new) {
            (Some(o), Some(n)) => !values_equal(&schema.attr_type, o, n),
            (None, Some(_)) => true,
            // Dropping a computed value keeps whatever the provider chose
            (Some(_), None) => !schema.computed,
            (None, None) => false,
        };
        if changed {
            changes.push(path);
        }
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Attribute names in a stable order
    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.attributes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let errors = validate_attributes(self.attributes.values(), attributes);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Fill declared defaults and normalize values into their stored form
    pub fn prepare(&self, attributes: &mut HashMap<String, Value>) {
        prepare_attributes(self.attributes.values(), attributes);
    }

    /// Paths of force-new attributes whose desired value differs from state
    ///
    /// Nested block attributes are reported as `block.index.attribute`.
    pub fn force_new_changes(&self, from: &State, to: &Resource) -> Vec<String> {
        let mut changes = Vec::new();
        collect_force_new(
            "",
            self.attributes.values(),
            &from.attributes,
            &to.attributes,
            &mut changes,
        );
        changes.sort();
        changes
    }
}

/// Helper functions for common types
pub mod types {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| {
                if let Value::Int(n) = value {
                    if *n > 0 {
                        Ok(())
                    } else {
                        Err("Value must be positive".to_string())
                    }
                } else {
                    Err("Expected integer".to_string())
                }
            },
        }
    }

    /// String that must not be empty or whitespace only
    pub fn non_empty_string() -> AttributeType {
        AttributeType::Custom {
            name: "NonEmptyString".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) if s.trim().is_empty() => {
                    Err("Value must not be empty".to_string())
                }
                _ => Ok(()),
            },
        }
    }

    /// IPv4 address (e.g., "10.0.0.4")
    pub fn ipv4_address() -> AttributeType {
        AttributeType::Custom {
            name: "Ipv4Address".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => s
                    .parse::<Ipv4Addr>()
                    .map(|_| ())
                    .map_err(|_| format!("'{}' is not a valid IPv4 address", s)),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// IPv6 address (e.g., "fd5d:70bc:930e:d008::7335")
    pub fn ipv6_address() -> AttributeType {
        AttributeType::Custom {
            name: "Ipv6Address".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => s
                    .parse::<Ipv6Addr>()
                    .map(|_| ())
                    .map_err(|_| format!("'{}' is not a valid IPv6 address", s)),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// CIDR block type (e.g., "10.0.0.0/16")
    pub fn cidr() -> AttributeType {
        AttributeType::Custom {
            name: "Cidr".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| {
                if let Value::String(s) = value {
                    validate_cidr(s)
                } else {
                    Err("Expected string".to_string())
                }
            },
        }
    }

    /// Validate CIDR block format (e.g., "10.0.0.0/16")
    pub fn validate_cidr(cidr: &str) -> Result<(), String> {
        let Some((ip, prefix)) = cidr.split_once('/') else {
            return Err(format!(
                "Invalid CIDR format '{}': expected IP/prefix",
                cidr
            ));
        };

        if ip.parse::<Ipv4Addr>().is_err() {
            return Err(format!("Invalid IP address '{}' in CIDR '{}'", ip, cidr));
        }

        match prefix.parse::<u8>() {
            Ok(p) if p <= 32 => Ok(()),
            Ok(p) => Err(format!("Invalid prefix length '{}': must be 0-32", p)),
            Err(_) => Err(format!(
                "Invalid prefix length '{}': must be a number",
                prefix
            )),
        }
    }
}
