//! Provider - Trait abstracting resource operations
//!
//! A Provider defines operations for a specific infrastructure (Azure, AWS, etc.).
//! It translates desired attributes into API calls and API responses back
//! into observed state.

use std::future::Future;
use std::pin::Pin;

use crate::resource::{Resource, ResourceId, State};
use crate::schema::ResourceSchema;
use crate::timeouts::Timeouts;

/// Category of a provider failure
///
/// Carina decides retry/abort policy from the kind; providers never recover
/// locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The remote API call failed
    Api,
    /// The resource does not exist
    NotFound,
    /// The resource exists but is not managed yet and must be imported
    AlreadyExists,
    /// The desired attributes are invalid
    Validation,
    /// The operation did not finish in time
    Timeout,
    /// The provider itself is misconfigured
    Configuration,
    /// The operation is not supported for this resource type
    Unsupported,
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Api,
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ProviderErrorKind::NotFound)
    }

    /// The import-conflict error raised when a create would adopt an
    /// unmanaged resource
    pub fn already_exists(resource_type: &str, identifier: &str) -> Self {
        Self::new(format!(
            "A resource with the ID \"{}\" already exists - to be managed via Carina this resource needs to be imported into the State. Please see the documentation for \"{}\" for more information.",
            identifier, resource_type
        ))
        .with_kind(ProviderErrorKind::AlreadyExists)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ProviderErrorKind::Validation)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ProviderErrorKind::Timeout)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ProviderErrorKind::Configuration)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ProviderErrorKind::Unsupported)
    }

    pub fn with_kind(mut self, kind: ProviderErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ProviderErrorKind::NotFound
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "azurerm_resource_group")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema;

    /// Per-operation deadlines
    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Data sources are read-only and only support `read_data_source`
    fn is_data_source(&self) -> bool {
        false
    }
}

/// Main Provider trait
///
/// Each infrastructure provider (Azure, AWS, etc.) implements this trait.
/// All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "azurerm")
    fn name(&self) -> &'static str;

    /// List of resource types and data sources this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Get the current state of a resource
    ///
    /// Without an identifier there is nothing to look up yet and
    /// `State::not_found()` is returned. The same sentinel is returned when
    /// the remote resource has disappeared.
    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the provider-side ID
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource in place
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource
    ///
    /// Deleting a resource that is already gone succeeds.
    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;

    /// Read a data source from its input attributes
    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier)
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read_data_source(resource)
    }
}
