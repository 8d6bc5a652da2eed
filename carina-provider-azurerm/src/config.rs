//! Provider configuration
//!
//! Settings come from `ARM_*` environment variables and may be overridden by
//! the attributes of the provider block.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use carina_provider_sdk::resource::{Attributes, Value};
use carina_provider_sdk::schema::{AttributeSchema, AttributeType, ResourceSchema};

use crate::azure::validate;

/// Configuration errors, reported before any API call is made
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("`{0}` must be set")]
    MissingSetting(&'static str),

    #[error("subscription ID '{0}' is not a valid GUID")]
    InvalidSubscriptionId(String),

    #[error("unknown Azure environment '{0}', expected one of: public, china, usgovernment, german")]
    UnknownEnvironment(String),

    #[error("`{name}` must be true or false, got '{value}'")]
    InvalidBool { name: &'static str, value: String },
}

/// Azure cloud the provider talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloudEnvironment {
    #[default]
    Public,
    China,
    UsGovernment,
    German,
}

impl CloudEnvironment {
    pub fn resource_manager_endpoint(&self) -> &'static str {
        match self {
            CloudEnvironment::Public => "https://management.azure.com",
            CloudEnvironment::China => "https://management.chinacloudapi.cn",
            CloudEnvironment::UsGovernment => "https://management.usgovcloudapi.net",
            CloudEnvironment::German => "https://management.microsoftazure.de",
        }
    }

    pub fn active_directory_endpoint(&self) -> &'static str {
        match self {
            CloudEnvironment::Public => "https://login.microsoftonline.com",
            CloudEnvironment::China => "https://login.chinacloudapi.cn",
            CloudEnvironment::UsGovernment => "https://login.microsoftonline.us",
            CloudEnvironment::German => "https://login.microsoftonline.de",
        }
    }
}

impl FromStr for CloudEnvironment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "public" => Ok(CloudEnvironment::Public),
            "china" => Ok(CloudEnvironment::China),
            "usgovernment" => Ok(CloudEnvironment::UsGovernment),
            "german" => Ok(CloudEnvironment::German),
            _ => Err(ConfigError::UnknownEnvironment(s.to_string())),
        }
    }
}

/// Behavior switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    /// Refuse to create resources that already exist outside of state
    pub resources_must_be_imported: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            resources_must_be_imported: true,
        }
    }
}

/// Polling cadence for long-running operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    /// Interval between operation status polls when the API gives no Retry-After
    pub lro_interval: Duration,
    /// Lower bound between refreshes of eventually consistent properties
    pub state_min_timeout: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            lro_interval: Duration::from_secs(10),
            state_min_timeout: Duration::from_secs(15),
        }
    }
}

/// Azure provider configuration
#[derive(Clone, Default)]
pub struct ProviderConfig {
    pub subscription_id: String,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Pre-issued bearer token, bypasses all other authentication
    pub access_token: Option<String>,
    pub environment: CloudEnvironment,
    /// Overrides the environment's Resource Manager endpoint
    pub resource_manager_endpoint: Option<String>,
    /// Authenticate through the Azure CLI instead of a service principal
    pub use_cli: bool,
    pub features: Features,
    pub polling: PollingConfig,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("environment", &self.environment)
            .field("resource_manager_endpoint", &self.resource_manager_endpoint)
            .field("use_cli", &self.use_cli)
            .field("features", &self.features)
            .field("polling", &self.polling)
            .finish()
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name,
            value: value.to_string(),
        }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ProviderConfig {
    /// Load configuration from `ARM_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));

        let environment = match get("ARM_ENVIRONMENT") {
            Some(env) => env.parse()?,
            None => CloudEnvironment::default(),
        };

        let use_cli = match get("ARM_USE_CLI") {
            Some(v) => parse_bool("ARM_USE_CLI", &v)?,
            None => false,
        };

        let mut features = Features::default();
        if let Some(v) = get("ARM_PROVIDER_STRICT") {
            features.resources_must_be_imported = parse_bool("ARM_PROVIDER_STRICT", &v)?;
        }

        Ok(Self {
            subscription_id: get("ARM_SUBSCRIPTION_ID").unwrap_or_default(),
            tenant_id: get("ARM_TENANT_ID"),
            client_id: get("ARM_CLIENT_ID"),
            client_secret: get("ARM_CLIENT_SECRET"),
            access_token: get("ARM_ACCESS_TOKEN"),
            environment,
            resource_manager_endpoint: get("ARM_RESOURCE_MANAGER_ENDPOINT"),
            use_cli,
            features,
            polling: PollingConfig::default(),
        })
    }

    /// Apply provider block attributes on top of the current settings
    pub fn merge_attributes(&mut self, attrs: &HashMap<String, Value>) -> Result<(), ConfigError> {
        if let Some(v) = attrs.get_str("subscription_id") {
            self.subscription_id = v.to_string();
        }
        if let Some(v) = attrs.get_str("tenant_id") {
            self.tenant_id = Some(v.to_string());
        }
        if let Some(v) = attrs.get_str("client_id") {
            self.client_id = Some(v.to_string());
        }
        if let Some(v) = attrs.get_str("client_secret") {
            self.client_secret = Some(v.to_string());
        }
        if let Some(v) = attrs.get_str("environment") {
            self.environment = v.parse()?;
        }
        if let Some(v) = attrs.get_str("resource_manager_endpoint") {
            self.resource_manager_endpoint = Some(v.to_string());
        }
        if let Some(v) = attrs.get_bool("use_cli") {
            self.use_cli = v;
        }
        if let Some(v) = attrs.get_bool("resources_must_be_imported") {
            self.features.resources_must_be_imported = v;
        }
        Ok(())
    }

    /// Check the settings are complete for the selected authentication
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subscription_id.is_empty() {
            return Err(ConfigError::MissingSetting("subscription_id"));
        }
        if validate::is_guid(&self.subscription_id).is_err() {
            return Err(ConfigError::InvalidSubscriptionId(
                self.subscription_id.clone(),
            ));
        }

        if self.access_token.is_some() || self.use_cli {
            return Ok(());
        }

        if self.tenant_id.is_none() {
            return Err(ConfigError::MissingSetting("tenant_id"));
        }
        if self.client_id.is_none() {
            return Err(ConfigError::MissingSetting("client_id"));
        }
        if self.client_secret.is_none() {
            return Err(ConfigError::MissingSetting("client_secret"));
        }
        Ok(())
    }

    /// Resource Manager base URL without a trailing slash
    pub fn resource_manager_endpoint(&self) -> String {
        self.resource_manager_endpoint
            .as_deref()
            .unwrap_or_else(|| self.environment.resource_manager_endpoint())
            .trim_end_matches('/')
            .to_string()
    }
}

/// Schema of the `provider azurerm { ... }` block
pub fn provider_schema() -> ResourceSchema {
    ResourceSchema::new("azurerm")
        .with_description("Azure Resource Manager provider configuration")
        .attribute(
            AttributeSchema::new("subscription_id", validate::guid())
                .with_description("Subscription to manage. Defaults to ARM_SUBSCRIPTION_ID."),
        )
        .attribute(
            AttributeSchema::new("tenant_id", validate::guid())
                .with_description("Azure AD tenant of the service principal. Defaults to ARM_TENANT_ID."),
        )
        .attribute(
            AttributeSchema::new("client_id", validate::guid())
                .with_description("Service principal application ID. Defaults to ARM_CLIENT_ID."),
        )
        .attribute(
            AttributeSchema::new("client_secret", AttributeType::String)
                .sensitive()
                .with_description("Service principal secret. Defaults to ARM_CLIENT_SECRET."),
        )
        .attribute(
            AttributeSchema::new(
                "environment",
                AttributeType::Enum(
                    ["public", "china", "usgovernment", "german"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                ),
            )
            .with_default(Value::String("public".to_string())),
        )
        .attribute(AttributeSchema::new("resource_manager_endpoint", AttributeType::String))
        .attribute(
            AttributeSchema::new("use_cli", AttributeType::Bool)
                .with_description("Authenticate with the Azure CLI's logged-in account."),
        )
        .attribute(
            AttributeSchema::new("resources_must_be_imported", AttributeType::Bool)
                .with_default(Value::Bool(true)),
        )
}
