use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;

use carina_provider_azurerm::AzurermProvider;
use carina_provider_azurerm::config::provider_schema;
use carina_provider_azurerm::resources::resource_types;
use carina_provider_sdk::provider::{Provider, ResourceType};
use carina_provider_sdk::resource::{Resource, ResourceId, State, Value};
use carina_provider_sdk::schema::{AttributeSchema, AttributeType, ResourceSchema};

#[derive(Parser)]
#[command(name = "carina-azurerm")]
#[command(about = "Run azurerm provider operations directly", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// JSON file with provider block attributes, overriding ARM_* variables
    #[arg(long, global = true, value_name = "FILE")]
    provider: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List resource types, or show the attributes of one
    Schema {
        /// Resource type, data source or `azurerm` for the provider block
        resource_type: Option<String>,
    },
    /// Validate a resource file against its schema
    Validate {
        /// Path to resource JSON file
        file: PathBuf,
    },
    /// Create the resource described by a file
    Create {
        /// Path to resource JSON file
        file: PathBuf,
    },
    /// Read a resource by its Azure resource ID
    Read {
        resource_type: String,
        identifier: String,
    },
    /// Update an existing resource in place
    Update {
        /// Path to resource JSON file
        file: PathBuf,

        /// Azure resource ID of the existing resource
        #[arg(long)]
        id: String,
    },
    /// Delete a resource by its Azure resource ID
    Delete {
        resource_type: String,
        identifier: String,
    },
    /// Read a data source described by a file
    Data {
        /// Path to resource JSON file
        file: PathBuf,
    },
}

/// `{"type": "azurerm_resource_group", "name": "main", "attributes": {...}}`
#[derive(Deserialize)]
struct ResourceFile {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let provider_file = cli.provider.as_deref();
    let result = match cli.command {
        Commands::Schema { resource_type } => run_schema(resource_type.as_deref()),
        Commands::Validate { file } => run_validate(&file),
        Commands::Create { file } => run_create(&file, provider_file).await,
        Commands::Read {
            resource_type,
            identifier,
        } => run_read(&resource_type, &identifier, provider_file).await,
        Commands::Update { file, id } => run_update(&file, &id, provider_file).await,
        Commands::Delete {
            resource_type,
            identifier,
        } => run_delete(&resource_type, &identifier, provider_file).await,
        Commands::Data { file } => run_data(&file, provider_file).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn get_schemas() -> HashMap<String, ResourceSchema> {
    let mut all_schemas = HashMap::new();
    for resource_type in resource_types() {
        all_schemas.insert(resource_type.name().to_string(), resource_type.schema());
    }
    let provider = provider_schema();
    all_schemas.insert(provider.resource_type.clone(), provider);
    all_schemas
}

fn schema_for(resource_type: &str) -> Result<ResourceSchema, String> {
    get_schemas()
        .remove(resource_type)
        .ok_or_else(|| format!("Unknown resource type: {}", resource_type))
}

fn read_json<T: serde::de::DeserializeOwned>(file: &Path) -> Result<T, String> {
    let content = fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse {}: {}", file.display(), e))
}

fn to_attributes(json: &serde_json::Map<String, serde_json::Value>) -> HashMap<String, Value> {
    json.iter()
        .filter_map(|(key, value)| Value::from_json(value).map(|v| (key.clone(), v)))
        .collect()
}

fn load_resource(file: &Path) -> Result<Resource, String> {
    let parsed: ResourceFile = read_json(file)?;
    let mut resource = Resource::new(parsed.resource_type, parsed.name);
    resource.attributes = to_attributes(&parsed.attributes);
    log::debug!(
        "Loaded {} with {} attributes from {}",
        resource.id,
        resource.attributes.len(),
        file.display()
    );
    Ok(resource)
}

/// Provider block attributes: `{"subscription_id": "...", "use_cli": true}`
fn load_provider_attributes(file: &Path) -> Result<HashMap<String, Value>, String> {
    let parsed: serde_json::Map<String, serde_json::Value> = read_json(file)?;
    Ok(to_attributes(&parsed))
}

fn build_provider(provider_file: Option<&Path>) -> Result<AzurermProvider, String> {
    let provider = match provider_file {
        Some(file) => {
            log::info!("Configuring provider from {}", file.display());
            let attrs = load_provider_attributes(file)?;
            AzurermProvider::from_config_attributes(&attrs)
        }
        None => {
            log::info!("Configuring provider from ARM_* environment variables");
            AzurermProvider::from_env()
        }
    };
    provider.map_err(|e| e.to_string())
}

/// Resource name for ad-hoc commands: the last segment of the Azure ID
fn name_from_identifier(identifier: &str) -> String {
    identifier
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(identifier)
        .to_string()
}

fn run_schema(resource_type: Option<&str>) -> Result<(), String> {
    let Some(resource_type) = resource_type else {
        let mut types: Vec<Box<dyn ResourceType>> = resource_types();
        types.sort_by_key(|t| t.name());
        for t in types {
            let kind = if t.is_data_source() {
                "data source"
            } else {
                "resource"
            };
            println!("  • {} {}", t.name(), format!("({})", kind).dimmed());
        }
        return Ok(());
    };

    let schema = schema_for(resource_type)?;
    println!("{}", schema.resource_type.bold());
    if let Some(description) = &schema.description {
        println!("{}", description);
    }
    println!();

    let mut attributes: Vec<&AttributeSchema> = schema.attributes.values().collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));
    for attr in attributes {
        print_attribute(attr, 1);
    }
    Ok(())
}

fn print_attribute(attr: &AttributeSchema, depth: usize) {
    let indent = "  ".repeat(depth);
    let mode = if attr.required {
        "required".yellow()
    } else if attr.is_computed_only() {
        "computed".cyan()
    } else {
        "optional".normal()
    };

    let mut flags = Vec::new();
    if attr.force_new {
        flags.push("forces replacement");
    }
    if attr.sensitive {
        flags.push("sensitive");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };

    println!(
        "{}{} {} {}{}",
        indent,
        attr.name.bold(),
        attr.attr_type.to_string().dimmed(),
        mode,
        flags.red()
    );
    if let Some(description) = &attr.description {
        println!("{}  {}", indent, description.dimmed());
    }
    if let AttributeType::Block(fields) = &attr.attr_type {
        for field in fields {
            print_attribute(field, depth + 1);
        }
    }
}

fn run_validate(file: &Path) -> Result<(), String> {
    let resource = load_resource(file)?;
    let schema = schema_for(&resource.id.resource_type)?;

    println!("{}", "Validating...".cyan());

    if let Err(errors) = schema.validate(&resource.attributes) {
        let messages: Vec<String> = errors
            .iter()
            .map(|e| format!("{}.{}: {}", resource.id.resource_type, resource.id.name, e))
            .collect();
        return Err(messages.join("\n"));
    }

    println!(
        "{}",
        format!(
            "✓ {}.{} validated successfully.",
            resource.id.resource_type, resource.id.name
        )
        .green()
        .bold()
    );
    Ok(())
}

async fn run_create(file: &Path, provider_file: Option<&Path>) -> Result<(), String> {
    let resource = load_resource(file)?;
    let provider = build_provider(provider_file)?;

    println!(
        "{} {}.{}",
        "Creating".cyan().bold(),
        resource.id.resource_type,
        resource.id.name
    );
    let state = provider
        .create(&resource)
        .await
        .map_err(|e| e.to_string())?;
    log::info!("Created {} as {:?}", resource.id, state.identifier);
    println!("  {} Created {}.{}", "✓".green(), resource.id.resource_type, resource.id.name);
    print_state(&state)
}

async fn run_read(
    resource_type: &str,
    identifier: &str,
    provider_file: Option<&Path>,
) -> Result<(), String> {
    let provider = build_provider(provider_file)?;
    let id = ResourceId::new(resource_type, name_from_identifier(identifier));
    log::info!("Reading {} ({})", id, identifier);

    let state = provider
        .read(&id, Some(identifier))
        .await
        .map_err(|e| e.to_string())?;
    if !state.exists {
        println!("{}", format!("{} does not exist.", identifier).yellow());
        return Ok(());
    }
    print_state(&state)
}

async fn run_update(
    file: &Path,
    identifier: &str,
    provider_file: Option<&Path>,
) -> Result<(), String> {
    let resource = load_resource(file)?;
    let provider = build_provider(provider_file)?;
    log::info!("Updating {} ({})", resource.id, identifier);

    let current = provider
        .read(&resource.id, Some(identifier))
        .await
        .map_err(|e| e.to_string())?;
    if !current.exists {
        return Err(format!(
            "{} does not exist, create it instead",
            identifier
        ));
    }

    println!(
        "{} {}.{}",
        "Updating".cyan().bold(),
        resource.id.resource_type,
        resource.id.name
    );
    let state = provider
        .update(&resource.id, identifier, &current, &resource)
        .await
        .map_err(|e| e.to_string())?;
    println!("  {} Updated {}.{}", "✓".green(), resource.id.resource_type, resource.id.name);
    print_state(&state)
}

async fn run_delete(
    resource_type: &str,
    identifier: &str,
    provider_file: Option<&Path>,
) -> Result<(), String> {
    let provider = build_provider(provider_file)?;
    let id = ResourceId::new(resource_type, name_from_identifier(identifier));
    log::info!("Deleting {} ({})", id, identifier);

    println!("{} {}", "Deleting".red().bold(), identifier);
    provider
        .delete(&id, identifier)
        .await
        .map_err(|e| e.to_string())?;
    println!("  {} Deleted {}", "✓".green(), identifier);
    Ok(())
}

async fn run_data(file: &Path, provider_file: Option<&Path>) -> Result<(), String> {
    let resource = load_resource(file)?.with_read_only(true);
    let provider = build_provider(provider_file)?;
    log::info!("Reading data source {}", resource.id);

    let state = provider
        .read_data_source(&resource)
        .await
        .map_err(|e| e.to_string())?;
    if !state.exists {
        return Err(format!(
            "{}.{} was not found",
            resource.id.resource_type, resource.id.name
        ));
    }
    print_state(&state)
}

fn print_state(state: &State) -> Result<(), String> {
    let schema = get_schemas().remove(&state.id.resource_type);
    let attributes = redact_attributes(&state.attributes, &|name: &str| {
        schema.as_ref().and_then(|s| s.attributes.get(name))
    });

    let output = serde_json::json!({
        "type": state.id.resource_type,
        "name": state.id.name,
        "id": state.identifier,
        "attributes": attributes,
    });
    let rendered = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
    println!("{}", rendered);
    Ok(())
}

/// State as JSON with sensitive values masked, including inside blocks
fn redact_attributes<'a>(
    attributes: &HashMap<String, Value>,
    lookup: &dyn Fn(&str) -> Option<&'a AttributeSchema>,
) -> serde_json::Value {
    let mut names: Vec<&String> = attributes.keys().collect();
    names.sort();

    let mut map = serde_json::Map::new();
    for name in names {
        let value = &attributes[name];
        let rendered = match lookup(name) {
            Some(attr) if attr.sensitive => serde_json::Value::String("(sensitive)".to_string()),
            Some(AttributeSchema {
                attr_type: AttributeType::Block(fields),
                ..
            }) => match value {
                Value::List(items) => serde_json::Value::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::Map(block) => redact_attributes(block, &move |field: &str| {
                                fields.iter().find(|f| f.name == field)
                            }),
                            other => other.to_json(),
                        })
                        .collect(),
                ),
                other => other.to_json(),
            },
            _ => value.to_json(),
        };
        map.insert(name.clone(), rendered);
    }
    serde_json::Value::Object(map)
}
