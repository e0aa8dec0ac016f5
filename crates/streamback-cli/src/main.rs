mod demo;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;

use streamback_client::{CallbackStream, StreamClient, UiHandle};
use streamback_core::config::Config;
use streamback_core::{
    CallbackId, ComponentId, Dependency, DependencyKind, PropMap, StreamRegistry, TriggerRequest,
    generate_callback_id,
};
use streamback_gateway::GatewayState;

#[derive(Parser)]
#[command(
    name = "streamback",
    about = "Stream incremental UI updates from server-side generators over text/event-stream",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the demo application's streaming endpoint
    Serve {
        /// Port to listen on (default: 8050)
        #[arg(long)]
        port: Option<u16>,

        /// Delay between table chunks in milliseconds
        #[arg(long, default_value_t = 500)]
        chunk_delay_ms: u64,
    },

    /// List the demo callbacks and their ids
    Callbacks,

    /// Compute the callback id for an identity and its dependencies
    Id {
        /// Fully qualified producer name, e.g. `app::update_table`
        identity: String,

        /// Dependencies as `Input:component.property` or `State:component.property`
        #[arg(required = true)]
        dependencies: Vec<String>,
    },

    /// Trigger a callback on a running server and print every update
    Stream {
        /// Callback id
        callback_id: String,

        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:8050")]
        url: String,

        /// Trigger inputs as `name=value` (value parsed as JSON, else string)
        #[arg(short, long = "input")]
        inputs: Vec<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// Check the configuration for problems
    Validate,
}

/// Prints every update instead of rendering it.
struct PrintUi;

impl UiHandle for PrintUi {
    fn set_props(&mut self, target: &ComponentId, props: &PropMap) {
        println!("{target} <- {}", Value::Object(props.clone()));
    }

    fn alert(&mut self, message: &str) {
        eprintln!("error: {message}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::config_dir);

    let config = Config::load(&config_path)?;

    // Initialize logging
    logging::init(config.logging.as_ref(), cli.verbose);

    match cli.command {
        Commands::Serve {
            port,
            chunk_delay_ms,
        } => {
            let (warnings, errors) = config.validate();
            for warning in &warnings {
                tracing::warn!("{warning}");
            }
            if !errors.is_empty() {
                anyhow::bail!("Invalid configuration: {}", errors.join("; "));
            }

            let port = port.unwrap_or_else(|| config.port());
            let registry = Arc::new(StreamRegistry::new());
            demo::register_demo_callbacks(&registry, Duration::from_millis(chunk_delay_ms))?;

            let state = GatewayState::new(Arc::new(config), registry).with_layout(demo::demo_layout());
            #[cfg(feature = "metrics")]
            let state = state.with_prometheus(streamback_gateway::metrics::install_prometheus_recorder()?);

            tracing::info!("Starting streamback on port {port}");
            streamback_gateway::start_server(Arc::new(state), port).await?;
        }
        Commands::Callbacks => {
            let registry = StreamRegistry::new();
            demo::register_demo_callbacks(&registry, Duration::ZERO)?;
            for descriptor in registry.descriptors() {
                let deps: Vec<String> = descriptor.dependencies.iter().map(ToString::to_string).collect();
                println!("{}  {}", descriptor.id, descriptor.identity);
                println!("    dependencies: {}", deps.join(", "));
                if !descriptor.cancel_triggers.is_empty() {
                    let triggers: Vec<String> = descriptor
                        .cancel_triggers
                        .iter()
                        .map(|t| format!("{} == {}", t.source, t.expected))
                        .collect();
                    println!("    cancel on: {}", triggers.join(", "));
                }
            }
        }
        Commands::Id {
            identity,
            dependencies,
        } => {
            let dependencies = dependencies
                .iter()
                .map(|d| parse_dependency(d))
                .collect::<anyhow::Result<Vec<_>>>()?;
            println!("{}", generate_callback_id(&identity, &dependencies));
        }
        Commands::Stream {
            callback_id,
            url,
            inputs,
        } => {
            let mut request = TriggerRequest::new(CallbackId::from(callback_id.as_str()));
            for input in &inputs {
                let (name, value) = input
                    .split_once('=')
                    .ok_or_else(|| anyhow::anyhow!("Input must be name=value: {input}"))?;
                let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
                request = request.with_input(name, value);
            }

            let client = StreamClient::new(&url).with_endpoint(&config.endpoint());
            let mut stream = CallbackStream::new(request.callback_id.clone());
            client.run(&request, &mut stream, &mut PrintUi).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("No config value at '{key}'"),
            },
            ConfigAction::Set { key, value } => {
                let mut config = config;
                let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
                config.set_path(&key, value)?;
                config.save(&config_path)?;
                println!("Set {key} in {}", config_path.display());
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
                println!("Configuration OK");
            }
        },
    }

    Ok(())
}

/// Parse `Input:component.property` / `State:component.property`.
///
/// The component may be a pattern id in its JSON form.
fn parse_dependency(raw: &str) -> anyhow::Result<Dependency> {
    let (kind, rest) = raw
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Dependency must look like Input:component.property: {raw}"))?;
    let kind = match kind.to_ascii_lowercase().as_str() {
        "input" => DependencyKind::Input,
        "state" => DependencyKind::State,
        other => anyhow::bail!("Unknown dependency kind '{other}'"),
    };
    let (component, property) = rest
        .rsplit_once('.')
        .ok_or_else(|| anyhow::anyhow!("Dependency is missing a property: {raw}"))?;
    Ok(Dependency {
        kind,
        component: ComponentId::from_key(component),
        property: property.to_string(),
    })
}
