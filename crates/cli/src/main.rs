use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use podwire_client::{Client, ClientOptions};
use podwire_core::api::{ImagePullQuery, PullEvent, RegistryAuth};
use podwire_core::{LogLevel, LoggerBuilder, PodwireConfig};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Container host URL (tcp://, unix:// or ssh://); overrides the configured default
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the container host answers
    Ping,
    /// Pull an image, printing progress
    Pull {
        /// Image reference, e.g. docker.io/library/alpine:3
        reference: String,

        /// Pull policy: always, missing, newer or never
        #[arg(long, default_value = "always")]
        policy: String,

        /// Registry username
        #[arg(short, long, requires = "password")]
        username: Option<String>,

        /// Registry password
        #[arg(short, long, requires = "username")]
        password: Option<String>,
    },
    /// Print a resource as JSON
    Inspect {
        #[arg(value_enum)]
        kind: ResourceKind,
        name: String,
    },
    /// Start a container
    Start { container: String },
    /// Stop a container; stopping a stopped container succeeds
    Stop { container: String },
    /// Remove a resource
    Rm {
        #[arg(value_enum)]
        kind: ResourceKind,
        name: String,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ResourceKind {
    Container,
    Image,
    Network,
    Secret,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Generate default configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => PodwireConfig::load_from_file(path)?,
        None => PodwireConfig::load_or_default(),
    };
    config.merge_with_env();
    if let Some(host) = &cli.host {
        config.default_host = Some(host.clone());
    }
    config.validate()?;

    init_logging(&config, cli.verbose)?;
    debug!("Configuration loaded and validated successfully");

    if let Commands::Config { action } = &cli.command {
        return handle_config_command(action, &config);
    }

    let host = config
        .default_host
        .clone()
        .context("no container host: pass --host, set default_host or CONTAINER_HOST")?;
    let client = Client::connect_url(&host, &ClientOptions::from_config(&config)).await?;
    info!("Connected to {}", client.endpoint());

    let outcome = run(&client, &cli.command).await;
    client.close().await?;
    outcome
}

fn init_logging(config: &PodwireConfig, verbose: bool) -> Result<()> {
    let mut builder = LoggerBuilder::from_config(config.logging.clone());
    if verbose {
        builder = builder.level(LogLevel::Debug);
    }
    builder.init()?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(client: &Client, command: &Commands) -> Result<()> {
    match command {
        Commands::Ping => {
            client.ping().await?;
            println!("OK");
        }
        Commands::Pull {
            reference,
            policy,
            username,
            password,
        } => {
            let query = ImagePullQuery::new(reference.as_str()).with_policy(policy.as_str());
            let auth = match (username, password) {
                (Some(user), Some(pass)) => Some(RegistryAuth::new(user.as_str(), pass.as_str())),
                _ => None,
            };

            let mut events = client.pull_image(&query, auth.as_ref()).await?;
            let mut image_id = None;
            while let Some(event) = events.recv().await {
                match event? {
                    PullEvent::Progress(progress) => print!("{}", progress.stream),
                    PullEvent::Error(failure) => anyhow::bail!("pull failed: {}", failure.error),
                    PullEvent::Images(done) => {
                        image_id = done.images.into_iter().next().or(Some(done.id));
                    }
                }
            }

            let id = image_id.context("pull finished without reporting an image id")?;
            println!("{}", id);
        }
        Commands::Inspect { kind, name } => match kind {
            ResourceKind::Container => print_json(&client.inspect_container(name).await?)?,
            ResourceKind::Image => print_json(&client.inspect_image(name).await?)?,
            ResourceKind::Network => print_json(&client.inspect_network(name).await?)?,
            ResourceKind::Secret => print_json(&client.inspect_secret(name).await?)?,
        },
        Commands::Start { container } => {
            client.start_container(container).await?;
            println!("{}", container);
        }
        Commands::Stop { container } => {
            client.stop_container(container).await?;
            println!("{}", container);
        }
        Commands::Rm { kind, name } => {
            match kind {
                ResourceKind::Container => client.delete_container(name).await?,
                ResourceKind::Image => client.delete_image(name).await?,
                ResourceKind::Network => client.delete_network(name).await?,
                ResourceKind::Secret => client.delete_secret(name).await?,
            }
            println!("{}", name);
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

/// Handle configuration subcommands
fn handle_config_command(action: &ConfigAction, config: &PodwireConfig) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("Current Configuration:");
            println!("{}", toml::to_string_pretty(config)?);
        }
        ConfigAction::Init { output } => {
            let output = output
                .clone()
                .or_else(PodwireConfig::default_path)
                .unwrap_or_else(|| PathBuf::from("podwire.toml"));
            PodwireConfig::default().save_to_file(&output)?;
            println!("Default configuration saved to: {}", output.display());
        }
    }
    Ok(())
}
