use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tessera_node::{api, NodeConfig, TesseraNode};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Tessera - verifiable compute marketplace node", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the marketplace node
    Start {
        /// Port for the HTTP API, overriding the config file
        #[arg(long)]
        api_port: Option<u16>,
    },

    /// Write a default configuration file
    Init {
        /// Output path for the configuration
        #[arg(short, long, default_value = "tessera.toml")]
        output: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { api_port } => {
            let mut config = match &cli.config {
                Some(path) => NodeConfig::load(path)?,
                None => NodeConfig::standalone(),
            };
            if let Some(port) = api_port {
                config.api.port = port;
            }

            let host = config.api.host.clone();
            let port = config.api.port;
            let node = TesseraNode::new(config).await?;
            api::serve(node, &host, port).await
        }
        Commands::Init { output } => {
            NodeConfig::standalone().save(&output)?;
            info!(path = %output.display(), "Configuration written");
            Ok(())
        }
    }
}
