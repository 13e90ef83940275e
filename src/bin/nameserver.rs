//! Name server binary

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tablens::{NameServerConfig, NameServerRunner};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tablens-nameserver")]
#[command(about = "tablens cluster name server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the name server
    Serve {
        /// Advertised endpoint of this instance
        #[arg(long, default_value = "127.0.0.1:9527")]
        endpoint: String,

        /// Bind address for the admin gRPC API
        #[arg(long, default_value = "0.0.0.0:9527")]
        listen: String,

        /// Bind address for the admin HTTP API
        #[arg(long, default_value = "0.0.0.0:9528")]
        http: String,

        /// Root path of the durable tree
        #[arg(long, default_value = "/tablens")]
        root: String,

        /// Optional JSON config file; CLI flags take priority
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            endpoint,
            listen,
            http,
            root,
            config,
        } => {
            let mut ns_config = match config {
                Some(path) => NameServerConfig::from_file(path)?,
                None => NameServerConfig::default(),
            };
            ns_config.endpoint = endpoint;
            ns_config.listen_addr = listen.parse()?;
            ns_config.http_addr = http.parse()?;
            ns_config.coord_root_path = root;

            NameServerRunner::new(ns_config).serve().await?;
        }
    }

    Ok(())
}
