//! Tether Server Binary

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use tether_config::{ConfigLoader, TetherConfig};
use tether_server::Server;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Server bind address, overrides the configuration file
    #[arg(short, long, value_name = "HOST:PORT")]
    bind: Option<SocketAddr>,

    /// Print a sample configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", TetherConfig::generate_sample());
        return Ok(());
    }

    let mut config = ConfigLoader::new()
        .load(cli.config.as_deref())
        .context("failed to load configuration")?;

    if let Some(bind) = cli.bind {
        let mut server = config.server_or_default();
        server.bind_address = bind.ip().to_string();
        server.port = bind.port();
        config.server = Some(server);
    }

    tether_logging::init_logging_from_config(&config.logging)?;

    Server::new(config)?.start().await
}
