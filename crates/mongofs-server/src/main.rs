//! Mock server binary

use anyhow::Context;
use clap::Parser;
use mongofs_server::{logging, LogLevel, MockServer, ServerConfig};
use std::path::PathBuf;
use tokio::signal;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mongofs-server")]
#[command(about = "In-memory mock document database server")]
struct Args {
    /// Config file (JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    port: Option<u16>,

    /// Seed data file (JSON or YAML)
    #[arg(short, long)]
    mocks: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<LogLevel>,

    /// Disable colored log output
    #[arg(long, default_value = "false")]
    no_colors: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ServerConfig::default(),
        };
        if let Some(host) = self.host {
            config = config.host(host);
        }
        if let Some(port) = self.port {
            config = config.port(port);
        }
        if let Some(path) = &self.mocks {
            config = config
                .mocks_file(path)
                .with_context(|| format!("loading mocks {}", path.display()))?;
        }
        if let Some(level) = self.log_level {
            config = config.log_level(level);
        }
        if self.no_colors {
            config = config.colors(false);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;
    logging::init(&config);

    let server = MockServer::with_config(config)?;
    let addr = server.start().await?;
    info!("Listening on mongodb://{}", addr);

    signal::ctrl_c().await?;
    info!("Received shutdown signal");

    server.stop().await?;
    Ok(())
}
