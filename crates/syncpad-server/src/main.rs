//! Syncpad server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port
//! syncpad-server
//!
//! # Custom bind address and limits
//! syncpad-server --bind 0.0.0.0:7420 --max-connections 500 --log-level debug
//! ```

use std::time::Duration;

use clap::Parser;
use syncpad_server::{Server, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Syncpad room registry server
#[derive(Parser, Debug)]
#[command(name = "syncpad-server")]
#[command(about = "Room registry and broadcast router for Syncpad")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:7420")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Seconds a silent session survives before being swept
    #[arg(long, default_value = "60")]
    idle_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = ServerConfig {
        max_connections: args.max_connections,
        idle_timeout: Duration::from_secs(args.idle_timeout_secs),
        ..Default::default()
    };

    let server = Server::bind(&args.bind, config).await?;

    tracing::info!("Syncpad server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
