//! oxircd - IRC server binary

use clap::Parser;
use oxircd_core::{Config, Server};
use std::path::PathBuf;
use tracing::{error, info};

/// An RFC 1459 IRC server
#[derive(Parser)]
#[command(name = "oxircd")]
#[command(about = "An RFC 1459 IRC server")]
#[command(version)]
struct Cli {
    /// Port to listen on (1024-65535)
    port: u16,

    /// Connection password clients must supply with PASS
    password: String,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(1);
    });

    if cli.port <= 1023 {
        eprintln!("error: port must be between 1024 and 65535");
        std::process::exit(1);
    }

    init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match cli.config {
        Some(ref path) if path.exists() => {
            info!("loading configuration from {}", path.display());
            Config::from_file(path)?
        }
        Some(ref path) => {
            anyhow::bail!("configuration file not found: {}", path.display());
        }
        None => Config::default(),
    };
    config.validate()?;

    let mut server = Server::new(config, cli.password)?;
    spawn_signal_handlers(server.stop_handle())?;

    server.run(cli.port).await?;
    Ok(())
}

/// Initialize logging
fn init_logging(level: &str) {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();
}

/// SIGINT and SIGTERM both request a graceful shutdown
fn spawn_signal_handlers(handle: oxircd_core::StopHandle) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("SIGINT received, shutting down"),
            _ = terminate.recv() => info!("SIGTERM received, shutting down"),
        }
        handle.stop();
    });
    Ok(())
}
