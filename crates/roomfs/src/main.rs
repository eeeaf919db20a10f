//! roomfs binary.
//!
//! # Usage
//!
//! ```bash
//! # Write a default configuration file, then edit it
//! roomfs --conf
//!
//! # Run as a guest against the configured homeserver
//! roomfs
//!
//! # Named service with its own configuration and buffer directory
//! roomfs -s work -a matrix.example.org -l ~/chat/work
//! ```
//!
//! Commands are read from stdin, one `<buffer> <command> [args...]` per line.

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use roomfs::{Config, DirectoryStore, LineSource};
use roomfs_core::Session;
use roomfs_matrix::MatrixClient;
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Matrix rooms as named file buffers
#[derive(Parser, Debug)]
#[command(name = "roomfs")]
#[command(about = "Expose Matrix rooms as named file buffers")]
#[command(version)]
struct Args {
    /// Service name; selects the configuration file and buffer directory
    #[arg(short, long, default_value = "roomfs")]
    service: String,

    /// Homeserver address, overriding the configuration file
    #[arg(short, long)]
    address: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Buffer directory, overriding the configuration file
    #[arg(short, long)]
    log_dir: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a default configuration file and exit
    #[arg(long)]
    conf: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let path = match args.config {
        Some(path) => path,
        None => Config::default_path(&args.service)?,
    };

    if args.conf {
        Config::create(&path)?;
        tracing::info!(path = %path.display(), "wrote default configuration");
        return Ok(());
    }

    let mut config = Config::load(&path)?;
    if let Some(address) = args.address {
        config.address = address;
    }
    if let Some(dir) = args.log_dir {
        config.log_dir = Some(dir);
    }

    let homeserver = config.homeserver()?;
    let root = config.buffer_root(&args.service)?;
    let store = DirectoryStore::open(&root)?;
    let client = MatrixClient::new(&homeserver)?;

    tracing::info!(
        service = %args.service,
        homeserver = %homeserver,
        root = %root.display(),
        "roomfs starting"
    );

    let commands = LineSource::new(BufReader::new(tokio::io::stdin()));
    let session = Session::new(Arc::new(client), Arc::new(store), commands, config.session);

    let handle = session.handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupted, shutting down");
                handle.quit();
            },
            Err(e) => tracing::warn!(error = %e, "cannot listen for interrupts"),
        }
    });

    session.run().await?;
    tracing::info!("roomfs stopped");
    Ok(())
}
