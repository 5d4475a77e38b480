//! courierd — the courier daemon binary.

use anyhow::{Context, Result};
use backend::{Gcm, PgStore, Store};
use clap::Parser;
use courier_daemon::{Config, Server, init_database};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Push notification fan-out daemon.
#[derive(Parser, Debug)]
#[command(name = "courierd", about = "Push notification fan-out daemon")]
struct Cli {
    /// Create the database schema named in the config file and exit.
    /// Create the database first and make sure the configured user may
    /// define tables in it.
    #[arg(long)]
    initdb: bool,

    /// Append logs to this file instead of stdout.
    #[arg(long, short = 'l')]
    logfile: Option<PathBuf>,

    /// Path to the JSON configuration file.
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.logfile.as_deref())?;

    // A panic anywhere means an invariant was violated badly enough that
    // continuing risks corrupting the catalog; take the process down.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        std::process::exit(101);
    }));

    let config = Config::load(&cli.config)?;

    if cli.initdb {
        return init_database(&config).await;
    }

    let store = Store::Postgres(PgStore::connect(&config.postgres, [Gcm::NAME]).await?);
    let server = Server::bind(&config, store).await?;

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            let _ = stop_tx.send(());
        }
    });

    server.run(stop_rx).await
}

fn init_tracing(logfile: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match logfile {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}
