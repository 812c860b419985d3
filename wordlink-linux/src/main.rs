// Wordlink Linux: peer transport daemon for the word game (listener, sender, stdin control).

mod adapter;
mod config;
mod connection;
mod context;
mod control;
mod games;
mod listener;
mod sender;
mod service;
mod store;
#[cfg(test)]
mod testutil;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use wordlink_core::AddressBook;

use crate::adapter::{Adapter, TcpAdapter};
use crate::context::{LogEvents, Timeouts, TransportContext};
use crate::games::InMemoryGames;
use crate::service::TransportService;
use crate::store::FileAddressStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let mut config_path: Option<PathBuf> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("wordlink-linux {}", VERSION);
                return Ok(());
            }
            "--config" | "-c" => {
                let path = args.next().context("--config needs a path")?;
                config_path = Some(PathBuf::from(path));
            }
            other => anyhow::bail!("unknown argument {other:?} (try --version or --config <path>)"),
        }
    }

    let cfg = config::load(config_path.as_deref())?;
    init_tracing(&cfg.log_level)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cfg))
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("initialising logging: {e}"))
}

async fn run(cfg: config::Config) -> anyhow::Result<()> {
    let store = Arc::new(FileAddressStore::new(cfg.address_file()));
    let address_book = Arc::new(AddressBook::load(store));
    let adapter = Arc::new(TcpAdapter::new(
        cfg.device_name.clone(),
        &cfg.paired,
        cfg.listen_port,
    ));
    let games = Arc::new(InMemoryGames::new());
    tracing::info!(
        "{} starting: {} paired, {} known addresses",
        adapter.local_name(),
        cfg.paired.len(),
        address_book.len()
    );
    let ctx = Arc::new(TransportContext::new(
        address_book,
        adapter,
        games.clone(),
        games.clone(),
        Arc::new(LogEvents),
        Timeouts::from(&cfg),
    ));

    let bind = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
    let service = TransportService::start(ctx, bind)
        .await
        .context("starting transport")?;
    tracing::info!("listening on {}", service.local_addr());
    let handle = service.handle();
    tokio::spawn(control::run(handle.clone(), games));

    tokio::select! {
        r = shutdown_signal() => {
            r?;
            tracing::info!("signal received, stopping");
            handle.shutdown();
        }
        _ = handle.stopped() => {}
    }
    service.wait().await;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
