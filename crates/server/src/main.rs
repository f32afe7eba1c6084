//! arch-wiki-search entry point.
//!
//! Starts the caching proxy for one wiki, warms the requested search page,
//! opens a browser on it and serves until interrupted. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use wikisearch_client::{ContentStore, FetchPolicy, HttpOrigin, OriginBase, SessionConfig};
use wikisearch_core::AppConfig;
use wikisearch_core::cache::directory;
use wikisearch_core::wikis::Wikis;

mod browser;
mod cli;
mod error;
mod prefetch;
mod proxy;
#[cfg(test)]
mod testing;

use cli::Cli;
use error::StartupError;
use proxy::ProxyServer;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            e.into()
        }
    }
}

async fn run(cli: &Cli) -> Result<(), StartupError> {
    let mut config = AppConfig::load()?;
    cli.apply(&mut config);
    config.validate()?;

    let wikis = Wikis::load();
    tracing::debug!(sources = ?wikis.sources(), "known wikis loaded");
    if config.wiki == "help" {
        print!("{}", wikis.help_string());
        return Ok(());
    }
    let wiki = wikis.get(&config.wiki)?;
    let (base, search_path) = cli.target(wiki);

    let origin = OriginBase::parse(&base)?;
    let mut session = SessionConfig::from_app(&config, origin);
    session.policy = cli.policy();
    session.debug = cli.debug;
    tracing::debug!(?session, "session");

    let http = Arc::new(HttpOrigin::new(session.fetch_config())?);
    let store = ContentStore::open(&session, http).await?;

    if cli.clear_cache {
        let removed = store.clear().await?;
        tracing::info!(removed, dir = %session.cache_dir.display(), "cache cleared");
        store.close().await?;
        log_cache_size(session.cache_dir.clone()).await;
        return Ok(());
    }

    if session.policy != FetchPolicy::Offline {
        match store.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "expired entries removed"),
            Err(e) => tracing::warn!("could not purge expired entries: {e}"),
        }
    }

    let mut proxy = ProxyServer::new(&session, store);
    let mut states = proxy.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            tracing::debug!(state = ?*states.borrow_and_update(), "proxy state");
        }
    });
    proxy.start().await?;
    log_cache_size(session.cache_dir.clone()).await;

    // Warm the landing page before the browser asks for it.
    proxy.pipeline().handle(&search_path).await;

    let url = session.local_url(&search_path);
    if cli.no_browser {
        println!("{url}");
    } else {
        browser::launch(url.clone(), cli.browser.clone());
    }
    tracing::info!(%url, "serving {}; press Ctrl-C to stop", session.origin);

    shutdown_signal().await;

    proxy.stop().await?;
    log_cache_size(session.cache_dir).await;
    Ok(())
}

async fn log_cache_size(dir: PathBuf) {
    let shown = dir.display().to_string();
    match cache_size(dir).await {
        Ok(bytes) => tracing::info!(dir = %shown, "cache size: {}", directory::human_size(bytes)),
        Err(e) => tracing::warn!(dir = %shown, "{e:#}"),
    }
}

async fn cache_size(dir: PathBuf) -> anyhow::Result<u64> {
    let bytes = tokio::task::spawn_blocking(move || directory::size_on_disk(&dir))
        .await
        .context("cache size task failed")?
        .context("could not measure cache")?;
    Ok(bytes)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_size_counts_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cache.sqlite"), [0u8; 2048]).unwrap();
        assert_eq!(cache_size(dir.path().to_path_buf()).await.unwrap(), 2048);
    }

    #[tokio::test]
    async fn test_cache_size_error_has_context() {
        let dir = tempfile::tempdir().unwrap();
        let err = cache_size(dir.path().join("gone")).await.unwrap_err();
        assert!(format!("{err:#}").starts_with("could not measure cache"), "{err:#}");
    }
}
