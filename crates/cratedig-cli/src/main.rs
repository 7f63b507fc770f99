// SPDX-License-Identifier: GPL-3.0-or-later
//! Binary entry point: loads configuration, wires the catalog/metadata
//! clients, persistence, job/download services and the worker together,
//! then serves the HTTP surface until a shutdown signal arrives.
//!
//! Startup and shutdown order follow spec §5 verbatim: the worker starts
//! (and repatriates stuck jobs) before the HTTP listener accepts
//! connections, and the worker is stopped before the database pool closes.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::serve;
use cratedig_api::{router, state::AppState};
use cratedig_catalog::{CachedCatalogClient, CatalogClient};
use cratedig_config::load as load_config;
use cratedig_db::Db;
use cratedig_downloader::Downloader;
use cratedig_jobs::{DownloadsService, JobService};
use cratedig_metadata::MetadataClient;
use cratedig_worker::Worker;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CATALOG_MIN_INTERVAL: Duration = Duration::from_millis(800);
const METADATA_MIN_INTERVAL: Duration = Duration::from_millis(1050);

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config(None)?;
    init_tracing(&config.telemetry);

    let db_url = format!("sqlite://{}", config.database.path);
    let db = Db::open(&db_url).await.context("opening database")?;

    let catalog_client = CatalogClient::new(config.provider.provider_url.clone(), CATALOG_MIN_INTERVAL)?;
    let catalog = CachedCatalogClient::new(catalog_client, db.clone(), config.provider.cache_ttl_duration()?);
    let metadata = MetadataClient::new(
        config.provider.external_metadata_url.clone(),
        METADATA_MIN_INTERVAL,
    )?;

    let jobs = JobService::new(db.clone());
    let downloads = DownloadsService::new(db.clone(), jobs.clone(), config.storage.downloads_dir.clone());
    let downloader = Downloader::new(
        catalog.clone(),
        config.storage.incoming_dir.clone(),
        config.provider.quality.to_string(),
    );

    let worker = Worker::new(&config, db.clone(), catalog.clone(), metadata, jobs.clone(), downloader);

    // Worker startup (and its `ResetStuckJobs` repatriation) MUST precede
    // HTTP serving so that no new jobs can race a crash-recovered one.
    let dispatcher = worker.start().await.context("starting worker")?;

    let state = AppState {
        jobs,
        downloads,
        catalog,
        auth: config.auth.clone(),
    };

    let listener = TcpListener::bind(bind_addr(config.http.port)).await?;
    let addr = listener.local_addr()?;
    info!(target: "cli", %addr, "listening");

    serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(target: "cli", "http listener stopped, shutting down worker");
    worker.stop().await;
    dispatcher.abort();
    db.close().await;
    info!(target: "cli", "shutdown complete");

    Ok(())
}

fn init_tracing(telemetry: &cratedig_config::TelemetryConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(telemetry.log_level.clone()));

    let registry = tracing_subscriber::registry().with(env_filter);

    if telemetry.log_format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

fn bind_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], port))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let mut interrupt = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .expect("install SIGINT handler");

    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("install SIGTERM handler");

    #[cfg(not(unix))]
    let interrupt = tokio::signal::ctrl_c();

    #[cfg(unix)]
    tokio::select! {
        _ = interrupt.recv() => {},
        _ = terminate.recv() => {},
    }

    #[cfg(not(unix))]
    {
        interrupt.await.expect("ctrl_c handler");
    }

    info!(target: "cli", "shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_uses_configured_port() {
        let addr = bind_addr(5150);
        assert_eq!(addr.port(), 5150);
        assert!(addr.is_ipv4());
    }
}
