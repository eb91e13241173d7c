//! # shelf-sync
//!
//! Operator entry point: runs one synchronization between the POS catalog
//! and the storefront catalog.
//!
//! ```text
//! shelf-sync [CONFIG_PATH]
//!
//!   config ──► identity store ──► clients (rate limited) ──► SyncJob
//!                                                              │
//!                                  exit 0 + report  ◄──────────┤
//!                                  exit 1 + message ◄──────────┘
//! ```
//!
//! Log verbosity follows `RUST_LOG` and defaults to `info`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use shelf_db::{Database, DbConfig};
use shelf_sync::{
    PosCatalogClient, RateLimiter, ReconciliationReport, StorefrontCatalogClient, SyncConfig,
    SyncJob,
};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    match synchronize().await {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %format!("{:#}", err), "Synchronization failed");
            eprintln!("shelf-sync: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn synchronize() -> anyhow::Result<ReconciliationReport> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = SyncConfig::load(config_path).context("loading configuration")?;
    info!(
        pos = %config.pos.base_url,
        storefront = %config.storefront.graphql_url,
        read_only = config.storefront.read_only,
        "Configuration loaded"
    );

    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let database = Database::new(DbConfig::new(config.database.path.clone()))
        .await
        .context("opening identity store")?;

    let policy = config.rate_limit.policy();
    let pos = PosCatalogClient::new(&config.pos, Arc::new(RateLimiter::new("pos", policy)))
        .context("building POS client")?;
    let storefront = StorefrontCatalogClient::new(
        &config.storefront,
        Arc::new(RateLimiter::new("storefront", policy)),
    )
    .context("building storefront client")?;

    let report = SyncJob::new(Arc::new(pos), Arc::new(storefront), database.identity())
        .drift_detection(config.reconcile.drift_detection)
        .start()?
        .wait()
        .await?;

    database.close().await;
    Ok(report)
}

fn print_report(report: &ReconciliationReport) {
    info!(%report, "Synchronization finished");
    for item in &report.unsynced {
        warn!(
            catalog = %item.catalog,
            id = %item.id,
            name = %item.name,
            reason = %item.reason,
            "Not synchronized"
        );
    }
    for warning in &report.warnings {
        warn!("{}", warning);
    }
    println!("{}", report);
}
