// SPDX-License-Identifier: GPL-3.0-or-later

mod fixture;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fixture::Fixture;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tagsync_config::load as load_config;
use tagsync_domain::Catalog;
use tagsync_engine::{AutoModeController, MokaLookupCache};
use tracing::{info, warn};
use tracing::Subscriber;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, reload, util::SubscriberInitExt, EnvFilter,
    Layer, Registry,
};

/// Level used until the configured one is known.
const BOOTSTRAP_LOG_LEVEL: &str = "info";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Automatic album and track matching against music catalogs
#[derive(Parser)]
#[command(name = "tagsync", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the automatic matcher on a JSON fixture and print the outcome
    Run {
        /// Fixture with the folder query, local files and canned catalog responses
        #[arg(short, long)]
        fixture: PathBuf,
        /// TOML configuration file
        #[arg(short, long, env = "TAGSYNC_CONFIG")]
        config: Option<PathBuf>,
        /// Start catalog, overriding the configured one
        #[arg(long)]
        catalog: Option<Catalog>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            fixture,
            config,
            catalog,
        } => run(fixture, config, catalog).await,
    }
}

async fn run(fixture_path: PathBuf, config_path: Option<PathBuf>, catalog: Option<Catalog>) -> Result<()> {
    // configuration warnings are emitted while loading, so the subscriber comes first
    let filter = init_tracing();
    let mut config = load_config(config_path.as_deref())?;
    if let Some(filter) = filter {
        apply_log_level(&filter, &config.telemetry.log_level);
    }

    if let Some(catalog) = catalog {
        config.automode.start_catalog = catalog;
    }

    let fixture = Fixture::load(&fixture_path)?;
    info!(
        target: "cli",
        fixture = %fixture_path.display(),
        local_files = fixture.local_files.len(),
        catalogs = fixture.catalogs.len(),
        start_catalog = %config.automode.start_catalog,
        "running automatic matcher"
    );

    let controller = AutoModeController::new(fixture.registry(), &config)
        .with_cache(Arc::new(MokaLookupCache::new(&config.cache)));

    let cancelled = Arc::new(AtomicBool::new(false));
    tokio::spawn(watch_interrupt(cancelled.clone()));

    let outcome = controller
        .run(&fixture.query, &fixture.local_files, cancelled.as_ref())
        .await?;
    info!(target: "cli", state = ?outcome.decision.state(), "{}", outcome.decision.rationale());

    let rendered = serde_json::to_string_pretty(&outcome).context("failed to render outcome")?;
    println!("{rendered}");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level;
/// otherwise a reloadable filter is returned for [`apply_log_level`].
fn init_tracing() -> Option<FilterHandle> {
    match EnvFilter::try_from_default_env() {
        Ok(env_filter) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer())
                .init();
            None
        }
        Err(_) => {
            let (filter, handle) = reload::Layer::new(EnvFilter::new(BOOTSTRAP_LOG_LEVEL));
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer())
                .init();
            Some(handle)
        }
    }
}

// stdout carries the JSON outcome
fn stderr_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
}

fn apply_log_level(filter: &FilterHandle, level: &str) {
    let env_filter = match EnvFilter::try_new(level) {
        Ok(env_filter) => env_filter,
        Err(error) => {
            warn!(target: "cli", level, error = %error, "invalid log level, keeping {BOOTSTRAP_LOG_LEVEL}");
            return;
        }
    };
    if let Err(error) = filter.reload(env_filter) {
        warn!(target: "cli", level, error = %error, "failed to apply log level");
    }
}

async fn watch_interrupt(cancelled: Arc<AtomicBool>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!(target: "cli", "interrupt received, cancelling after the current catalog");
            cancelled.store(true, Ordering::SeqCst);
        }
        Err(error) => warn!(target: "cli", error = %error, "failed to install interrupt handler"),
    }
}
