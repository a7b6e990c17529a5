// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Collection Mover Service
//!
//! Serves the collection mover API over HTTP:
//!
//! - Lists and pages through collections and companies
//! - Moves single companies inline
//! - Runs bulk moves as chunked background jobs
//! - Streams job progress as server-sent events

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dropshot::{ConfigDropshot, ConfigLogging, ConfigLoggingLevel, HttpServerStarter};
use tokio::sync::watch;
use tracing::info;

use collection_mover::CollectionMoverImpl;
use collection_mover::config::{DEFAULT_BIND_ADDRESS, MoverConfig};
use collection_mover::context::ApiContext;
use collection_mover::metrics;
use collection_mover::store::MemoryStore;

/// Default maximum request body size (bytes).
const DEFAULT_BODY_MAX_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Detail recorded on jobs still running when the server stops.
const SHUTDOWN_DETAIL: &str = "server shutting down";

/// Time given to open status streams to flush their final event.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

fn print_version() {
    let version = env!("CARGO_PKG_VERSION");
    let name = env!("CARGO_PKG_NAME");
    let buildstamp = option_env!("STAMP").unwrap_or("no-STAMP");
    println!("{} {} ({})", name, version, buildstamp);
}

fn print_help(program: &str) {
    print_version();
    println!("Usage: {} [OPTIONS]", program);
    println!();
    println!("Options:");
    println!("  -h, --help       Display this information");
    println!("  -V, --version    Display the program's version number");
    println!();
    println!("Environment variables:");
    println!(
        "  BIND_ADDRESS         Server bind address (default: {})",
        DEFAULT_BIND_ADDRESS
    );
    println!("  SEED_COMPANY_COUNT   Demo companies created at start-up (default: 10000)");
    println!("  CHUNK_SIZE           Companies per chunk (default: 100)");
    println!("  MAX_CHUNK_RETRIES    Retries of a failing chunk (default: 3)");
    println!("  RETRY_BASE_DELAY_MS  First retry delay (default: 100)");
    println!("  RETRY_MAX_DELAY_MS   Retry delay cap (default: 2000)");
    println!("  JOB_RETENTION_SECS   How long finished jobs are kept (default: 300)");
    println!("  EVENT_BUFFER         Progress events buffered per subscriber (default: 16)");
    println!("  CONFIG_FILE          Path to JSON config file for SIGUSR1 reloading (optional)");
    println!("  RUST_LOG             Log filter (default: collection_mover=info,dropshot=info)");
}

/// Resolves on SIGINT or (Unix) SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --version and --help
    let args: Vec<String> = std::env::args().collect();
    #[allow(clippy::never_loop)] // Intentional: early return on first recognized arg
    for arg in &args[1..] {
        match arg.as_str() {
            "-V" | "--version" => {
                print_version();
                return Ok(());
            }
            "-h" | "--help" => {
                print_help(&args[0]);
                return Ok(());
            }
            _ => {
                eprintln!("Unknown option: {}", arg);
                std::process::exit(1);
            }
        }
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "collection_mover=info,dropshot=info".to_string()),
        ))
        .init();

    print_version();

    // Load configuration
    let config = MoverConfig::from_env().context("Failed to load configuration")?;
    info!(
        chunk_size = config.chunk_size,
        max_chunk_retries = config.max_chunk_retries,
        job_retention_secs = config.job_retention_secs,
        "Configuration loaded"
    );

    let (config_tx, config_rx) = watch::channel(config.clone());

    // Start config file watcher if CONFIG_FILE is set (Unix only)
    #[cfg(unix)]
    if let Ok(config_file) = std::env::var("CONFIG_FILE") {
        use std::path::PathBuf;

        let config_path = PathBuf::from(&config_file);
        if tokio::fs::try_exists(&config_path).await.unwrap_or(false) {
            tokio::spawn(MoverConfig::start_config_watcher(
                config_path,
                config.clone(),
                config_tx,
            ));
            info!(
                config_file = %config_file,
                "Config watcher started - send SIGUSR1 to reload"
            );
        } else {
            tracing::warn!(
                config_file = %config_file,
                "CONFIG_FILE specified but file does not exist, config reloading disabled"
            );
        }
    }

    metrics::register_metrics();

    let store = Arc::new(MemoryStore::seeded(config.seed_company_count).await);
    let api_context = ApiContext::new(store, config_rx.clone());
    let registry = Arc::clone(&api_context.registry);

    let reaper_config = config_rx.clone();
    let _reaper = registry.spawn_reaper(move || reaper_config.borrow().job_retention());

    // Get API description from the trait implementation
    let api = collection_mover_api::collection_mover_api_mod::api_description::<
        CollectionMoverImpl,
    >()
    .map_err(|e| anyhow::anyhow!("Failed to create API description: {}", e))?;

    // Configure the server
    let bind_address = config
        .bind_address
        .parse()
        .context("Invalid BIND_ADDRESS")?;

    let config_dropshot = ConfigDropshot {
        bind_address,
        default_request_body_max_bytes: DEFAULT_BODY_MAX_BYTES,
        default_handler_task_mode: dropshot::HandlerTaskMode::Detached,
        ..Default::default()
    };

    let config_logging = ConfigLogging::StderrTerminal {
        level: ConfigLoggingLevel::Info,
    };

    let log = config_logging
        .to_logger("collection-mover")
        .map_err(|error| anyhow::anyhow!("failed to create logger: {}", error))?;

    // Start the server
    let server = HttpServerStarter::new(&config_dropshot, api, api_context, &log)
        .map_err(|error| anyhow::anyhow!("failed to create server: {}", error))?
        .start();

    info!("Collection mover running on http://{}", server.local_addr());

    tokio::select! {
        result = server => {
            result.map_err(|error| anyhow::anyhow!("server failed: {}", error))
        }
        _ = shutdown_signal() => {
            let failed = registry.fail_unfinished(SHUTDOWN_DETAIL);
            info!(failed_jobs = failed, "Shutting down");
            tokio::time::sleep(SHUTDOWN_GRACE).await;
            Ok(())
        }
    }
}
