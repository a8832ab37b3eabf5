// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, process::ExitCode, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use club_shares_server::{
    api::{admin::init_server_start_time, router},
    clock::SystemClock,
    config::AppConfig,
    payments::GatewayRegistry,
    purchase::MaintenanceTask,
    state::{AppState, AuthConfig},
    storage::{FileStorage, ShareLedger, StoragePaths},
};

/// Time in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    init_server_start_time();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Must happen before any TLS configuration is built.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    let config = AppConfig::from_env()?;

    let mut storage = FileStorage::new(StoragePaths::new(&config.data_dir));
    storage.initialize()?;
    let ledger = Arc::new(ShareLedger::open(&storage.paths().ledger_db())?);
    tracing::info!(data_dir = %config.data_dir.display(), "Storage initialized");

    let gateways = GatewayRegistry::from_env();
    tracing::info!(providers = ?gateways.providers(), "Payment gateways registered");

    let auth_config = AuthConfig::from_settings(&config.auth)?;
    if !auth_config.is_production() {
        tracing::warn!("AUTH_JWKS_URL not set: bearer tokens are only accepted by dev builds");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let tls = config.tls.clone();

    let state = AppState::new(config, storage, ledger, gateways, Arc::new(SystemClock))?
        .with_auth(auth_config);

    let shutdown = CancellationToken::new();
    let maintenance = MaintenanceTask::new(
        state.orchestrator.clone(),
        state.config.maintenance_interval,
        state.config.sweep_max_age,
        state.config.certificate_retention,
    );
    let maintenance_handle = tokio::spawn(maintenance.run(shutdown.clone()));

    let handle = Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });

    let app = router(state).into_make_service();
    match tls {
        Some(tls) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await?;
            tracing::info!(%addr, "Club shares server listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(app)
                .await?;
        }
        None => {
            tracing::warn!(%addr, "TLS not configured: serving plain http (docs at /docs)");
            axum_server::bind(addr).handle(handle).serve(app).await?;
        }
    }

    shutdown.cancel();
    if let Err(e) = maintenance_handle.await {
        tracing::warn!(error = %e, "Maintenance task did not stop cleanly");
    }
    tracing::info!("Server stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
