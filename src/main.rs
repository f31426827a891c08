// ============================================================================
// BANKROLL LEDGER SERVER
// ============================================================================
//
// Accounts, deposits, withdrawals, transfers and bonus bets over HTTP.
// Storage backend is picked by BANKROLL_STORE (memory | redb | supabase).
//
// Run:  cargo run
// Test: curl http://localhost:8080/health

use std::process::ExitCode;

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bankroll::{router, AppConfig, AppState, Ledger};

// ============================================================================
// GRACEFUL SHUTDOWN
// ============================================================================

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
    warn!("Shutdown signal received");
}

// ============================================================================
// MAIN
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    // 1. Logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,bankroll=debug")))
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
        .init();

    // 2. Config
    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    // 3. Store
    let store = match config.open_store() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, backend = ?config.store, "Storage init failed");
            return ExitCode::FAILURE;
        }
    };
    info!(backend = store.backend(), "Storage ready");

    // 4. Ledger + routes
    let ledger = Ledger::new(store).with_policy(config.policy);
    let app = router(AppState::new(ledger));

    // 5. HTTP server
    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, addr = %config.bind_addr, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    info!(addr = %config.bind_addr, version = bankroll::routes::VERSION, "Listening");
    info!("   GET  /health");
    info!("   GET  /accounts            POST /accounts   PUT /accounts");
    info!("   GET  /accounts/{{id}}");
    info!("   POST /deposits            POST /withdrawals");
    info!("   POST /transfer");
    info!("   POST /bonuses             POST /bonuses/consume");
    info!("   GET  /ledger?accountId=&limit=");

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}
