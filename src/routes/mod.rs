// ============================================================================
// HTTP ROUTES
// ============================================================================
//
// accounts.rs   GET/POST/PUT /accounts, GET /accounts/{id}
// funds.rs      POST /deposits, POST /withdrawals
// transfer.rs   POST /transfer
// bonuses.rs    POST /bonuses, POST /bonuses/consume
// journal.rs    GET /ledger
//
// Every failure is answered with `{ "error": "<message>" }`.
// ============================================================================

pub mod accounts;
pub mod bonuses;
pub mod funds;
pub mod journal;
pub mod transfer;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::ledger::{Ledger, LedgerError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// STATE
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
}

impl AppState {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn err(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": msg.into() })))
}

pub fn status_for(e: &LedgerError) -> StatusCode {
    match e {
        LedgerError::Validation(_)
        | LedgerError::InsufficientFunds { .. }
        | LedgerError::InsufficientBonus { .. } => StatusCode::BAD_REQUEST,
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::Conflict(_) => StatusCode::CONFLICT,
        LedgerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map a core failure to its HTTP answer and log it.
pub fn ledger_error(e: LedgerError) -> ApiError {
    let status = status_for(&e);
    if status.is_server_error() {
        error!(error = %e, "Ledger operation failed");
    } else {
        warn!(status = status.as_u16(), error = %e, "Request rejected");
    }
    err(status, e.to_string())
}

/// Unwrap a JSON body, answering malformed input with 400.
pub fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(req)) => Ok(req),
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Malformed request body");
            Err(err(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", rejection.body_text())))
        }
    }
}

// ============================================================================
// HEALTH
// ============================================================================

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.ledger.list_accounts().await {
        Ok(accounts) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "version": VERSION,
                "backend": state.ledger.backend(),
                "accounts": accounts.len(),
            })),
        ),
        Err(e) => {
            error!(error = %e, backend = state.ledger.backend(), "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "backend": state.ledger.backend(),
                    "error": e.to_string(),
                })),
            )
        }
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        // Accounts
        .route(
            "/accounts",
            get(accounts::list_accounts_handler)
                .post(accounts::create_account_handler)
                .put(accounts::update_account_handler),
        )
        .route("/accounts/{id}", get(accounts::get_account_handler))
        // Ledger operations
        .route("/deposits", post(funds::deposit_handler))
        .route("/withdrawals", post(funds::withdraw_handler))
        .route("/transfer", post(transfer::transfer_handler))
        .route("/bonuses", post(bonuses::grant_bonus_handler))
        .route("/bonuses/consume", post(bonuses::consume_bonus_handler))
        // Journal
        .route("/ledger", get(journal::ledger_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
