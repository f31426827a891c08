// ============================================================================
// LEDGER JOURNAL
// ============================================================================

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{err, ledger_error, ApiResult, AppState};
use crate::types::LedgerEntry;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerQuery {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

impl Default for LedgerQuery {
    fn default() -> Self {
        Self {
            account_id: None,
            limit: default_limit(),
        }
    }
}

/// GET /ledger?accountId=&limit=
pub async fn ledger_handler(
    State(state): State<AppState>,
    query: Result<Query<LedgerQuery>, QueryRejection>,
) -> ApiResult<Vec<LedgerEntry>> {
    let Query(query) = query.map_err(|e| err(StatusCode::BAD_REQUEST, e.body_text()))?;

    state
        .ledger
        .entries(query.account_id.as_deref(), query.limit)
        .await
        .map(Json)
        .map_err(ledger_error)
}
