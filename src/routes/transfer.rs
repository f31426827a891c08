// ============================================================================
// TRANSFER ROUTE
// ============================================================================
//
// Both legs commit in one batch. The response is the full account listing
// read after the commit, so the caller sees both new balances at once.
// ============================================================================

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use super::{body, ledger_error, ApiResult, AppState};
use crate::ledger::validation::require_amount;
use crate::types::AccountView;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(default)]
    pub from_id: String,
    #[serde(default)]
    pub to_id: String,
    #[serde(default)]
    pub amount: Option<Value>,
}

/// POST /transfer
pub async fn transfer_handler(
    State(state): State<AppState>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> ApiResult<Vec<AccountView>> {
    let req = body(payload)?;
    let amount = require_amount("amount", req.amount.as_ref()).map_err(ledger_error)?;

    state
        .ledger
        .transfer(&req.from_id, &req.to_id, amount)
        .await
        .map(Json)
        .map_err(ledger_error)
}
