// ============================================================================
// DEPOSITS & WITHDRAWALS
// ============================================================================

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use super::{body, ledger_error, ApiResult, AppState};
use crate::ledger::validation::{parse_amount, require_amount};
use crate::types::Account;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub bonus_bets: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub amount: Option<Value>,
}

/// POST /deposits
pub async fn deposit_handler(
    State(state): State<AppState>,
    payload: Result<Json<DepositRequest>, JsonRejection>,
) -> ApiResult<Account> {
    let req = body(payload)?;
    let amount = parse_amount("amount", req.amount.as_ref()).map_err(ledger_error)?;
    let bonus_bets = parse_amount("bonusBets", req.bonus_bets.as_ref()).map_err(ledger_error)?;

    state
        .ledger
        .deposit(&req.account_id, amount, bonus_bets)
        .await
        .map(Json)
        .map_err(ledger_error)
}

/// POST /withdrawals
pub async fn withdraw_handler(
    State(state): State<AppState>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> ApiResult<Account> {
    let req = body(payload)?;
    let amount = require_amount("amount", req.amount.as_ref()).map_err(ledger_error)?;

    state
        .ledger
        .withdraw(&req.account_id, amount)
        .await
        .map(Json)
        .map_err(ledger_error)
}
