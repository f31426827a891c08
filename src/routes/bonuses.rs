// ============================================================================
// BONUS BET ROUTES
// ============================================================================
//
//   POST /bonuses          grant bonus bets, validity window restarted
//   POST /bonuses/consume  spend active bonus bets
// ============================================================================

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use super::{body, ledger_error, ApiResult, AppState};
use crate::ledger::validation::require_amount;
use crate::types::Account;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantBonusRequest {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub amount: Option<Value>,
    /// Free-form label such as "free_bet" or "odds_boost".
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeBonusRequest {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub amount: Option<Value>,
}

/// POST /bonuses
pub async fn grant_bonus_handler(
    State(state): State<AppState>,
    payload: Result<Json<GrantBonusRequest>, JsonRejection>,
) -> ApiResult<Account> {
    let req = body(payload)?;
    let amount = require_amount("amount", req.amount.as_ref()).map_err(ledger_error)?;

    state
        .ledger
        .grant_bonus(&req.account_id, amount, req.kind.as_deref())
        .await
        .map(Json)
        .map_err(ledger_error)
}

/// POST /bonuses/consume
pub async fn consume_bonus_handler(
    State(state): State<AppState>,
    payload: Result<Json<ConsumeBonusRequest>, JsonRejection>,
) -> ApiResult<Account> {
    let req = body(payload)?;
    let amount = require_amount("amount", req.amount.as_ref()).map_err(ledger_error)?;

    state
        .ledger
        .consume_bonus(&req.account_id, amount)
        .await
        .map(Json)
        .map_err(ledger_error)
}
