// ============================================================================
// ACCOUNT ROUTES
// ============================================================================
//
// GET  /accounts        listing sorted by name, bonus records nested
// GET  /accounts/{id}   single account view
// POST /accounts        create (201)
// PUT  /accounts        explicit balance / bonus correction
// ============================================================================

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{body, ledger_error, ApiError, ApiResult, AppState};
use crate::ledger::validation::{parse_amount, require_amount};
use crate::ledger::{AccountUpdate, LedgerError, NewAccount};
use crate::types::{Account, AccountType, AccountView};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub account_type: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub balance: Option<Value>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub bonus_bets: Option<Value>,
    #[serde(default)]
    pub bonus_expiry: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub balance: Option<Value>,
    #[serde(default)]
    pub bonus_bets: Option<Value>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// GET /accounts
pub async fn list_accounts_handler(State(state): State<AppState>) -> ApiResult<Vec<AccountView>> {
    state.ledger.list_accounts().await.map(Json).map_err(ledger_error)
}

/// GET /accounts/{id}
pub async fn get_account_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<AccountView> {
    state.ledger.account(&id).await.map(Json).map_err(ledger_error)
}

/// POST /accounts
pub async fn create_account_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    let req = body(payload)?;
    let new = new_account(req).map_err(ledger_error)?;

    let account = state.ledger.create_account(new).await.map_err(ledger_error)?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// PUT /accounts
pub async fn update_account_handler(
    State(state): State<AppState>,
    payload: Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> ApiResult<Account> {
    let req = body(payload)?;
    let update = AccountUpdate {
        balance: require_amount("balance", req.balance.as_ref()).map_err(ledger_error)?,
        bonus_bets: parse_amount("bonusBets", req.bonus_bets.as_ref()).map_err(ledger_error)?,
        id: req.id,
        website: req.website,
        owner: req.owner,
        color: req.color,
        notes: req.notes,
    };

    state.ledger.update_account(update).await.map(Json).map_err(ledger_error)
}

fn new_account(req: CreateAccountRequest) -> Result<NewAccount, LedgerError> {
    let account_type: AccountType = req.account_type.parse().map_err(LedgerError::Validation)?;
    let bonus_expiry = match req.bonus_expiry.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| LedgerError::Validation("bonusExpiry must be an RFC 3339 timestamp".to_string()))?,
        ),
    };

    Ok(NewAccount {
        name: req.name,
        account_type,
        website: req.website,
        balance: require_amount("balance", req.balance.as_ref())?,
        owner: req.owner,
        color: req.color,
        notes: req.notes,
        bonus_bets: parse_amount("bonusBets", req.bonus_bets.as_ref())?,
        bonus_expiry,
    })
}
