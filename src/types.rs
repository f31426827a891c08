//! # Domain Types for the Bankroll Ledger
//!
//! Accounts, bonus-bet records and journal entries as they are stored and
//! returned over the API. JSON uses camelCase to match the browser client.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ACCOUNT
// ============================================================================

/// Kind of venue an account lives at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Bookmaker,
    Exchange,
    Bank,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Bookmaker => "bookmaker",
            AccountType::Exchange => "exchange",
            AccountType::Bank => "bank",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bookmaker" => Ok(AccountType::Bookmaker),
            "exchange" => Ok(AccountType::Exchange),
            "bank" => Ok(AccountType::Bank),
            other => Err(format!(
                "Unknown account type '{}' (expected bookmaker, exchange or bank)",
                other
            )),
        }
    }
}

/// A bookmaker, exchange or bank account.
///
/// `version` is bumped by the store on every committed write and is what
/// the ledger compares against when it swaps in a new state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    #[serde(default)]
    pub website: Option<String>,
    pub balance: f64,
    #[serde(default)]
    pub bonus_bets: f64,
    #[serde(default)]
    pub bonus_expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

// ============================================================================
// BONUS BETS
// ============================================================================

/// Read-time state of an account's bonus-bet balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BonusStatus {
    None,
    Active,
    Expired,
}

/// One bonus grant. Append-only; the aggregate on [`Account`] is the balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusRecord {
    pub id: String,
    pub account_id: String,
    pub amount: f64,
    pub kind: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// JOURNAL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    TransferOut,
    TransferIn,
    BonusGrant,
    BonusConsume,
    Adjustment,
}

/// A single journal line written alongside every committed mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub kind: EntryKind,
    pub account_id: String,
    #[serde(default)]
    pub counterparty_id: Option<String>,
    pub amount: f64,
    pub bonus_amount: f64,
    pub balance_after: f64,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(kind: EntryKind, account: &Account, amount: f64, bonus_amount: f64, at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            account_id: account.id.clone(),
            counterparty_id: None,
            amount,
            bonus_amount,
            balance_after: account.balance,
            created_at: at,
        }
    }

    pub fn with_counterparty(mut self, counterparty: &str) -> Self {
        self.counterparty_id = Some(counterparty.to_string());
        self
    }
}

// ============================================================================
// VIEWS
// ============================================================================

/// Account as returned by read endpoints: the stored record plus its bonus
/// records and the bonus state computed at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    #[serde(flatten)]
    pub account: Account,
    pub bonus_status: BonusStatus,
    pub active_bonus_bets: f64,
    pub bonuses: Vec<BonusRecord>,
}
