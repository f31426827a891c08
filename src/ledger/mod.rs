// ============================================================================
// LEDGER OPERATIONS CORE
// ============================================================================
//
// Every money-moving action on an account goes through here:
//
//   deposit        cash and/or bonus bets in (any sign, finite)
//   withdraw       cash out, never below zero
//   transfer       account → account, both legs in one atomic batch
//   grant_bonus    bonus bets in, validity window restarted
//   consume_bonus  bonus bets spent on a bet
//   update_account explicit balance / bonus correction
//
// FLOW (one attempt):
//   read account(s) → validate → mutate copies → commit(Batch) with the
//   versions that were read
//
// A commit that lost a race returns Conflict; the whole attempt is re-run
// against fresh reads, up to `LedgerPolicy::max_attempts`.
// ============================================================================

pub mod bonus;
pub mod clock;
pub mod validation;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{info, warn};

pub use clock::{Clock, ManualClock, SystemClock};

use crate::storage::{AccountStore, Batch, StoreError};
use crate::types::{Account, AccountType, AccountView, BonusRecord, EntryKind, LedgerEntry};
use validation::{ensure_finite, ensure_non_negative, ensure_positive, ensure_representable, optional_text, require_id};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),

    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds: have {available:.2}, need {requested:.2}")]
    InsufficientFunds { available: f64, requested: f64 },

    #[error("Insufficient bonus bets: have {available:.2}, need {requested:.2}")]
    InsufficientBonus { available: f64, requested: f64 },

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => LedgerError::NotFound(what),
            StoreError::Validation(msg) => LedgerError::Validation(msg),
            StoreError::Conflict(msg) => LedgerError::Conflict(msg),
            other => LedgerError::Store(other),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// ============================================================================
// INPUTS
// ============================================================================

/// Fields for a new account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub account_type: AccountType,
    pub website: Option<String>,
    pub balance: f64,
    pub owner: Option<String>,
    pub color: Option<String>,
    pub notes: Option<String>,
    pub bonus_bets: Option<f64>,
    pub bonus_expiry: Option<DateTime<Utc>>,
}

/// Explicit correction of an account. `None` leaves a field as it is; a
/// blank string clears an optional text field.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub id: String,
    pub balance: f64,
    pub bonus_bets: Option<f64>,
    pub website: Option<String>,
    pub owner: Option<String>,
    pub color: Option<String>,
    pub notes: Option<String>,
}

// ============================================================================
// POLICY
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct LedgerPolicy {
    /// How long granted bonus bets stay usable.
    pub bonus_retention: Duration,
    /// Total attempts per operation when commits conflict.
    pub max_attempts: u32,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            bonus_retention: Duration::days(30),
            max_attempts: 5,
        }
    }
}

pub const MAX_ENTRY_LIMIT: usize = 500;

// ============================================================================
// LEDGER
// ============================================================================

/// `Clone` is cheap (Arc handles).
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    policy: LedgerPolicy,
}

impl Ledger {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            policy: LedgerPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: LedgerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// All accounts sorted by name, each with its bonus records.
    pub async fn list_accounts(&self) -> LedgerResult<Vec<AccountView>> {
        let accounts = self.store.list_accounts().await?;
        let mut by_account: HashMap<String, Vec<BonusRecord>> = HashMap::new();
        for record in self.store.list_bonuses(None).await? {
            by_account.entry(record.account_id.clone()).or_default().push(record);
        }

        let now = self.now();
        let mut views: Vec<AccountView> = accounts
            .into_iter()
            .map(|account| {
                let bonuses = by_account.remove(&account.id).unwrap_or_default();
                view(account, bonuses, now)
            })
            .collect();
        views.sort_by(|a, b| {
            a.account
                .name
                .to_lowercase()
                .cmp(&b.account.name.to_lowercase())
                .then_with(|| a.account.name.cmp(&b.account.name))
        });
        Ok(views)
    }

    pub async fn account(&self, id: &str) -> LedgerResult<AccountView> {
        let id = require_id("id", id)?;
        let account = self.load(id).await?;
        let bonuses = self.store.list_bonuses(Some(id)).await?;
        Ok(view(account, bonuses, self.now()))
    }

    /// Journal entries, newest first.
    pub async fn entries(&self, account_id: Option<&str>, limit: usize) -> LedgerResult<Vec<LedgerEntry>> {
        let account_id = match account_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => Some(self.load(id).await?.id),
            None => None,
        };
        let limit = limit.clamp(1, MAX_ENTRY_LIMIT);
        Ok(self.store.list_entries(account_id.as_deref(), limit).await?)
    }

    // ========================================================================
    // ACCOUNT LIFECYCLE
    // ========================================================================

    pub async fn create_account(&self, new: NewAccount) -> LedgerResult<Account> {
        let name = require_id("name", &new.name)?.to_string();
        let balance = ensure_finite("balance", new.balance)?;
        let bonus_bets = ensure_non_negative("bonusBets", new.bonus_bets.unwrap_or(0.0))?;

        let now = self.now();
        let mut account = Account {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            account_type: new.account_type,
            website: optional_text(new.website),
            balance,
            bonus_bets: 0.0,
            bonus_expiry: None,
            owner: optional_text(new.owner),
            color: optional_text(new.color),
            notes: optional_text(new.notes),
            created_at: now,
            updated_at: now,
            version: 0,
        };
        let expiry = match new.bonus_expiry {
            Some(expiry) => Some(expiry),
            None if bonus_bets > 0.0 => Some(bonus::expiry_after(now, self.policy.bonus_retention)?),
            None => None,
        };
        bonus::set_balance(&mut account, bonus_bets, expiry);

        let account = self.store.insert_account(account).await?;
        info!(
            account = %account.id,
            name = %account.name,
            kind = %account.account_type,
            balance = account.balance,
            "Account created"
        );
        Ok(account)
    }

    /// Set balance and bonus bets explicitly. The bonus expiry is recomputed
    /// from now whenever the resulting bonus balance is positive.
    pub async fn update_account(&self, update: AccountUpdate) -> LedgerResult<Account> {
        require_id("id", &update.id)?;
        ensure_finite("balance", update.balance)?;
        if let Some(bonus_bets) = update.bonus_bets {
            ensure_non_negative("bonusBets", bonus_bets)?;
        }
        let update = &update;
        self.retrying("update_account", move || self.try_update_account(update)).await
    }

    async fn try_update_account(&self, update: &AccountUpdate) -> LedgerResult<Account> {
        let mut account = self.load(update.id.trim()).await?;
        let now = self.now();

        let balance_delta = update.balance - account.balance;
        let bonus_bets = update.bonus_bets.unwrap_or(account.bonus_bets);
        let bonus_delta = bonus_bets - account.bonus_bets;

        let expiry = if bonus_bets > 0.0 {
            Some(bonus::expiry_after(now, self.policy.bonus_retention)?)
        } else {
            None
        };
        account.balance = update.balance;
        bonus::set_balance(&mut account, bonus_bets, expiry);
        if let Some(website) = &update.website {
            account.website = optional_text(Some(website.clone()));
        }
        if let Some(owner) = &update.owner {
            account.owner = optional_text(Some(owner.clone()));
        }
        if let Some(color) = &update.color {
            account.color = optional_text(Some(color.clone()));
        }
        if let Some(notes) = &update.notes {
            account.notes = optional_text(Some(notes.clone()));
        }
        account.updated_at = now;

        let entry = LedgerEntry::new(EntryKind::Adjustment, &account, balance_delta, bonus_delta, now);
        let account = self.commit_one(Batch::new().write(account).entry(entry)).await?;

        info!(
            account = %account.id,
            balance = account.balance,
            bonus_bets = account.bonus_bets,
            "Account updated"
        );
        Ok(account)
    }

    // ========================================================================
    // DEPOSIT / WITHDRAW
    // ========================================================================

    /// Add `amount` to the cash balance and `bonus_bets` to the bonus
    /// balance. Absent values count as zero. A positive bonus delta is a
    /// grant, a negative one a consume.
    pub async fn deposit(&self, account_id: &str, amount: Option<f64>, bonus_bets: Option<f64>) -> LedgerResult<Account> {
        let account_id = require_id("accountId", account_id)?;
        let amount = amount.map(|v| ensure_finite("amount", v)).transpose()?.unwrap_or(0.0);
        let bonus_bets = bonus_bets.map(|v| ensure_finite("bonusBets", v)).transpose()?.unwrap_or(0.0);

        self.retrying("deposit", move || self.try_deposit(account_id, amount, bonus_bets)).await
    }

    async fn try_deposit(&self, account_id: &str, amount: f64, bonus_bets: f64) -> LedgerResult<Account> {
        let mut account = self.load(account_id).await?;
        if amount == 0.0 && bonus_bets == 0.0 {
            return Ok(account);
        }

        let now = self.now();
        let mut batch = Batch::new();

        account.balance = ensure_representable("balance", account.balance + amount)?;
        if bonus_bets > 0.0 {
            let (record, forfeited) = bonus::grant(
                &mut account,
                bonus_bets,
                bonus::DEFAULT_BONUS_KIND,
                self.policy.bonus_retention,
                now,
            )?;
            if forfeited > 0.0 {
                info!(account = %account.id, forfeited, "Expired bonus bets forfeited");
            }
            batch = batch.bonus(record);
        } else if bonus_bets < 0.0 {
            bonus::consume(&mut account, -bonus_bets, now)?;
        }
        account.updated_at = now;

        let entry = LedgerEntry::new(EntryKind::Deposit, &account, amount, bonus_bets, now);
        let account = self.commit_one(batch.write(account).entry(entry)).await?;

        info!(
            account = %account.id,
            amount,
            bonus_bets,
            new_balance = account.balance,
            "Deposit applied"
        );
        Ok(account)
    }

    /// Take `amount` out of the cash balance. Refused outright when the
    /// balance does not cover it.
    pub async fn withdraw(&self, account_id: &str, amount: f64) -> LedgerResult<Account> {
        let account_id = require_id("accountId", account_id)?;
        let amount = ensure_finite("amount", amount)?;

        self.retrying("withdraw", move || self.try_withdraw(account_id, amount)).await
    }

    async fn try_withdraw(&self, account_id: &str, amount: f64) -> LedgerResult<Account> {
        let mut account = self.load(account_id).await?;
        if amount > account.balance {
            return Err(LedgerError::InsufficientFunds {
                available: account.balance,
                requested: amount,
            });
        }

        let now = self.now();
        account.balance = ensure_representable("balance", account.balance - amount)?;
        account.updated_at = now;

        let entry = LedgerEntry::new(EntryKind::Withdrawal, &account, -amount, 0.0, now);
        let account = self.commit_one(Batch::new().write(account).entry(entry)).await?;

        info!(account = %account.id, amount, new_balance = account.balance, "Withdrawal applied");
        Ok(account)
    }

    // ========================================================================
    // TRANSFER
    // ========================================================================

    /// Move `amount` (> 0) between two distinct accounts and return the
    /// refreshed account listing.
    pub async fn transfer(&self, from_id: &str, to_id: &str, amount: f64) -> LedgerResult<Vec<AccountView>> {
        let from_id = require_id("fromId", from_id)?;
        let to_id = require_id("toId", to_id)?;
        if from_id == to_id {
            return Err(LedgerError::Validation("Cannot transfer to the same account".to_string()));
        }
        let amount = ensure_positive("amount", amount)?;

        self.retrying("transfer", move || self.try_transfer(from_id, to_id, amount)).await?;
        self.list_accounts().await
    }

    async fn try_transfer(&self, from_id: &str, to_id: &str, amount: f64) -> LedgerResult<()> {
        let mut from = self.load(from_id).await?;
        if from.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                available: from.balance,
                requested: amount,
            });
        }
        let mut to = self.load(to_id).await?;

        let now = self.now();
        from.balance -= amount;
        from.updated_at = now;
        to.balance = ensure_representable("balance", to.balance + amount)?;
        to.updated_at = now;

        let out = LedgerEntry::new(EntryKind::TransferOut, &from, -amount, 0.0, now).with_counterparty(&to.id);
        let inbound = LedgerEntry::new(EntryKind::TransferIn, &to, amount, 0.0, now).with_counterparty(&from.id);

        let committed = self
            .store
            .commit(Batch::new().write(from).write(to).entry(out).entry(inbound))
            .await?;

        info!(
            from = %from_id,
            to = %to_id,
            amount,
            from_balance = committed.first().map(|a| a.balance),
            to_balance = committed.get(1).map(|a| a.balance),
            "Transfer successful"
        );
        Ok(())
    }

    // ========================================================================
    // BONUS BETS
    // ========================================================================

    pub async fn grant_bonus(&self, account_id: &str, amount: f64, kind: Option<&str>) -> LedgerResult<Account> {
        let account_id = require_id("accountId", account_id)?;
        let amount = ensure_positive("amount", amount)?;
        let kind = kind
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .unwrap_or(bonus::DEFAULT_BONUS_KIND);

        self.retrying("grant_bonus", move || self.try_grant_bonus(account_id, amount, kind)).await
    }

    async fn try_grant_bonus(&self, account_id: &str, amount: f64, kind: &str) -> LedgerResult<Account> {
        let mut account = self.load(account_id).await?;
        let now = self.now();

        let (record, forfeited) = bonus::grant(&mut account, amount, kind, self.policy.bonus_retention, now)?;
        account.updated_at = now;

        let entry = LedgerEntry::new(EntryKind::BonusGrant, &account, 0.0, amount, now);
        let account = self.commit_one(Batch::new().write(account).bonus(record).entry(entry)).await?;

        info!(
            account = %account.id,
            amount,
            forfeited,
            bonus_bets = account.bonus_bets,
            expires = ?account.bonus_expiry,
            "Bonus bets granted"
        );
        Ok(account)
    }

    pub async fn consume_bonus(&self, account_id: &str, amount: f64) -> LedgerResult<Account> {
        let account_id = require_id("accountId", account_id)?;
        let amount = ensure_positive("amount", amount)?;

        self.retrying("consume_bonus", move || self.try_consume_bonus(account_id, amount)).await
    }

    async fn try_consume_bonus(&self, account_id: &str, amount: f64) -> LedgerResult<Account> {
        let mut account = self.load(account_id).await?;
        let now = self.now();

        bonus::consume(&mut account, amount, now)?;
        account.updated_at = now;

        let entry = LedgerEntry::new(EntryKind::BonusConsume, &account, 0.0, -amount, now);
        let account = self.commit_one(Batch::new().write(account).entry(entry)).await?;

        info!(account = %account.id, amount, bonus_bets = account.bonus_bets, "Bonus bets consumed");
        Ok(account)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    async fn load(&self, id: &str) -> LedgerResult<Account> {
        self.store
            .get_account(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    async fn commit_one(&self, batch: Batch) -> LedgerResult<Account> {
        self.store
            .commit(batch)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::Store(StoreError::Backend("commit returned no account".to_string())))
    }

    /// Run `attempt` until it stops losing write races.
    async fn retrying<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt().await {
                Err(LedgerError::Conflict(reason)) if tries < max_attempts => {
                    warn!(operation, attempt = tries, %reason, "Write conflict, retrying");
                    tokio::task::yield_now().await;
                }
                Err(LedgerError::Conflict(reason)) => {
                    warn!(operation, attempts = tries, %reason, "Write conflict, giving up");
                    return Err(LedgerError::Conflict(format!(
                        "{} could not be applied after {} attempts: {}",
                        operation, tries, reason
                    )));
                }
                other => return other,
            }
        }
    }
}

fn view(account: Account, bonuses: Vec<BonusRecord>, now: DateTime<Utc>) -> AccountView {
    AccountView {
        bonus_status: bonus::status(&account, now),
        active_bonus_bets: bonus::active_amount(&account, now),
        bonuses,
        account,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::BonusStatus;

    fn ledger() -> (Ledger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ledger = Ledger::new(Arc::new(MemoryStore::new())).with_clock(clock.clone());
        (ledger, clock)
    }

    fn new_account(name: &str, balance: f64) -> NewAccount {
        NewAccount {
            name: name.to_string(),
            account_type: AccountType::Bookmaker,
            website: None,
            balance,
            owner: None,
            color: None,
            notes: None,
            bonus_bets: None,
            bonus_expiry: None,
        }
    }

    #[tokio::test]
    async fn test_withdraw_scenario() {
        let (ledger, _) = ledger();
        let acc = ledger.create_account(new_account("Bet365", 1000.0)).await.unwrap();

        let after = ledger.withdraw(&acc.id, 500.0).await.unwrap();
        assert_eq!(after.balance, 500.0);

        let err = ledger.withdraw(&acc.id, 600.0).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { available, requested } if available == 500.0 && requested == 600.0));
        assert_eq!(ledger.account(&acc.id).await.unwrap().account.balance, 500.0);
    }

    #[tokio::test]
    async fn test_withdraw_exact_balance() {
        let (ledger, _) = ledger();
        let acc = ledger.create_account(new_account("Betfair", 42.5)).await.unwrap();
        let after = ledger.withdraw(&acc.id, 42.5).await.unwrap();
        assert_eq!(after.balance, 0.0);
    }

    #[tokio::test]
    async fn test_transfer_scenario_conserves_total() {
        let (ledger, _) = ledger();
        let a = ledger.create_account(new_account("Alpha", 1000.0)).await.unwrap();
        let b = ledger.create_account(new_account("Beta", 200.0)).await.unwrap();

        let listing = ledger.transfer(&a.id, &b.id, 300.0).await.unwrap();
        let balance = |id: &str| listing.iter().find(|v| v.account.id == id).unwrap().account.balance;
        assert_eq!(balance(&a.id), 700.0);
        assert_eq!(balance(&b.id), 500.0);
        assert_eq!(balance(&a.id) + balance(&b.id), 1200.0);
    }

    #[tokio::test]
    async fn test_transfer_rejections_leave_both_unchanged() {
        let (ledger, _) = ledger();
        let a = ledger.create_account(new_account("Alpha", 100.0)).await.unwrap();
        let b = ledger.create_account(new_account("Beta", 50.0)).await.unwrap();

        for amount in [0.0, -10.0] {
            let err = ledger.transfer(&a.id, &b.id, amount).await.unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)));
        }
        let err = ledger.transfer(&a.id, &b.id, 100.01).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        let err = ledger.transfer(&a.id, &a.id, 1.0).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let err = ledger.transfer(&a.id, "missing", 1.0).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));

        assert_eq!(ledger.account(&a.id).await.unwrap().account.balance, 100.0);
        assert_eq!(ledger.account(&b.id).await.unwrap().account.balance, 50.0);
        assert!(ledger.entries(None, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deposit_cash_and_bonus() {
        let (ledger, clock) = ledger();
        let acc = ledger.create_account(new_account("Paddy", 10.0)).await.unwrap();
        assert_eq!(acc.bonus_expiry, None);

        let after = ledger.deposit(&acc.id, Some(15.5), Some(50.0)).await.unwrap();
        assert_eq!(after.balance, 25.5);
        assert_eq!(after.bonus_bets, 50.0);
        assert_eq!(after.bonus_expiry, Some(clock.now() + Duration::days(30)));

        let view = ledger.account(&acc.id).await.unwrap();
        assert_eq!(view.bonus_status, BonusStatus::Active);
        assert_eq!(view.bonuses.len(), 1);
        assert_eq!(view.bonuses[0].amount, 50.0);
    }

    #[tokio::test]
    async fn test_deposit_negative_amount_allowed() {
        let (ledger, _) = ledger();
        let acc = ledger.create_account(new_account("Bank", 10.0)).await.unwrap();
        let after = ledger.deposit(&acc.id, Some(-25.0), None).await.unwrap();
        assert_eq!(after.balance, -15.0);
    }

    #[tokio::test]
    async fn test_overflowing_results_are_rejected() {
        let (ledger, _) = ledger();
        let a = ledger.create_account(new_account("Alpha", 1e308)).await.unwrap();
        let b = ledger.create_account(new_account("Beta", 1e308)).await.unwrap();

        let err = ledger.deposit(&a.id, Some(1e308), None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(ref msg) if msg == "balance would overflow"));
        let err = ledger.withdraw(&a.id, -1e308).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let err = ledger.transfer(&a.id, &b.id, 1e308).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        ledger.grant_bonus(&a.id, f64::MAX, None).await.unwrap();
        let err = ledger.grant_bonus(&a.id, f64::MAX, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        assert_eq!(ledger.account(&a.id).await.unwrap().account.balance, 1e308);
        assert_eq!(ledger.account(&b.id).await.unwrap().account.balance, 1e308);
        assert_eq!(ledger.entries(None, 50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_retention_is_an_error() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ledger = Ledger::new(Arc::new(MemoryStore::new()))
            .with_clock(clock)
            .with_policy(LedgerPolicy { bonus_retention: Duration::days(200_000_000), max_attempts: 5 });

        // No bonus, no expiry to compute
        let acc = ledger.create_account(new_account("Plain", 10.0)).await.unwrap();

        let mut with_bonus = new_account("Bonus", 0.0);
        with_bonus.bonus_bets = Some(5.0);
        let err = ledger.create_account(with_bonus).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let err = ledger.grant_bonus(&acc.id, 5.0, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let err = ledger.deposit(&acc.id, None, Some(5.0)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let err = ledger
            .update_account(AccountUpdate { id: acc.id.clone(), balance: 10.0, bonus_bets: Some(5.0), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let view = ledger.account(&acc.id).await.unwrap();
        assert_eq!(view.account.bonus_bets, 0.0);
        assert!(view.bonuses.is_empty());
    }

    #[tokio::test]
    async fn test_dust_grant_keeps_invariant() {
        let (ledger, _) = ledger();
        let acc = ledger.create_account(new_account("Tiny", 0.0)).await.unwrap();

        let after = ledger.grant_bonus(&acc.id, 1e-10, None).await.unwrap();
        assert_eq!(after.bonus_bets, 0.0);
        assert_eq!(after.bonus_expiry, None);
    }

    #[tokio::test]
    async fn test_deposit_validation_and_not_found() {
        let (ledger, _) = ledger();
        let acc = ledger.create_account(new_account("Bank", 10.0)).await.unwrap();

        let err = ledger.deposit(&acc.id, Some(f64::NAN), None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let err = ledger.deposit("nope", Some(1.0), None).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
        let err = ledger.deposit("  ", Some(1.0), None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_negative_bonus_deposit_cannot_go_below_zero() {
        let (ledger, _) = ledger();
        let acc = ledger.create_account(new_account("Sky", 0.0)).await.unwrap();
        ledger.deposit(&acc.id, None, Some(20.0)).await.unwrap();

        let err = ledger.deposit(&acc.id, Some(5.0), Some(-25.0)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBonus { .. }));

        // Rejected as a whole: the cash part did not land either
        let view = ledger.account(&acc.id).await.unwrap();
        assert_eq!(view.account.balance, 0.0);
        assert_eq!(view.account.bonus_bets, 20.0);

        let after = ledger.deposit(&acc.id, None, Some(-20.0)).await.unwrap();
        assert_eq!(after.bonus_bets, 0.0);
        assert_eq!(after.bonus_expiry, None);
    }

    #[tokio::test]
    async fn test_bonus_expiry_and_regrant() {
        let (ledger, clock) = ledger();
        let acc = ledger.create_account(new_account("Coral", 0.0)).await.unwrap();
        ledger.grant_bonus(&acc.id, 30.0, Some("free_bet")).await.unwrap();

        clock.advance(Duration::days(31));
        let view = ledger.account(&acc.id).await.unwrap();
        assert_eq!(view.bonus_status, BonusStatus::Expired);
        assert_eq!(view.active_bonus_bets, 0.0);

        let err = ledger.consume_bonus(&acc.id, 5.0).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let regranted = ledger.grant_bonus(&acc.id, 10.0, None).await.unwrap();
        assert_eq!(regranted.bonus_bets, 10.0);
        assert_eq!(regranted.bonus_expiry, Some(clock.now() + Duration::days(30)));
    }

    #[tokio::test]
    async fn test_consume_bonus_to_zero() {
        let (ledger, _) = ledger();
        let acc = ledger.create_account(new_account("Unibet", 0.0)).await.unwrap();
        ledger.grant_bonus(&acc.id, 25.0, None).await.unwrap();

        let after = ledger.consume_bonus(&acc.id, 10.0).await.unwrap();
        assert_eq!(after.bonus_bets, 15.0);
        let after = ledger.consume_bonus(&acc.id, 15.0).await.unwrap();
        assert_eq!(after.bonus_bets, 0.0);
        assert_eq!(after.bonus_expiry, None);

        let err = ledger.consume_bonus(&acc.id, 1.0).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBonus { .. }));
    }

    #[tokio::test]
    async fn test_update_account_recomputes_expiry() {
        let (ledger, clock) = ledger();
        let acc = ledger.create_account(new_account("Ladbrokes", 5.0)).await.unwrap();

        let updated = ledger
            .update_account(AccountUpdate {
                id: acc.id.clone(),
                balance: 80.0,
                bonus_bets: Some(12.0),
                notes: Some("  weekly reload ".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.balance, 80.0);
        assert_eq!(updated.bonus_expiry, Some(clock.now() + Duration::days(30)));
        assert_eq!(updated.notes.as_deref(), Some("weekly reload"));

        let cleared = ledger
            .update_account(AccountUpdate {
                id: acc.id.clone(),
                balance: 80.0,
                bonus_bets: Some(0.0),
                notes: Some(String::new()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(cleared.bonus_bets, 0.0);
        assert_eq!(cleared.bonus_expiry, None);
        assert_eq!(cleared.notes, None);

        let err = ledger
            .update_account(AccountUpdate { id: acc.id.clone(), balance: 1.0, bonus_bets: Some(-1.0), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_account_round_trip() {
        let (ledger, clock) = ledger();
        let created = ledger
            .create_account(NewAccount {
                name: "Smarkets".into(),
                account_type: AccountType::Exchange,
                website: Some("https://smarkets.com".into()),
                balance: 250.0,
                owner: Some("sam".into()),
                color: Some("#ff6600".into()),
                notes: Some("low commission".into()),
                bonus_bets: Some(20.0),
                bonus_expiry: None,
            })
            .await
            .unwrap();

        let read = ledger.account(&created.id).await.unwrap().account;
        assert_eq!(read, created);
        assert_eq!(read.account_type, AccountType::Exchange);
        assert_eq!(read.website.as_deref(), Some("https://smarkets.com"));
        assert_eq!(read.bonus_expiry, Some(clock.now() + Duration::days(30)));

        let err = ledger.create_account(new_account("Smarkets", 0.0)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
        let err = ledger.create_account(new_account("   ", 0.0)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_listing_sorted_by_name() {
        let (ledger, _) = ledger();
        for name in ["william hill", "Bet365", "Aviva Bank"] {
            ledger.create_account(new_account(name, 0.0)).await.unwrap();
        }
        let names: Vec<String> = ledger
            .list_accounts()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.account.name)
            .collect();
        assert_eq!(names, vec!["Aviva Bank", "Bet365", "william hill"]);
    }

    #[tokio::test]
    async fn test_journal_records_transfer_both_sides() {
        let (ledger, _) = ledger();
        let a = ledger.create_account(new_account("Alpha", 100.0)).await.unwrap();
        let b = ledger.create_account(new_account("Beta", 0.0)).await.unwrap();
        ledger.transfer(&a.id, &b.id, 40.0).await.unwrap();
        ledger.withdraw(&b.id, 10.0).await.unwrap();

        let for_b = ledger.entries(Some(&b.id), 50).await.unwrap();
        assert_eq!(for_b.len(), 3);
        assert!(for_b.iter().any(|e| e.kind == EntryKind::TransferIn && e.balance_after == 40.0));
        assert!(for_b.iter().any(|e| e.kind == EntryKind::Withdrawal && e.amount == -10.0));

        let err = ledger.entries(Some("missing"), 50).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }
}
