// ============================================================================
// BANKROLL - STORAGE LAYER
// ============================================================================
//
// The ledger never talks to a database directly. It is handed an
// `AccountStore` and only ever does two things with it:
//
//   1. READ   accounts / bonus records / journal entries
//   2. COMMIT a `Batch` of version-checked account writes plus the records
//             that belong with them, all-or-nothing
//
// ARCHITECTURE:
// ┌──────────────────────────────────────────────────────────────┐
// │                         Ledger                               │
// │                            │                                 │
// │                  Arc<dyn AccountStore>                       │
// │          ┌─────────────────┼──────────────────┐              │
// │          ▼                 ▼                  ▼              │
// │     MemoryStore      PersistentStore     SupabaseStore       │
// │   (RwLock maps)    (ReDB + DashMap)    (PostgREST + RPC)     │
// └──────────────────────────────────────────────────────────────┘
//
// CONCURRENCY MODEL:
// - Every AccountWrite carries the version the ledger read.
// - A commit whose versions no longer match fails with Conflict and
//   writes nothing; the ledger re-reads and retries.
//
// ============================================================================

pub mod memory;
pub mod persistent;

pub use memory::MemoryStore;
pub use persistent::PersistentStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Account, BonusRecord, LedgerEntry};

// ============================================================================
// ERRORS
// ============================================================================

/// Structured failure kinds every backend maps its native errors onto.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Rejected by store: {0}")]
    Validation(String),

    #[error("Store failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(e: impl std::fmt::Display) -> Self {
        StoreError::Backend(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// BATCH
// ============================================================================

/// New state for one account, valid only if the stored version still equals
/// `expected_version`.
#[derive(Debug, Clone)]
pub struct AccountWrite {
    pub expected_version: u64,
    pub account: Account,
}

impl AccountWrite {
    /// Stage `account` (already mutated by the caller) against the version it
    /// was read at.
    pub fn of(account: Account) -> Self {
        Self { expected_version: account.version, account }
    }
}

/// Unit of atomic change handed to [`AccountStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub writes: Vec<AccountWrite>,
    pub bonuses: Vec<BonusRecord>,
    pub entries: Vec<LedgerEntry>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(mut self, account: Account) -> Self {
        self.writes.push(AccountWrite::of(account));
        self
    }

    pub fn bonus(mut self, record: BonusRecord) -> Self {
        self.bonuses.push(record);
        self
    }

    pub fn entry(mut self, entry: LedgerEntry) -> Self {
        self.entries.push(entry);
        self
    }
}

// ============================================================================
// STORE CAPABILITY
// ============================================================================

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// All accounts, in no particular order.
    async fn list_accounts(&self) -> StoreResult<Vec<Account>>;

    async fn get_account(&self, id: &str) -> StoreResult<Option<Account>>;

    /// Insert a brand-new account. Fails with `Conflict` when the id or the
    /// name is already taken.
    async fn insert_account(&self, account: Account) -> StoreResult<Account>;

    /// Bonus records, newest first, optionally for one account.
    async fn list_bonuses(&self, account_id: Option<&str>) -> StoreResult<Vec<BonusRecord>>;

    /// Journal entries, newest first, optionally for one account (as either
    /// side of a transfer).
    async fn list_entries(&self, account_id: Option<&str>, limit: usize) -> StoreResult<Vec<LedgerEntry>>;

    /// Apply a batch atomically. Returns the stored accounts, version bumped,
    /// in the order of `batch.writes`.
    async fn commit(&self, batch: Batch) -> StoreResult<Vec<Account>>;

    /// Short name for logs and health output.
    fn backend(&self) -> &'static str;
}

// ============================================================================
// AMOUNT CHECKS
// ============================================================================

/// Records carrying money fields. JSON has no encoding for NaN or infinity,
/// so a backend refuses such a record rather than persisting `null`.
pub(crate) trait Amounts {
    fn record_id(&self) -> &str;
    fn amounts(&self) -> Vec<f64>;
}

impl Amounts for Account {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn amounts(&self) -> Vec<f64> {
        vec![self.balance, self.bonus_bets]
    }
}

impl Amounts for BonusRecord {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn amounts(&self) -> Vec<f64> {
        vec![self.amount]
    }
}

impl Amounts for LedgerEntry {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn amounts(&self) -> Vec<f64> {
        vec![self.amount, self.bonus_amount, self.balance_after]
    }
}

pub(crate) fn check_amounts<T: Amounts>(record: &T) -> StoreResult<()> {
    if record.amounts().iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(StoreError::Validation(format!("record {} holds a non-finite amount", record.record_id())))
    }
}

impl Batch {
    /// Every account, bonus record and entry in the batch has finite amounts.
    pub(crate) fn check_amounts(&self) -> StoreResult<()> {
        for write in &self.writes {
            check_amounts(&write.account)?;
        }
        for record in &self.bonuses {
            check_amounts(record)?;
        }
        for entry in &self.entries {
            check_amounts(entry)?;
        }
        Ok(())
    }
}

/// Newest-first ordering and the optional account filter, shared by the
/// backends that hold records locally.
pub(crate) fn select_entries(mut entries: Vec<LedgerEntry>, account_id: Option<&str>, limit: usize) -> Vec<LedgerEntry> {
    if let Some(id) = account_id {
        entries.retain(|e| e.account_id == id || e.counterparty_id.as_deref() == Some(id));
    }
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    entries.truncate(limit);
    entries
}

pub(crate) fn select_bonuses(mut bonuses: Vec<BonusRecord>, account_id: Option<&str>) -> Vec<BonusRecord> {
    if let Some(id) = account_id {
        bonuses.retain(|b| b.account_id == id);
    }
    bonuses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    bonuses
}
