//! Persistent Store - ReDB + DashMap
//!
//! Durable single-node backend. Accounts, bonus records and journal entries
//! are JSON values in three ReDB tables. A commit is one ReDB write
//! transaction, so a transfer's two legs land together or not at all.
//!
//! Reads of single accounts are served from a DashMap cache that is only
//! updated AFTER a successful commit, and never moved to an older version.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{check_amounts, select_bonuses, select_entries, AccountStore, Amounts, Batch, StoreError, StoreResult};
use crate::types::{Account, BonusRecord, LedgerEntry};

// ============================================================================
// REDB TABLE DEFINITIONS
// ============================================================================

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Accounts: id → JSON
const ACCOUNTS: JsonTable = TableDefinition::new("accounts");

/// Bonus records: id → JSON
const BONUSES: JsonTable = TableDefinition::new("bonuses");

/// Journal: id → JSON
const ENTRIES: JsonTable = TableDefinition::new("ledger_entries");

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Backend(format!("corrupt record: {}", e)))
}

// serde_json writes NaN and infinity as `null`, which would not decode again
fn encode<T: serde::Serialize + Amounts>(value: &T) -> StoreResult<Vec<u8>> {
    check_amounts(value)?;
    serde_json::to_vec(value).map_err(StoreError::backend)
}

// ============================================================================
// PERSISTENT STORE
// ============================================================================

/// `Clone` is cheap (Arc handles).
#[derive(Clone)]
pub struct PersistentStore {
    db: Arc<Database>,
    cache: Arc<DashMap<String, Account>>,
}

impl PersistentStore {
    /// Create or open `<dir>/bankroll.redb` and warm the account cache.
    pub fn open(dir: &str) -> StoreResult<Self> {
        info!(path = %dir, "Opening ReDB database");
        std::fs::create_dir_all(dir).map_err(StoreError::backend)?;

        let db = Database::create(format!("{}/bankroll.redb", dir)).map_err(StoreError::backend)?;

        let write_txn = db.begin_write().map_err(StoreError::backend)?;
        {
            write_txn.open_table(ACCOUNTS).map_err(StoreError::backend)?;
            write_txn.open_table(BONUSES).map_err(StoreError::backend)?;
            write_txn.open_table(ENTRIES).map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;

        let cache = Arc::new(DashMap::new());
        {
            let read_txn = db.begin_read().map_err(StoreError::backend)?;
            let table = read_txn.open_table(ACCOUNTS).map_err(StoreError::backend)?;
            for row in table.iter().map_err(StoreError::backend)? {
                let (_, value) = row.map_err(StoreError::backend)?;
                let account: Account = decode(value.value())?;
                cache.insert(account.id.clone(), account);
            }
        }

        info!(accounts = cache.len(), "Database loaded");
        Ok(Self { db: Arc::new(db), cache })
    }

    fn scan<T: DeserializeOwned>(&self, table: JsonTable) -> StoreResult<Vec<T>> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn.open_table(table).map_err(StoreError::backend)?;
        let mut out = Vec::new();
        for row in table.iter().map_err(StoreError::backend)? {
            let (_, value) = row.map_err(StoreError::backend)?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    /// Cache `account` unless a newer version is already there. Commits
    /// finish in any order once their write transactions are done.
    fn remember(&self, account: Account) {
        match self.cache.entry(account.id.clone()) {
            Entry::Occupied(mut slot) => {
                if slot.get().version < account.version {
                    slot.insert(account);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(account);
            }
        }
    }

    fn commit_blocking(&self, batch: Batch) -> StoreResult<Vec<Account>> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;

        let committed = {
            let mut accounts = write_txn.open_table(ACCOUNTS).map_err(StoreError::backend)?;

            let mut committed = Vec::with_capacity(batch.writes.len());
            for write in batch.writes {
                // Read the current version inside the write transaction
                let stored = accounts
                    .get(write.account.id.as_str())
                    .map_err(StoreError::backend)?
                    .map(|v| v.value().to_vec());
                let stored: Account = match stored {
                    Some(bytes) => decode(&bytes)?,
                    // Dropping the transaction aborts it
                    None => return Err(StoreError::NotFound(write.account.id)),
                };
                if stored.version != write.expected_version {
                    let conflict = StoreError::Conflict(format!(
                        "account {} is at version {}, expected {}",
                        stored.id, stored.version, write.expected_version
                    ));
                    // The retry re-reads from the cache, so hand it what disk holds
                    self.remember(stored);
                    return Err(conflict);
                }

                let mut account = write.account;
                account.version = write.expected_version + 1;
                accounts
                    .insert(account.id.as_str(), encode(&account)?.as_slice())
                    .map_err(StoreError::backend)?;
                committed.push(account);
            }

            let mut bonuses = write_txn.open_table(BONUSES).map_err(StoreError::backend)?;
            for record in &batch.bonuses {
                bonuses
                    .insert(record.id.as_str(), encode(record)?.as_slice())
                    .map_err(StoreError::backend)?;
            }

            let mut entries = write_txn.open_table(ENTRIES).map_err(StoreError::backend)?;
            for entry in &batch.entries {
                entries
                    .insert(entry.id.as_str(), encode(entry)?.as_slice())
                    .map_err(StoreError::backend)?;
            }

            committed
        };

        write_txn.commit().map_err(StoreError::backend)?;

        for account in &committed {
            self.remember(account.clone());
        }
        debug!(accounts = committed.len(), "Batch committed");
        Ok(committed)
    }

    fn insert_blocking(&self, account: Account) -> StoreResult<Account> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        {
            let mut table = write_txn.open_table(ACCOUNTS).map_err(StoreError::backend)?;

            if table.get(account.id.as_str()).map_err(StoreError::backend)?.is_some() {
                return Err(StoreError::Conflict(format!("account id {} already exists", account.id)));
            }
            for row in table.iter().map_err(StoreError::backend)? {
                let (_, value) = row.map_err(StoreError::backend)?;
                let existing: Account = decode(value.value())?;
                if existing.name == account.name {
                    return Err(StoreError::Conflict(format!("account name '{}' already exists", account.name)));
                }
            }

            table
                .insert(account.id.as_str(), encode(&account)?.as_slice())
                .map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;

        self.remember(account.clone());
        Ok(account)
    }
}

#[async_trait]
impl AccountStore for PersistentStore {
    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        self.scan(ACCOUNTS)
    }

    async fn get_account(&self, id: &str) -> StoreResult<Option<Account>> {
        // Every committed account is in the cache
        Ok(self.cache.get(id).map(|a| a.value().clone()))
    }

    async fn insert_account(&self, account: Account) -> StoreResult<Account> {
        self.insert_blocking(account)
    }

    async fn list_bonuses(&self, account_id: Option<&str>) -> StoreResult<Vec<BonusRecord>> {
        Ok(select_bonuses(self.scan(BONUSES)?, account_id))
    }

    async fn list_entries(&self, account_id: Option<&str>, limit: usize) -> StoreResult<Vec<LedgerEntry>> {
        Ok(select_entries(self.scan(ENTRIES)?, account_id, limit))
    }

    async fn commit(&self, batch: Batch) -> StoreResult<Vec<Account>> {
        self.commit_blocking(batch)
    }

    fn backend(&self) -> &'static str {
        "redb"
    }
}

// ============================================================================
// TESTS
// ============================================================================
