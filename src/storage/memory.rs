//! In-memory `AccountStore` for tests and local runs.
//!
//! One `RwLock` guards all maps, so a batch is checked and applied under a
//! single write guard.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{check_amounts, select_bonuses, select_entries, AccountStore, Batch, StoreError, StoreResult};
use crate::types::{Account, BonusRecord, LedgerEntry};

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    bonuses: Vec<BonusRecord>,
    entries: Vec<LedgerEntry>,
}

/// `Clone` is cheap (Arc handle); clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        Ok(self.state.read().accounts.values().cloned().collect())
    }

    async fn get_account(&self, id: &str) -> StoreResult<Option<Account>> {
        Ok(self.state.read().accounts.get(id).cloned())
    }

    async fn insert_account(&self, account: Account) -> StoreResult<Account> {
        check_amounts(&account)?;
        let mut state = self.state.write();
        if state.accounts.contains_key(&account.id) {
            return Err(StoreError::Conflict(format!("account id {} already exists", account.id)));
        }
        if state.accounts.values().any(|a| a.name == account.name) {
            return Err(StoreError::Conflict(format!("account name '{}' already exists", account.name)));
        }
        state.accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    async fn list_bonuses(&self, account_id: Option<&str>) -> StoreResult<Vec<BonusRecord>> {
        let bonuses = self.state.read().bonuses.clone();
        Ok(select_bonuses(bonuses, account_id))
    }

    async fn list_entries(&self, account_id: Option<&str>, limit: usize) -> StoreResult<Vec<LedgerEntry>> {
        let entries = self.state.read().entries.clone();
        Ok(select_entries(entries, account_id, limit))
    }

    async fn commit(&self, batch: Batch) -> StoreResult<Vec<Account>> {
        batch.check_amounts()?;
        let mut state = self.state.write();

        // Check every write before touching anything
        for write in &batch.writes {
            let stored = state
                .accounts
                .get(&write.account.id)
                .ok_or_else(|| StoreError::NotFound(write.account.id.clone()))?;
            if stored.version != write.expected_version {
                return Err(StoreError::Conflict(format!(
                    "account {} is at version {}, expected {}",
                    stored.id, stored.version, write.expected_version
                )));
            }
        }

        let mut committed = Vec::with_capacity(batch.writes.len());
        for write in batch.writes {
            let mut account = write.account;
            account.version = write.expected_version + 1;
            state.accounts.insert(account.id.clone(), account.clone());
            committed.push(account);
        }
        state.bonuses.extend(batch.bonuses);
        state.entries.extend(batch.entries);

        Ok(committed)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountType, EntryKind};
    use chrono::Utc;

    fn account(id: &str, name: &str, balance: f64) -> Account {
        let now = Utc::now();
        Account {
            id: id.into(),
            name: name.into(),
            account_type: AccountType::Bookmaker,
            website: None,
            balance,
            bonus_bets: 0.0,
            bonus_expiry: None,
            owner: None,
            color: None,
            notes: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let store = MemoryStore::new();
        store.insert_account(account("a", "Alpha", 0.0)).await.unwrap();

        let same_id = store.insert_account(account("a", "Other", 0.0)).await;
        assert!(matches!(same_id, Err(StoreError::Conflict(_))));

        let same_name = store.insert_account(account("b", "Alpha", 0.0)).await;
        assert!(matches!(same_name, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_commit_bumps_version() {
        let store = MemoryStore::new();
        let mut a = store.insert_account(account("a", "Alpha", 10.0)).await.unwrap();
        a.balance = 25.0;

        let out = store.commit(Batch::new().write(a)).await.unwrap();
        assert_eq!(out[0].version, 1);
        assert_eq!(store.get_account("a").await.unwrap().unwrap().balance, 25.0);
    }

    #[tokio::test]
    async fn test_stale_write_applies_nothing() {
        let store = MemoryStore::new();
        let a = store.insert_account(account("a", "Alpha", 100.0)).await.unwrap();
        let b = store.insert_account(account("b", "Beta", 0.0)).await.unwrap();

        // Someone else moves `b` forward
        let mut b_fresh = b.clone();
        b_fresh.balance = 5.0;
        store.commit(Batch::new().write(b_fresh)).await.unwrap();

        let mut a_next = a.clone();
        a_next.balance = 60.0;
        let mut b_stale = b;
        b_stale.balance = 40.0;
        let entry = LedgerEntry::new(EntryKind::TransferOut, &a_next, 40.0, 0.0, Utc::now());

        let result = store.commit(Batch::new().write(a_next).write(b_stale).entry(entry)).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        assert_eq!(store.get_account("a").await.unwrap().unwrap().balance, 100.0);
        assert_eq!(store.get_account("b").await.unwrap().unwrap().balance, 5.0);
        assert!(store.list_entries(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_missing_account() {
        let store = MemoryStore::new();
        let result = store.commit(Batch::new().write(account("ghost", "Ghost", 1.0))).await;
        assert_eq!(result, Err(StoreError::NotFound("ghost".into())));
    }

    #[tokio::test]
    async fn test_commit_rejects_infinite_balance() {
        let store = MemoryStore::new();
        let mut a = store.insert_account(account("a", "Alpha", 1.0)).await.unwrap();
        a.balance = f64::INFINITY;

        let result = store.commit(Batch::new().write(a)).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(store.get_account("a").await.unwrap().unwrap().balance, 1.0);
    }
}
