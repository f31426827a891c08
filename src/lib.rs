//! Bankroll ledger service.
//!
//! Tracks cash and bonus-bet balances across bookmaker, exchange and bank
//! accounts, and exposes deposits, withdrawals, transfers and the bonus-bet
//! lifecycle over HTTP.
//!
//! ## Architecture
//!
//! - **Core**: [`ledger::Ledger`] validates and applies every operation as an
//!   optimistic, version-checked batch, retried on conflict
//! - **Storage**: [`storage::AccountStore`] with memory, ReDB (+ DashMap cache)
//!   and Supabase (PostgREST) backends
//! - **Server**: Axum routes in [`routes`]

pub mod config;
pub mod ledger;
pub mod routes;
pub mod storage;
pub mod supabase;
pub mod types;

// ============================================================================
// PUBLIC API
// ============================================================================

pub use config::{AppConfig, ConfigError, StoreBackend};
pub use ledger::{AccountUpdate, Ledger, LedgerError, LedgerPolicy, LedgerResult, NewAccount};
pub use routes::{router, AppState};
pub use storage::{AccountStore, Batch, MemoryStore, PersistentStore, StoreError};
pub use supabase::SupabaseStore;
pub use types::{Account, AccountType, AccountView, BonusRecord, BonusStatus, EntryKind, LedgerEntry};
