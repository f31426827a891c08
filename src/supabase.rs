// ============================================================================
// SUPABASE STORE - Hosted Postgres via PostgREST
// ============================================================================
//
// Tables (see migrations/0001_ledger.sql):
//   accounts        - one row per bookmaker / exchange / bank account
//   bonuses         - append-only bonus grants
//   ledger_entries  - append-only journal
//
// Reads go through the REST interface. Writes that must be atomic go through
// the `ledger_commit(batch jsonb)` SQL function, which runs every
// version-checked update and insert in one database transaction.
//
// Failures are classified by the SQLSTATE code PostgREST returns, never by
// the wording of the message.
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::storage::{check_amounts, AccountStore, Batch, StoreError, StoreResult};
use crate::types::{Account, AccountType, BonusRecord, EntryKind, LedgerEntry};

// ============================================================================
// ROW TYPES (snake_case columns)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountRow {
    id: String,
    name: String,
    #[serde(rename = "type")]
    account_type: AccountType,
    website: Option<String>,
    balance: f64,
    #[serde(default)]
    bonus_bets: f64,
    bonus_expiry: Option<DateTime<Utc>>,
    owner: Option<String>,
    color: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    version: u64,
}

impl From<Account> for AccountRow {
    fn from(a: Account) -> Self {
        Self {
            id: a.id,
            name: a.name,
            account_type: a.account_type,
            website: a.website,
            balance: a.balance,
            bonus_bets: a.bonus_bets,
            bonus_expiry: a.bonus_expiry,
            owner: a.owner,
            color: a.color,
            notes: a.notes,
            created_at: a.created_at,
            updated_at: a.updated_at,
            version: a.version,
        }
    }
}

impl From<AccountRow> for Account {
    fn from(r: AccountRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            account_type: r.account_type,
            website: r.website,
            balance: r.balance,
            bonus_bets: r.bonus_bets,
            bonus_expiry: r.bonus_expiry,
            owner: r.owner,
            color: r.color,
            notes: r.notes,
            created_at: r.created_at,
            updated_at: r.updated_at,
            version: r.version,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BonusRow {
    id: String,
    account_id: String,
    amount: f64,
    kind: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<BonusRecord> for BonusRow {
    fn from(b: BonusRecord) -> Self {
        Self {
            id: b.id,
            account_id: b.account_id,
            amount: b.amount,
            kind: b.kind,
            expires_at: b.expires_at,
            created_at: b.created_at,
        }
    }
}

impl From<BonusRow> for BonusRecord {
    fn from(r: BonusRow) -> Self {
        Self {
            id: r.id,
            account_id: r.account_id,
            amount: r.amount,
            kind: r.kind,
            expires_at: r.expires_at,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryRow {
    id: String,
    kind: EntryKind,
    account_id: String,
    counterparty_id: Option<String>,
    amount: f64,
    bonus_amount: f64,
    balance_after: f64,
    created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for EntryRow {
    fn from(e: LedgerEntry) -> Self {
        Self {
            id: e.id,
            kind: e.kind,
            account_id: e.account_id,
            counterparty_id: e.counterparty_id,
            amount: e.amount,
            bonus_amount: e.bonus_amount,
            balance_after: e.balance_after,
            created_at: e.created_at,
        }
    }
}

impl From<EntryRow> for LedgerEntry {
    fn from(r: EntryRow) -> Self {
        Self {
            id: r.id,
            kind: r.kind,
            account_id: r.account_id,
            counterparty_id: r.counterparty_id,
            amount: r.amount,
            bonus_amount: r.bonus_amount,
            balance_after: r.balance_after,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct WriteRow {
    expected_version: u64,
    account: AccountRow,
}

/// Argument object for `rpc/ledger_commit`.
#[derive(Debug, Serialize)]
struct CommitPayload {
    writes: Vec<WriteRow>,
    bonuses: Vec<BonusRow>,
    entries: Vec<EntryRow>,
}

impl From<Batch> for CommitPayload {
    fn from(batch: Batch) -> Self {
        Self {
            writes: batch
                .writes
                .into_iter()
                .map(|w| WriteRow { expected_version: w.expected_version, account: w.account.into() })
                .collect(),
            bonuses: batch.bonuses.into_iter().map(Into::into).collect(),
            entries: batch.entries.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// ERROR CLASSIFICATION
// ============================================================================

/// PostgREST error body.
#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Map a PostgREST failure onto a store error kind by SQLSTATE.
fn classify(status: reqwest::StatusCode, body: &str) -> StoreError {
    let parsed: PostgrestError = serde_json::from_str(body).unwrap_or_default();
    let message = match (&parsed.message, &parsed.details) {
        (Some(m), Some(d)) => format!("{} ({})", m, d),
        (Some(m), None) => m.clone(),
        _ => format!("{} - {}", status, body),
    };

    match parsed.code.as_deref() {
        // unique_violation, serialization_failure, deadlock_detected
        Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(message),
        // no_data_found
        Some("P0002") => StoreError::NotFound(message),
        // check_violation, not_null_violation, invalid_text_representation, invalid_parameter_value
        Some("23514") | Some("23502") | Some("22P02") | Some("22023") => StoreError::Validation(message),
        _ => StoreError::Backend(message),
    }
}

// ============================================================================
// STORE
// ============================================================================

#[derive(Clone)]
pub struct SupabaseStore {
    client: Client,
    supabase_url: String,
    service_role_key: String,
}

impl SupabaseStore {
    pub fn new(supabase_url: &str, service_role_key: &str) -> Self {
        Self {
            client: Client::new(),
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
        }
    }

    fn rest(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.supabase_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> StoreResult<T> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("Supabase request failed: {}", e)))?;
        Self::read_body(response).await
    }

    async fn read_body<T: DeserializeOwned>(response: Response) -> StoreResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify(status, &body);
            if matches!(err, StoreError::Backend(_)) {
                error!(status = %status, "Supabase error: {}", err);
            }
            return Err(err);
        }
        response
            .json()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to parse Supabase JSON: {}", e)))
    }
}

#[async_trait]
impl AccountStore for SupabaseStore {
    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        let request = self.client.get(self.rest("accounts")).query(&[("select", "*")]);
        let rows: Vec<AccountRow> = self.send(request).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_account(&self, id: &str) -> StoreResult<Option<Account>> {
        let request = self
            .client
            .get(self.rest("accounts"))
            .query(&[("id", format!("eq.{}", id)), ("select", "*".to_string())]);
        let rows: Vec<AccountRow> = self.send(request).await?;
        Ok(rows.into_iter().next().map(Into::into))
    }

    async fn insert_account(&self, account: Account) -> StoreResult<Account> {
        check_amounts(&account)?;
        let request = self
            .client
            .post(self.rest("accounts"))
            .header("Prefer", "return=representation")
            .json(&AccountRow::from(account));
        let rows: Vec<AccountRow> = self.send(request).await?;
        rows.into_iter()
            .next()
            .map(Into::into)
            .ok_or_else(|| StoreError::Backend("insert returned no row".to_string()))
    }

    async fn list_bonuses(&self, account_id: Option<&str>) -> StoreResult<Vec<BonusRecord>> {
        let mut query = vec![("select", "*".to_string()), ("order", "created_at.desc".to_string())];
        if let Some(id) = account_id {
            query.push(("account_id", format!("eq.{}", id)));
        }
        let request = self.client.get(self.rest("bonuses")).query(&query);
        let rows: Vec<BonusRow> = self.send(request).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_entries(&self, account_id: Option<&str>, limit: usize) -> StoreResult<Vec<LedgerEntry>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(id) = account_id {
            query.push(("or", format!("(account_id.eq.{id},counterparty_id.eq.{id})")));
        }
        let request = self.client.get(self.rest("ledger_entries")).query(&query);
        let rows: Vec<EntryRow> = self.send(request).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn commit(&self, batch: Batch) -> StoreResult<Vec<Account>> {
        batch.check_amounts()?;
        let writes = batch.writes.len();
        let payload = serde_json::json!({ "batch": CommitPayload::from(batch) });
        let request = self.client.post(self.rest("rpc/ledger_commit")).json(&payload);
        let rows: Vec<AccountRow> = self.send(request).await?;
        debug!(writes, "ledger_commit applied");
        Ok(rows.into_iter().map(Into::into).collect())
    }

    fn backend(&self) -> &'static str {
        "supabase"
    }
}
