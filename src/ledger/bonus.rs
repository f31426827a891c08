//! Bonus-bet lifecycle.
//!
//! ```text
//!   None ──grant──▶ Active ──consume to 0──▶ None
//!                     │
//!              now > expiry (read time)
//!                     ▼
//!                  Expired ──grant──▶ Active (stale remainder forfeited)
//! ```
//!
//! Expiry is account-level: every grant pushes it to `now + retention`.
//! Invariants kept by every function here: `bonus_bets >= 0`, and
//! `bonus_expiry` is `None` exactly when `bonus_bets == 0`.

use chrono::{DateTime, Duration, Utc};

use super::validation::ensure_representable;
use super::{LedgerError, LedgerResult};
use crate::types::{Account, BonusRecord, BonusStatus};

pub const DEFAULT_BONUS_KIND: &str = "bonus_bet";

/// Floating-point residue below this is treated as an empty bonus balance.
const DUST: f64 = 1e-9;

pub fn status(account: &Account, now: DateTime<Utc>) -> BonusStatus {
    if account.bonus_bets <= DUST {
        return BonusStatus::None;
    }
    match account.bonus_expiry {
        Some(expiry) if now > expiry => BonusStatus::Expired,
        _ => BonusStatus::Active,
    }
}

/// Bonus bets that can still be used.
pub fn active_amount(account: &Account, now: DateTime<Utc>) -> f64 {
    match status(account, now) {
        BonusStatus::Active => account.bonus_bets,
        _ => 0.0,
    }
}

/// End of a validity window opened at `now`.
pub fn expiry_after(now: DateTime<Utc>, retention: Duration) -> LedgerResult<DateTime<Utc>> {
    now.checked_add_signed(retention)
        .ok_or_else(|| LedgerError::Validation("bonus expiry is out of range".to_string()))
}

/// Add `amount` (> 0) of bonus bets and restart the validity window.
///
/// Returns the audit record for the grant and the forfeited stale amount,
/// if the previous bonus had already expired. The account is untouched on
/// error.
pub fn grant(
    account: &mut Account,
    amount: f64,
    kind: &str,
    retention: Duration,
    now: DateTime<Utc>,
) -> LedgerResult<(BonusRecord, f64)> {
    let forfeited = if status(account, now) == BonusStatus::Expired {
        account.bonus_bets
    } else {
        0.0
    };

    let expires_at = expiry_after(now, retention)?;
    let total = ensure_representable("bonusBets", account.bonus_bets - forfeited + amount)?;
    set_balance(account, total, Some(expires_at));

    let record = BonusRecord {
        id: uuid::Uuid::new_v4().to_string(),
        account_id: account.id.clone(),
        amount,
        kind: kind.to_string(),
        expires_at,
        created_at: now,
    };
    Ok((record, forfeited))
}

/// Spend `amount` (> 0) of active bonus bets.
pub fn consume(account: &mut Account, amount: f64, now: DateTime<Utc>) -> LedgerResult<()> {
    match status(account, now) {
        BonusStatus::Expired => {
            return Err(LedgerError::Validation(format!(
                "bonus bets on {} have expired",
                account.name
            )))
        }
        BonusStatus::None | BonusStatus::Active if amount > account.bonus_bets + DUST => {
            return Err(LedgerError::InsufficientBonus {
                available: account.bonus_bets.max(0.0),
                requested: amount,
            })
        }
        _ => {}
    }

    set_balance(account, account.bonus_bets - amount, None);
    Ok(())
}

/// Overwrite the bonus balance. A positive balance gets `expiry` (or keeps
/// the current one when `None` is passed); zero clears it.
pub fn set_balance(account: &mut Account, bonus_bets: f64, expiry: Option<DateTime<Utc>>) {
    if bonus_bets <= DUST {
        account.bonus_bets = 0.0;
        account.bonus_expiry = None;
    } else {
        account.bonus_bets = bonus_bets;
        if expiry.is_some() {
            account.bonus_expiry = expiry;
        }
    }
}
