//! Input validation shared by every ledger operation.
//!
//! Amounts reach the service as JSON numbers or as numeric strings typed into
//! a form. `null`, a missing field and an empty string all mean "not given".

use serde_json::Value;

use super::{LedgerError, LedgerResult};

/// Parse an optional amount. A value that is present but not a finite number
/// is a validation error.
pub fn parse_amount(field: &str, value: Option<&Value>) -> LedgerResult<Option<f64>> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<f64>().ok()
        }
        Some(_) => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(LedgerError::Validation(format!("{} must be a valid number", field))),
    }
}

/// Parse an amount that must be present.
pub fn require_amount(field: &str, value: Option<&Value>) -> LedgerResult<f64> {
    parse_amount(field, value)?.ok_or_else(|| LedgerError::Validation(format!("{} is required", field)))
}

pub fn ensure_finite(field: &str, value: f64) -> LedgerResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(LedgerError::Validation(format!("{} must be a valid number", field)))
    }
}

pub fn ensure_positive(field: &str, value: f64) -> LedgerResult<f64> {
    if ensure_finite(field, value)? > 0.0 {
        Ok(value)
    } else {
        Err(LedgerError::Validation(format!("{} must be positive", field)))
    }
}

pub fn ensure_non_negative(field: &str, value: f64) -> LedgerResult<f64> {
    if ensure_finite(field, value)? >= 0.0 {
        Ok(value)
    } else {
        Err(LedgerError::Validation(format!("{} cannot be negative", field)))
    }
}

/// A computed balance, which can leave the f64 range even when both inputs
/// were finite.
pub fn ensure_representable(field: &str, value: f64) -> LedgerResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(LedgerError::Validation(format!("{} would overflow", field)))
    }
}

/// Trimmed, non-empty identifier.
pub fn require_id<'a>(field: &str, value: &'a str) -> LedgerResult<&'a str> {
    let id = value.trim();
    if id.is_empty() {
        Err(LedgerError::Validation(format!("{} is required", field)))
    } else {
        Ok(id)
    }
}

/// Trim free text; blank becomes `None`.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
