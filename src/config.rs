// ============================================================================
// CONFIGURATION
// ============================================================================
//
// Read once at startup from the process environment (a `.env` file is
// loaded first by the binary).
//
//   BANKROLL_BIND_ADDR             0.0.0.0:8080
//   BANKROLL_STORE                 memory | redb | supabase
//   BANKROLL_DATA_PATH             ./bankroll_data
//   SUPABASE_URL                   required for supabase
//   SUPABASE_SERVICE_ROLE_KEY      required for supabase
//   BANKROLL_BONUS_RETENTION_DAYS  30 (1..=3650)
//   BANKROLL_MAX_ATTEMPTS          5
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;

use crate::ledger::LedgerPolicy;
use crate::storage::{AccountStore, MemoryStore, PersistentStore, StoreResult};
use crate::supabase::SupabaseStore;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_DATA_PATH: &str = "./bankroll_data";
pub const MAX_BONUS_RETENTION_DAYS: u32 = 3650;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} is not set")]
    Missing { name: &'static str },

    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    Memory,
    Redb { data_path: String },
    Supabase { url: String, service_role_key: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreBackend,
    pub policy: LedgerPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let raw_addr = get("BANKROLL_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            name: "BANKROLL_BIND_ADDR",
            value: raw_addr.clone(),
            reason: e.to_string(),
        })?;

        let store = match get("BANKROLL_STORE").map(|s| s.to_lowercase()).as_deref() {
            None | Some("memory") => StoreBackend::Memory,
            Some("redb") => StoreBackend::Redb {
                data_path: get("BANKROLL_DATA_PATH").unwrap_or_else(|| DEFAULT_DATA_PATH.to_string()),
            },
            Some("supabase") => StoreBackend::Supabase {
                url: get("SUPABASE_URL").ok_or(ConfigError::Missing { name: "SUPABASE_URL" })?,
                service_role_key: get("SUPABASE_SERVICE_ROLE_KEY")
                    .ok_or(ConfigError::Missing { name: "SUPABASE_SERVICE_ROLE_KEY" })?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "BANKROLL_STORE",
                    value: other.to_string(),
                    reason: "expected memory, redb or supabase".to_string(),
                })
            }
        };

        let defaults = LedgerPolicy::default();
        let retention_days = match get("BANKROLL_BONUS_RETENTION_DAYS") {
            Some(raw) => at_most(
                "BANKROLL_BONUS_RETENTION_DAYS",
                &raw,
                positive("BANKROLL_BONUS_RETENTION_DAYS", &raw)?,
                MAX_BONUS_RETENTION_DAYS,
            )?,
            None => defaults.bonus_retention.num_days() as u32,
        };
        let max_attempts = match get("BANKROLL_MAX_ATTEMPTS") {
            Some(raw) => positive("BANKROLL_MAX_ATTEMPTS", &raw)?,
            None => defaults.max_attempts,
        };

        Ok(Self {
            bind_addr,
            store,
            policy: LedgerPolicy {
                bonus_retention: Duration::days(i64::from(retention_days)),
                max_attempts,
            },
        })
    }

    /// Open the configured backend.
    pub fn open_store(&self) -> StoreResult<Arc<dyn AccountStore>> {
        Ok(match &self.store {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Redb { data_path } => Arc::new(PersistentStore::open(data_path)?),
            StoreBackend::Supabase { url, service_role_key } => Arc::new(SupabaseStore::new(url, service_role_key)),
        })
    }
}

fn positive(name: &'static str, raw: &str) -> Result<u32, ConfigError> {
    match raw.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
            reason: "must be at least 1".to_string(),
        }),
        Err(e) => Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn at_most(name: &'static str, raw: &str, value: u32, max: u32) -> Result<u32, ConfigError> {
    if value <= max {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
            reason: format!("must be at most {}", max),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert_eq!(cfg.policy.bonus_retention, Duration::days(30));
        assert_eq!(cfg.policy.max_attempts, 5);
    }

    #[test]
    fn test_redb_and_overrides() {
        let cfg = config(&[
            ("BANKROLL_STORE", "ReDB"),
            ("BANKROLL_DATA_PATH", "/var/lib/bankroll"),
            ("BANKROLL_BIND_ADDR", "127.0.0.1:9000"),
            ("BANKROLL_BONUS_RETENTION_DAYS", "14"),
            ("BANKROLL_MAX_ATTEMPTS", "3"),
        ])
        .unwrap();
        assert_eq!(cfg.store, StoreBackend::Redb { data_path: "/var/lib/bankroll".into() });
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.policy.bonus_retention, Duration::days(14));
        assert_eq!(cfg.policy.max_attempts, 3);
    }

    #[test]
    fn test_supabase_requires_credentials() {
        let err = config(&[("BANKROLL_STORE", "supabase"), ("SUPABASE_URL", "https://x.supabase.co")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing { name: "SUPABASE_SERVICE_ROLE_KEY" });

        let cfg = config(&[
            ("BANKROLL_STORE", "supabase"),
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "secret"),
        ])
        .unwrap();
        assert!(matches!(cfg.store, StoreBackend::Supabase { .. }));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(config(&[("BANKROLL_STORE", "mongo")]), Err(ConfigError::Invalid { .. })));
        assert!(matches!(config(&[("BANKROLL_BIND_ADDR", "nowhere")]), Err(ConfigError::Invalid { .. })));
        assert!(matches!(config(&[("BANKROLL_MAX_ATTEMPTS", "0")]), Err(ConfigError::Invalid { .. })));
        assert!(matches!(config(&[("BANKROLL_BONUS_RETENTION_DAYS", "-2")]), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_retention_is_bounded() {
        let cfg = config(&[("BANKROLL_BONUS_RETENTION_DAYS", "3650")]).unwrap();
        assert_eq!(cfg.policy.bonus_retention, Duration::days(3650));

        let err = config(&[("BANKROLL_BONUS_RETENTION_DAYS", "4000000000")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "BANKROLL_BONUS_RETENTION_DAYS",
                value: "4000000000".into(),
                reason: "must be at most 3650".into(),
            }
        );
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let cfg = config(&[("BANKROLL_STORE", "  "), ("BANKROLL_MAX_ATTEMPTS", "")]).unwrap();
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert_eq!(cfg.policy.max_attempts, 5);
    }
}
