//! Advisory next-value tables used by the dashboard for one-click cycling.
//!
//! These carry no authority. Whatever value a client proposes still goes
//! through `access::manage_user_role`, which re-checks the caller and the
//! field whitelist.

use crate::error::ConfigError;
use crate::types::{UserRole, UserStatus};
use std::collections::HashMap;
use std::hash::Hash;
use std::str::FromStr;

/// Total mapping from each enum value to the value a click proposes next.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionTable<T: Copy + Eq + Hash> {
    next: HashMap<T, T>,
}

impl<T> TransitionTable<T>
where
    T: Copy + Eq + Hash + FromStr<Err = String>,
{
    /// Build a table, rejecting any that leaves a value in `all` without a successor.
    pub fn new(
        key: &'static str,
        pairs: &[(T, T)],
        all: &[T],
    ) -> Result<Self, ConfigError> {
        let next: HashMap<T, T> = pairs.iter().copied().collect();
        if all.iter().any(|v| !next.contains_key(v)) {
            return Err(ConfigError::Invalid {
                key,
                reason: "transition table must give every value a successor".to_string(),
            });
        }
        Ok(Self { next })
    }

    /// Parse `from:to,from:to,...`.
    pub fn parse(key: &'static str, raw: &str, all: &[T]) -> Result<Self, ConfigError> {
        let mut pairs = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (from, to) = entry.split_once(':').ok_or_else(|| ConfigError::Invalid {
                key,
                reason: format!("expected from:to, got '{}'", entry),
            })?;
            let from = from.parse().map_err(|reason| ConfigError::Invalid { key, reason })?;
            let to = to.parse().map_err(|reason| ConfigError::Invalid { key, reason })?;
            pairs.push((from, to));
        }
        Self::new(key, &pairs, all)
    }

    pub fn next(&self, current: T) -> T {
        // new() guarantees totality
        self.next.get(&current).copied().unwrap_or(current)
    }
}

pub fn default_role_cycle() -> TransitionTable<UserRole> {
    TransitionTable {
        next: HashMap::from([
            (UserRole::Student, UserRole::Coach),
            (UserRole::Coach, UserRole::Admin),
            (UserRole::Admin, UserRole::Student),
        ]),
    }
}

/// `pending -> active` is kept as a configured default; deployments that
/// want a different rule set `STATUS_CYCLE`.
pub fn default_status_cycle() -> TransitionTable<UserStatus> {
    TransitionTable {
        next: HashMap::from([
            (UserStatus::Active, UserStatus::Inactive),
            (UserStatus::Inactive, UserStatus::Active),
            (UserStatus::Pending, UserStatus::Active),
        ]),
    }
}
