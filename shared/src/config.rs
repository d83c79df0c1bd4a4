use crate::cycle::{default_role_cycle, default_status_cycle, TransitionTable};
use crate::error::ConfigError;
use crate::types::{UserRole, UserStatus};

pub const DEFAULT_TABLE_NAME: &str = "coachdesk-users";
pub const DEFAULT_ACCESS_DAYS: i64 = 30;
/// Upper bound for any access window, configured or requested.
pub const MAX_ACCESS_DAYS: i64 = 36_500;

/// Runtime settings, read once at cold start.
#[derive(Debug, Clone)]
pub struct Config {
    pub table_name: String,
    pub user_pool_id: Option<String>,
    pub ws_api_endpoint: Option<String>,
    /// Local development only: trust an `X-User-Id` header as the caller.
    pub allow_user_id_header: bool,
    pub default_access_days: i64,
    pub role_cycle: TransitionTable<UserRole>,
    pub status_cycle: TransitionTable<UserStatus>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            user_pool_id: None,
            ws_api_endpoint: None,
            allow_user_id_header: false,
            default_access_days: DEFAULT_ACCESS_DAYS,
            role_cycle: default_role_cycle(),
            status_cycle: default_status_cycle(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let default_access_days = match non_empty("DEFAULT_ACCESS_DAYS") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|days| (1..=MAX_ACCESS_DAYS).contains(days))
                .ok_or_else(|| ConfigError::Invalid {
                    key: "DEFAULT_ACCESS_DAYS",
                    reason: format!("expected 1 to {} days, got '{}'", MAX_ACCESS_DAYS, raw),
                })?,
            None => DEFAULT_ACCESS_DAYS,
        };

        let role_cycle = match non_empty("ROLE_CYCLE") {
            Some(raw) => TransitionTable::parse("ROLE_CYCLE", &raw, &UserRole::ALL)?,
            None => default_role_cycle(),
        };
        let status_cycle = match non_empty("STATUS_CYCLE") {
            Some(raw) => TransitionTable::parse("STATUS_CYCLE", &raw, &UserStatus::ALL)?,
            None => default_status_cycle(),
        };

        Ok(Self {
            table_name: non_empty("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            user_pool_id: non_empty("COGNITO_USER_POOL_ID"),
            ws_api_endpoint: non_empty("WS_API_ENDPOINT"),
            allow_user_id_header: non_empty("ALLOW_USER_ID_HEADER")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            default_access_days,
            role_cycle,
            status_cycle,
        })
    }

    pub fn next_role(&self, current: UserRole) -> UserRole {
        self.role_cycle.next(current)
    }

    pub fn next_status(&self, current: UserStatus) -> UserStatus {
        self.status_cycle.next(current)
    }
}
