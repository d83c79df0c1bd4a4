//! Record store seam. The DynamoDB implementation lives in `dynamo`; the
//! in-memory one backs local runs and tests and publishes a change feed.

use crate::error::StoreError;
use crate::live::UserChange;
use crate::types::{AccessRecord, AccessUpdate, ProfileUpdate, User, UserRole, UserStatus};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::{broadcast, RwLock};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Role and status only. Authorization and the sign-in gate read this,
    /// so a record missing its profile fields still resolves.
    async fn get_access(&self, user_id: &str) -> Result<Option<AccessRecord>, StoreError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    /// Every record holding `email`, compared case-insensitively.
    async fn find_by_email(&self, email: &str) -> Result<Vec<User>, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Insert a new record. Fails with `Conflict` if the id is taken.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Single merge write of role/status. Fields not set in `update` are left
    /// untouched; a missing record is created holding only these fields.
    async fn merge_access(&self, user_id: &str, update: &AccessUpdate) -> Result<(), StoreError>;

    /// Single merge write of profile fields onto an existing record. Fails
    /// with `NotFound` if there is no record.
    async fn merge_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<(), StoreError>;
}

/// A partially written record. Merge writes against an unknown id produce
/// one of these, matching what the document store keeps.
#[derive(Debug, Clone, Default)]
struct StoredUser {
    id: String,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    role: Option<UserRole>,
    status: Option<UserStatus>,
    cohort: Option<String>,
    date_joined: Option<chrono::DateTime<chrono::Utc>>,
    expiration_date: Option<chrono::DateTime<chrono::Utc>>,
}

impl StoredUser {
    fn from_user(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            first_name: Some(user.first_name.clone()),
            last_name: Some(user.last_name.clone()),
            email: Some(user.email.clone()),
            role: Some(user.role),
            status: Some(user.status),
            cohort: user.cohort.clone(),
            date_joined: Some(user.date_joined),
            expiration_date: user.expiration_date,
        }
    }

    fn to_user(&self) -> Result<User, StoreError> {
        let missing = |field: &str| StoreError::Malformed {
            id: self.id.clone(),
            reason: format!("missing {}", field),
        };
        Ok(User {
            id: self.id.clone(),
            first_name: self.first_name.clone().unwrap_or_default(),
            last_name: self.last_name.clone().unwrap_or_default(),
            email: self.email.clone().unwrap_or_default(),
            role: self.role.ok_or_else(|| missing("role"))?,
            status: self.status.ok_or_else(|| missing("status"))?,
            cohort: self.cohort.clone(),
            date_joined: self.date_joined.ok_or_else(|| missing("dateJoined"))?,
            expiration_date: self.expiration_date,
        })
    }
}

/// In-process store with last-write-wins semantics per record.
pub struct MemoryUserStore {
    records: RwLock<BTreeMap<String, StoredUser>>,
    changes: broadcast::Sender<UserChange>,
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            records: RwLock::new(BTreeMap::new()),
            changes,
        }
    }

    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let (changes, _) = broadcast::channel(256);
        let records = users
            .into_iter()
            .map(|user| (user.id.clone(), StoredUser::from_user(&user)))
            .collect();
        Self {
            records: RwLock::new(records),
            changes,
        }
    }

    /// Change feed for `LiveUsers`. Only writes after this call are seen.
    pub fn changes(&self) -> broadcast::Receiver<UserChange> {
        self.changes.subscribe()
    }

    pub async fn remove_user(&self, user_id: &str) -> bool {
        let removed = self.records.write().await.remove(user_id).is_some();
        if removed {
            let _ = self.changes.send(UserChange::Removed { id: user_id.to_string() });
        }
        removed
    }

    fn publish(&self, record: &StoredUser) {
        // partially written records are not shown until complete
        if let Ok(user) = record.to_user() {
            let _ = self.changes.send(UserChange::Upserted { user });
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_access(&self, user_id: &str) -> Result<Option<AccessRecord>, StoreError> {
        Ok(self.records.read().await.get(user_id).map(|record| AccessRecord {
            role: record.role,
            status: record.status,
        }))
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.records
            .read()
            .await
            .get(user_id)
            .map(StoredUser::to_user)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Vec<User>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter_map(|record| record.to_user().ok())
            .filter(|user| user.has_email(email))
            .collect())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter_map(|record| record.to_user().ok())
            .collect())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&user.id) {
            return Err(StoreError::Conflict(user.id.clone()));
        }
        let record = StoredUser::from_user(user);
        self.publish(&record);
        records.insert(user.id.clone(), record);
        Ok(())
    }

    async fn merge_access(&self, user_id: &str, update: &AccessUpdate) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.entry(user_id.to_string()).or_insert_with(|| StoredUser {
            id: user_id.to_string(),
            ..Default::default()
        });
        if let Some(role) = update.role {
            record.role = Some(role);
        }
        if let Some(status) = update.status {
            record.status = Some(status);
        }
        self.publish(record);
        Ok(())
    }

    async fn merge_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;
        if let Some(first_name) = &update.first_name {
            record.first_name = Some(first_name.clone());
        }
        if let Some(last_name) = &update.last_name {
            record.last_name = Some(last_name.clone());
        }
        if let Some(cohort) = &update.cohort {
            record.cohort = Some(cohort.clone());
        }
        if let Some(expiration_date) = update.expiration_date {
            record.expiration_date = Some(expiration_date);
        }
        self.publish(record);
        Ok(())
    }
}
