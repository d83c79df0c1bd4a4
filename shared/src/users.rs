use crate::access::require_admin;
use crate::config::MAX_ACCESS_DAYS;
use crate::error::{FunctionError, StoreError};
use crate::identity::IdentityProvisioner;
use crate::store::UserStore;
use crate::types::{
    parse_stored_date, CallerIdentity, CreateUserRequest, CreateUserResponse, ListUsersResponse,
    MessageResponse, ProfileUpdate, User, UserRole, UserStatus,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};

/// `createUser`. The identity provider assigns the id; the client never does.
pub async fn create_user(
    store: &dyn UserStore,
    provisioner: &dyn IdentityProvisioner,
    default_access_days: i64,
    caller: Option<&CallerIdentity>,
    data: Value,
) -> Result<CreateUserResponse, FunctionError> {
    let caller = require_admin(store, caller).await?;

    let req: CreateUserRequest = serde_json::from_value(data)
        .map_err(|e| FunctionError::InvalidArgument(format!("Invalid user data: {}", e)))?;

    let first_name = required(&req.first_name, "firstName")?;
    let last_name = required(&req.last_name, "lastName")?;
    let email = required(&req.email, "email")?.to_ascii_lowercase();
    if !email.contains('@') {
        return Err(FunctionError::InvalidArgument("email must be a valid address.".to_string()));
    }

    let holders = store.find_by_email(&email).await?;
    if holders.iter().any(|user| user.status != UserStatus::Inactive) {
        return Err(FunctionError::InvalidArgument(
            "A member with this email already exists.".to_string(),
        ));
    }

    let now = Utc::now();
    let expiration_date = expiration_for(&req, now, default_access_days)?;

    let id = provisioner.provision(&email, &first_name, &last_name).await?;

    let user = User {
        id: id.clone(),
        first_name,
        last_name,
        email,
        role: req.role.unwrap_or(UserRole::Student),
        status: req.status.unwrap_or(UserStatus::Active),
        cohort: req.cohort.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        date_joined: now,
        expiration_date: Some(expiration_date),
    };

    store.insert_user(&user).await?;

    tracing::info!("Admin {} created user {} ({})", caller.uid, user.id, user.role);
    Ok(CreateUserResponse { id })
}

/// `editUser`. Expects `{ targetUserId, updates: { firstName?, lastName?,
/// cohort?, expirationDate? } }`; other keys are ignored.
pub async fn edit_user(
    store: &dyn UserStore,
    caller: Option<&CallerIdentity>,
    data: &Value,
) -> Result<MessageResponse, FunctionError> {
    let caller = require_admin(store, caller).await?;

    let target_user_id = data
        .get("targetUserId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty());
    let updates = data.get("updates").and_then(Value::as_object);

    let (target_user_id, updates) = match (target_user_id, updates) {
        (Some(target), Some(updates)) => (target, updates),
        _ => {
            return Err(FunctionError::InvalidArgument(
                "targetUserId and updates are required.".to_string(),
            ))
        }
    };

    let update = filter_profile_update(updates)?;

    store
        .merge_profile(target_user_id, &update)
        .await
        .map_err(|e| match e {
            StoreError::NotFound(id) => FunctionError::NotFound(format!("User {} not found.", id)),
            other => other.into(),
        })?;

    tracing::info!("Admin {} edited profile of {}", caller.uid, target_user_id);
    Ok(MessageResponse::new("User updated successfully."))
}

/// `listUsers`. Initial snapshot for the dashboard table.
pub async fn list_users(
    store: &dyn UserStore,
    caller: Option<&CallerIdentity>,
) -> Result<ListUsersResponse, FunctionError> {
    require_admin(store, caller).await?;
    let users = store.list_users().await?;
    Ok(ListUsersResponse { users })
}

pub fn filter_profile_update(updates: &Map<String, Value>) -> Result<ProfileUpdate, FunctionError> {
    let mut update = ProfileUpdate::default();

    for (key, value) in updates {
        match key.as_str() {
            "firstName" => update.first_name = Some(required(string_field(key, value)?, key)?),
            "lastName" => update.last_name = Some(required(string_field(key, value)?, key)?),
            "cohort" => update.cohort = Some(string_field(key, value)?.trim().to_string()),
            "expirationDate" => {
                let raw = string_field(key, value)?;
                let at = parse_stored_date(raw).ok_or_else(|| {
                    FunctionError::InvalidArgument(format!("Invalid expirationDate: '{}'.", raw))
                })?;
                update.expiration_date = Some(at);
            }
            other => tracing::debug!("Ignoring field '{}' in profile edit", other),
        }
    }

    if update.is_empty() {
        return Err(FunctionError::InvalidArgument("No valid fields to update.".to_string()));
    }
    Ok(update)
}

fn string_field<'a>(key: &str, value: &'a Value) -> Result<&'a str, FunctionError> {
    value
        .as_str()
        .ok_or_else(|| FunctionError::InvalidArgument(format!("{} must be a string.", key)))
}

fn required(value: &str, field: &str) -> Result<String, FunctionError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(FunctionError::InvalidArgument(format!("{} is required.", field)));
    }
    Ok(value.to_string())
}

fn expiration_for(
    req: &CreateUserRequest,
    now: DateTime<Utc>,
    default_access_days: i64,
) -> Result<DateTime<Utc>, FunctionError> {
    if let Some(at) = req.expiration_date {
        if at < now {
            return Err(FunctionError::InvalidArgument(
                "expirationDate must not be in the past.".to_string(),
            ));
        }
        return Ok(at);
    }
    let days = match req.access_duration_days {
        Some(0) => {
            return Err(FunctionError::InvalidArgument(
                "accessDurationDays must be positive.".to_string(),
            ))
        }
        Some(days) => i64::from(days),
        None => default_access_days,
    };
    Some(days)
        .filter(|days| *days <= MAX_ACCESS_DAYS)
        .and_then(Duration::try_days)
        .and_then(|window| now.checked_add_signed(window))
        .ok_or_else(|| FunctionError::InvalidArgument("accessDurationDays is out of range.".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorStatus, ProvisionError};
    use crate::identity::LocalProvisioner;
    use crate::store::{MemoryUserStore, MockUserStore};
    use crate::types::{AccessRecord, AccessUpdate};
    use async_trait::async_trait;
    use serde_json::json;

    struct FailingProvisioner;

    #[async_trait]
    impl IdentityProvisioner for FailingProvisioner {
        async fn provision(&self, email: &str, _: &str, _: &str) -> Result<String, ProvisionError> {
            Err(ProvisionError::Provider(format!("UsernameExistsException: {}", email)))
        }
    }

    async fn store_with_admin() -> MemoryUserStore {
        let store = MemoryUserStore::new();
        let now = Utc::now();
        store
            .insert_user(&User {
                id: "admin-a".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Admin".to_string(),
                email: "ada@example.com".to_string(),
                role: UserRole::Admin,
                status: UserStatus::Active,
                cohort: None,
                date_joined: now,
                expiration_date: None,
            })
            .await
            .unwrap();
        store
    }

    fn admin() -> CallerIdentity {
        CallerIdentity::new("admin-a")
    }

    #[tokio::test]
    async fn creates_user_with_server_assigned_id_and_defaults() {
        let store = store_with_admin().await;
        let resp = create_user(
            &store,
            &LocalProvisioner,
            30,
            Some(&admin()),
            json!({"firstName": " Marcus ", "lastName": "Smith", "email": "M.Smith@Example.com", "cohort": "fall-24", "id": "client-chosen"}),
        )
        .await
        .unwrap();
        assert_ne!(resp.id, "client-chosen");

        let user = store.get_user(&resp.id).await.unwrap().unwrap();
        assert_eq!(user.first_name, "Marcus");
        assert_eq!(user.email, "m.smith@example.com");
        assert_eq!(user.role, UserRole::Student);
        assert_eq!(user.status, UserStatus::Active);
        assert_eq!(user.cohort.as_deref(), Some("fall-24"));
        assert_eq!(user.expiration_date, Some(user.date_joined + Duration::days(30)));
    }

    #[tokio::test]
    async fn access_duration_sets_expiration() {
        let store = store_with_admin().await;
        let resp = create_user(
            &store,
            &LocalProvisioner,
            30,
            Some(&admin()),
            json!({"firstName": "Anna", "lastName": "Lindberg", "email": "anna@example.com", "role": "Coach", "accessDurationDays": 90}),
        )
        .await
        .unwrap();
        let user = store.get_user(&resp.id).await.unwrap().unwrap();
        assert_eq!(user.role, UserRole::Coach);
        assert_eq!(user.expiration_date, Some(user.date_joined + Duration::days(90)));
    }

    #[tokio::test]
    async fn create_requires_admin() {
        let store = store_with_admin().await;
        store
            .merge_access("coach-c", &AccessUpdate { role: Some(UserRole::Coach), status: Some(UserStatus::Active) })
            .await
            .unwrap();
        let data = json!({"firstName": "A", "lastName": "B", "email": "ab@example.com"});

        let err = create_user(&store, &LocalProvisioner, 30, None, data.clone()).await.unwrap_err();
        assert_eq!(err.status(), ErrorStatus::Unauthenticated);

        let err = create_user(&store, &LocalProvisioner, 30, Some(&CallerIdentity::new("coach-c")), data)
            .await
            .unwrap_err();
        assert_eq!(err.status(), ErrorStatus::PermissionDenied);
    }

    #[tokio::test]
    async fn create_rejects_bad_fields() {
        let store = store_with_admin().await;
        for data in [
            json!({"firstName": "", "lastName": "B", "email": "ab@example.com"}),
            json!({"firstName": "A", "lastName": "B", "email": "not-an-address"}),
            json!({"firstName": "A", "lastName": "B", "email": "ab@example.com", "role": "owner"}),
            json!({"firstName": "A", "lastName": "B", "email": "ab@example.com", "accessDurationDays": 0}),
            json!({"lastName": "B", "email": "ab@example.com"}),
        ] {
            let err = create_user(&store, &LocalProvisioner, 30, Some(&admin()), data.clone())
                .await
                .unwrap_err();
            assert_eq!(err.status(), ErrorStatus::InvalidArgument, "{}", data);
        }
    }

    #[tokio::test]
    async fn oversized_access_window_is_invalid() {
        let store = store_with_admin().await;
        let err = create_user(
            &store,
            &LocalProvisioner,
            30,
            Some(&admin()),
            json!({"firstName": "X", "lastName": "Y", "email": "x@example.com", "accessDurationDays": u32::MAX}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), ErrorStatus::InvalidArgument);
        assert_eq!(err.public_message(), "accessDurationDays is out of range.");

        let err = create_user(
            &store,
            &LocalProvisioner,
            i64::MAX,
            Some(&admin()),
            json!({"firstName": "X", "lastName": "Y", "email": "x@example.com"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), ErrorStatus::InvalidArgument);
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_active_email_is_rejected() {
        let store = store_with_admin().await;
        let err = create_user(
            &store,
            &LocalProvisioner,
            30,
            Some(&admin()),
            json!({"firstName": "Ada", "lastName": "Again", "email": "ADA@example.com"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), ErrorStatus::InvalidArgument);
    }

    #[tokio::test]
    async fn inactive_holder_does_not_hide_active_duplicate() {
        let store = store_with_admin().await;
        for (id, email, status) in [
            ("a-old", "dup@example.com", UserStatus::Inactive),
            ("b-live", "Dup@Example.com", UserStatus::Active),
        ] {
            store
                .insert_user(&User {
                    id: id.to_string(),
                    first_name: "Dup".to_string(),
                    last_name: id.to_string(),
                    email: email.to_string(),
                    role: UserRole::Student,
                    status,
                    cohort: None,
                    date_joined: Utc::now(),
                    expiration_date: None,
                })
                .await
                .unwrap();
        }

        let err = create_user(
            &store,
            &LocalProvisioner,
            30,
            Some(&admin()),
            json!({"firstName": "Dup", "lastName": "Third", "email": "dup@example.com"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), ErrorStatus::InvalidArgument);
        assert_eq!(store.find_by_email("dup@example.com").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn only_inactive_holders_allow_reuse() {
        let store = store_with_admin().await;
        store
            .insert_user(&User {
                id: "gone".to_string(),
                first_name: "Old".to_string(),
                last_name: "Member".to_string(),
                email: "old@example.com".to_string(),
                role: UserRole::Student,
                status: UserStatus::Inactive,
                cohort: None,
                date_joined: Utc::now(),
                expiration_date: None,
            })
            .await
            .unwrap();

        let resp = create_user(
            &store,
            &LocalProvisioner,
            30,
            Some(&admin()),
            json!({"firstName": "New", "lastName": "Member", "email": "OLD@example.com"}),
        )
        .await
        .unwrap();
        assert_ne!(resp.id, "gone");
    }

    #[tokio::test]
    async fn provisioning_failure_writes_nothing() {
        let store = store_with_admin().await;
        let err = create_user(
            &store,
            &FailingProvisioner,
            30,
            Some(&admin()),
            json!({"firstName": "A", "lastName": "B", "email": "ab@example.com"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), ErrorStatus::Internal);
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn edit_touches_profile_fields_only() {
        let store = store_with_admin().await;
        let resp = edit_user(
            &store,
            Some(&admin()),
            &json!({"targetUserId": "admin-a", "updates": {
                "firstName": "Adele",
                "cohort": "winter",
                "expirationDate": "2031-01-15",
                "email": "changed@example.com",
                "role": "student"
            }}),
        )
        .await
        .unwrap();
        assert_eq!(resp.message, "User updated successfully.");

        let user = store.get_user("admin-a").await.unwrap().unwrap();
        assert_eq!(user.first_name, "Adele");
        assert_eq!(user.last_name, "Admin");
        assert_eq!(user.cohort.as_deref(), Some("winter"));
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.role, UserRole::Admin);
        assert_eq!(user.expiration_date, parse_stored_date("2031-01-15"));
    }

    #[tokio::test]
    async fn edit_unknown_target_is_not_found() {
        let store = store_with_admin().await;
        let err = edit_user(
            &store,
            Some(&admin()),
            &json!({"targetUserId": "nobody", "updates": {"cohort": "x"}}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), ErrorStatus::NotFound);
    }

    #[tokio::test]
    async fn record_vanishing_before_edit_is_not_found() {
        let mut store = MockUserStore::new();
        store
            .expect_get_access()
            .returning(|_| Ok(Some(AccessRecord { role: Some(UserRole::Admin), status: None })));
        store
            .expect_merge_profile()
            .times(1)
            .returning(|id, _| Err(StoreError::NotFound(id.to_string())));

        let err = edit_user(
            &store,
            Some(&admin()),
            &json!({"targetUserId": "u7", "updates": {"lastName": "Gone"}}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), ErrorStatus::NotFound);
        assert_eq!(err.public_message(), "User u7 not found.");
    }

    #[tokio::test]
    async fn edit_without_profile_fields_is_invalid() {
        let store = store_with_admin().await;
        let err = edit_user(
            &store,
            Some(&admin()),
            &json!({"targetUserId": "admin-a", "updates": {"status": "inactive"}}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), ErrorStatus::InvalidArgument);
    }

    #[tokio::test]
    async fn list_requires_admin() {
        let store = store_with_admin().await;
        let resp = list_users(&store, Some(&admin())).await.unwrap();
        assert_eq!(resp.users.len(), 1);
        let err = list_users(&store, Some(&CallerIdentity::new("stranger"))).await.unwrap_err();
        assert_eq!(err.status(), ErrorStatus::PermissionDenied);
    }
}
