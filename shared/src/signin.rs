use crate::error::FunctionError;
use crate::store::UserStore;

pub const INACTIVE_MESSAGE: &str = "Your account is inactive. Please contact support.";

/// Runs before the identity provider completes a sign-in.
///
/// No record means nothing has been restricted yet, so the sign-in goes
/// ahead. Store failures are returned as errors, which blocks the sign-in.
pub async fn before_sign_in(store: &dyn UserStore, uid: &str) -> Result<(), FunctionError> {
    match store.get_access(uid).await? {
        Some(access) if access.is_inactive() => {
            tracing::warn!("Blocked sign-in for inactive user {}", uid);
            Err(FunctionError::PermissionDenied(INACTIVE_MESSAGE.to_string()))
        }
        Some(_) => Ok(()),
        None => {
            tracing::info!("No user record for {}, allowing sign-in", uid);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorStatus, StoreError};
    use crate::store::{MemoryUserStore, MockUserStore};
    use crate::types::{AccessUpdate, UserRole, UserStatus};

    async fn store_with_status(status: UserStatus) -> MemoryUserStore {
        let store = MemoryUserStore::new();
        store
            .merge_access("u1", &AccessUpdate { role: Some(UserRole::Student), status: Some(status) })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn inactive_record_blocks_sign_in() {
        let store = store_with_status(UserStatus::Inactive).await;
        let err = before_sign_in(&store, "u1").await.unwrap_err();
        assert_eq!(err.status(), ErrorStatus::PermissionDenied);
        assert_eq!(err.public_message(), INACTIVE_MESSAGE);
    }

    #[tokio::test]
    async fn active_and_pending_records_sign_in() {
        for status in [UserStatus::Active, UserStatus::Pending] {
            let store = store_with_status(status).await;
            assert!(before_sign_in(&store, "u1").await.is_ok());
        }
    }

    #[tokio::test]
    async fn missing_record_fails_open() {
        let store = MemoryUserStore::new();
        assert!(before_sign_in(&store, "newcomer").await.is_ok());
    }

    #[tokio::test]
    async fn store_error_blocks_sign_in() {
        let mut store = MockUserStore::new();
        store
            .expect_get_access()
            .returning(|_| Err(StoreError::Backend("timeout".to_string())));
        let err = before_sign_in(&store, "u1").await.unwrap_err();
        assert_eq!(err.status(), ErrorStatus::Internal);
    }
}
