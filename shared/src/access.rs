//! Role/status management. The only path that may change who is an admin
//! and who is allowed to sign in.

use crate::error::FunctionError;
use crate::store::UserStore;
use crate::types::{AccessUpdate, CallerIdentity, MessageResponse, UserRole, UserStatus};
use serde_json::{Map, Value};

pub const ADMIN_ONLY_MESSAGE: &str = "Only admins can manage users.";

/// Resolve the caller and check their persisted role.
///
/// Runs on every call; nothing the caller sends is consulted.
pub async fn require_admin<'a>(
    store: &dyn UserStore,
    caller: Option<&'a CallerIdentity>,
) -> Result<&'a CallerIdentity, FunctionError> {
    let caller = caller.ok_or_else(FunctionError::unauthenticated)?;

    let access = store.get_access(&caller.uid).await?;
    match access {
        Some(access) if access.is_admin() => Ok(caller),
        Some(_) => {
            tracing::warn!("Non-admin caller {} denied", caller.uid);
            Err(FunctionError::PermissionDenied(ADMIN_ONLY_MESSAGE.to_string()))
        }
        None => {
            tracing::warn!("Caller {} has no user record, denied", caller.uid);
            Err(FunctionError::PermissionDenied(ADMIN_ONLY_MESSAGE.to_string()))
        }
    }
}

/// `manageUserRole`. Expects `{ targetUserId, updates: { role?, status? } }`.
pub async fn manage_user_role(
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
    let updates = data
        .get("updates")
        .and_then(Value::as_object)
        .filter(|updates| !updates.is_empty());

    let (target_user_id, updates) = match (target_user_id, updates) {
        (Some(target), Some(updates)) => (target, updates),
        _ => {
            return Err(FunctionError::InvalidArgument(
                "targetUserId and updates are required.".to_string(),
            ))
        }
    };

    let update = filter_access_update(updates)?;

    store.merge_access(target_user_id, &update).await?;

    tracing::info!(
        "Admin {} updated {} (role: {:?}, status: {:?})",
        caller.uid,
        target_user_id,
        update.role,
        update.status
    );
    Ok(MessageResponse::new("User updated successfully."))
}

/// Keep only `role` and `status` and require their values to be known enum
/// values. Fails if nothing usable remains.
pub fn filter_access_update(updates: &Map<String, Value>) -> Result<AccessUpdate, FunctionError> {
    let mut update = AccessUpdate::default();

    for (key, value) in updates {
        match key.as_str() {
            "role" => update.role = Some(parse_field::<UserRole>(key, value)?),
            "status" => update.status = Some(parse_field::<UserStatus>(key, value)?),
            other => tracing::debug!("Dropping non-whitelisted field '{}'", other),
        }
    }

    if update.is_empty() {
        return Err(FunctionError::InvalidArgument("No valid fields to update.".to_string()));
    }
    Ok(update)
}

fn parse_field<T>(key: &str, value: &Value) -> Result<T, FunctionError>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .as_str()
        .ok_or_else(|| "expected a string".to_string())
        .and_then(|raw| raw.parse::<T>())
        .map_err(|reason| FunctionError::InvalidArgument(format!("Invalid {}: {}.", key, reason)))
}
