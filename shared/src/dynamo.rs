//! DynamoDB-backed record store.
//!
//! Layout: one item per member, `PK = SK = USER#<id>`, `entity_type = user`,
//! one attribute per field. Dates are stored as RFC 3339 strings.

use crate::error::StoreError;
use crate::store::UserStore;
use crate::types::{
    parse_stored_date, AccessRecord, AccessUpdate, ProfileUpdate, User, UserRole, UserStatus,
};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::HashMap;

pub const USER_PREFIX: &str = "USER#";
pub const USER_ENTITY: &str = "user";

pub fn user_pk(user_id: &str) -> String {
    format!("{}{}", USER_PREFIX, user_id)
}

pub fn id_from_pk(pk: &str) -> Option<&str> {
    pk.strip_prefix(USER_PREFIX)
}

fn backend<E>(err: E) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StoreError::Backend(DisplayErrorContext(&err).to_string())
}

pub struct DynamoUserStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoUserStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    async fn scan_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users = Vec::new();
        let mut start_key = None;

        loop {
            let request = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("entity_type = :type")
                .expression_attribute_values(":type", AttributeValue::S(USER_ENTITY.to_string()))
                .set_exclusive_start_key(start_key);

            let output = request.send().await.map_err(backend)?;

            for item in output.items() {
                match user_from_item(item) {
                    Ok(user) => users.push(user),
                    Err(e) => tracing::warn!("Skipping unreadable user item: {}", e),
                }
            }

            start_key = output.last_evaluated_key;
            if start_key.is_none() {
                break;
            }
        }

        Ok(users)
    }
}

#[async_trait]
impl UserStore for DynamoUserStore {
    async fn get_access(&self, user_id: &str) -> Result<Option<AccessRecord>, StoreError> {
        let pk = user_pk(user_id);
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk.clone()))
            .key("SK", AttributeValue::S(pk))
            .projection_expression("#role, #status")
            .expression_attribute_names("#role", "role")
            .expression_attribute_names("#status", "status")
            .consistent_read(true)
            .send()
            .await
            .map_err(backend)?;

        let Some(item) = output.item() else {
            return Ok(None);
        };
        let get = |name: &str| item.get(name).and_then(|v| v.as_s().ok()).cloned();
        Ok(Some(AccessRecord {
            role: get("role").map(|raw| parse_enum(user_id, "role", &raw)).transpose()?,
            status: get("status").map(|raw| parse_enum(user_id, "status", &raw)).transpose()?,
        }))
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let pk = user_pk(user_id);
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk.clone()))
            .key("SK", AttributeValue::S(pk))
            .send()
            .await
            .map_err(backend)?;

        output.item().map(user_from_item).transpose()
    }

    // Older records keep the email as typed, so the match happens here
    // rather than in a filter expression.
    async fn find_by_email(&self, email: &str) -> Result<Vec<User>, StoreError> {
        let mut users = self.scan_users().await?;
        users.retain(|user| user.has_email(email));
        Ok(users)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.scan_users().await
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(user_to_item(user)))
            .condition_expression("attribute_not_exists(PK)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Err(StoreError::Conflict(user.id.clone()))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn merge_access(&self, user_id: &str, update: &AccessUpdate) -> Result<(), StoreError> {
        let mut set = Vec::new();
        let mut builder = self.client.update_item().table_name(&self.table_name);

        if let Some(role) = update.role {
            set.push("#role = :role");
            builder = builder
                .expression_attribute_names("#role", "role")
                .expression_attribute_values(":role", AttributeValue::S(role.to_string()));
        }
        if let Some(status) = update.status {
            set.push("#status = :status");
            builder = builder
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(":status", AttributeValue::S(status.to_string()));
        }
        if set.is_empty() {
            return Ok(());
        }

        let pk = user_pk(user_id);
        builder
            .key("PK", AttributeValue::S(pk.clone()))
            .key("SK", AttributeValue::S(pk))
            .update_expression(format!("SET {}", set.join(", ")))
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn merge_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<(), StoreError> {
        let mut set = Vec::new();
        let mut expr_names = HashMap::new();
        let mut expr_values = HashMap::new();

        if let Some(first_name) = &update.first_name {
            set.push("first_name = :first_name");
            expr_values.insert(":first_name".to_string(), AttributeValue::S(first_name.clone()));
        }
        if let Some(last_name) = &update.last_name {
            set.push("last_name = :last_name");
            expr_values.insert(":last_name".to_string(), AttributeValue::S(last_name.clone()));
        }
        if let Some(cohort) = &update.cohort {
            set.push("cohort = :cohort");
            expr_values.insert(":cohort".to_string(), AttributeValue::S(cohort.clone()));
        }
        if let Some(expiration_date) = update.expiration_date {
            set.push("expiration_date = :expiration_date");
            expr_values.insert(
                ":expiration_date".to_string(),
                AttributeValue::S(expiration_date.to_rfc3339()),
            );
        }
        if set.is_empty() {
            return Ok(());
        }
        expr_names.insert("#pk".to_string(), "PK".to_string());

        let pk = user_pk(user_id);
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk.clone()))
            .key("SK", AttributeValue::S(pk))
            .update_expression(format!("SET {}", set.join(", ")))
            .condition_expression("attribute_exists(#pk)")
            .set_expression_attribute_names(Some(expr_names))
            .set_expression_attribute_values(Some(expr_values))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Err(StoreError::NotFound(user_id.to_string()))
            }
            Err(e) => Err(backend(e)),
        }
    }
}

fn parse_enum<T>(id: &str, field: &str, raw: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse().map_err(|reason| StoreError::Malformed {
        id: id.to_string(),
        reason: format!("{}: {}", field, reason),
    })
}

/// Build a user from any flat string view of an item.
fn decode_user<F>(id: &str, get: F) -> Result<User, StoreError>
where
    F: Fn(&str) -> Option<String>,
{
    let malformed = |reason: String| StoreError::Malformed {
        id: id.to_string(),
        reason,
    };
    let role: UserRole = parse_enum(
        id,
        "role",
        &get("role").ok_or_else(|| malformed("missing role".to_string()))?,
    )?;
    let status: UserStatus = parse_enum(
        id,
        "status",
        &get("status").ok_or_else(|| malformed("missing status".to_string()))?,
    )?;
    let date_joined = get("date_joined")
        .as_deref()
        .and_then(parse_stored_date)
        .ok_or_else(|| malformed("missing or unreadable date_joined".to_string()))?;

    Ok(User {
        id: id.to_string(),
        first_name: get("first_name").unwrap_or_default(),
        last_name: get("last_name").unwrap_or_default(),
        email: get("email").unwrap_or_default(),
        role,
        status,
        cohort: get("cohort").filter(|c| !c.is_empty()),
        date_joined,
        expiration_date: get("expiration_date").as_deref().and_then(parse_stored_date),
    })
}

pub fn user_from_item(item: &HashMap<String, AttributeValue>) -> Result<User, StoreError> {
    let get = |name: &str| item.get(name).and_then(|v| v.as_s().ok()).cloned();
    let pk = get("PK").unwrap_or_default();
    let id = id_from_pk(&pk).ok_or_else(|| StoreError::Malformed {
        id: pk.clone(),
        reason: "not a user key".to_string(),
    })?;
    decode_user(id, get)
}

/// Decode a stream image, which arrives as DynamoDB JSON
/// (`{"PK": {"S": "USER#1"}, ...}`).
pub fn user_from_stream_image(image: &serde_json::Value) -> Result<User, StoreError> {
    let get = |name: &str| {
        image
            .get(name)
            .and_then(|attr| attr.get("S"))
            .and_then(|s| s.as_str())
            .map(|s| s.to_string())
    };
    let pk = get("PK").unwrap_or_default();
    let id = id_from_pk(&pk).ok_or_else(|| StoreError::Malformed {
        id: pk.clone(),
        reason: "not a user key".to_string(),
    })?;
    decode_user(id, get)
}

pub fn user_to_item(user: &User) -> HashMap<String, AttributeValue> {
    let pk = user_pk(&user.id);
    let mut item = HashMap::from([
        ("PK".to_string(), AttributeValue::S(pk.clone())),
        ("SK".to_string(), AttributeValue::S(pk)),
        ("entity_type".to_string(), AttributeValue::S(USER_ENTITY.to_string())),
        ("first_name".to_string(), AttributeValue::S(user.first_name.clone())),
        ("last_name".to_string(), AttributeValue::S(user.last_name.clone())),
        ("email".to_string(), AttributeValue::S(user.email.clone())),
        ("role".to_string(), AttributeValue::S(user.role.to_string())),
        ("status".to_string(), AttributeValue::S(user.status.to_string())),
        ("date_joined".to_string(), AttributeValue::S(user.date_joined.to_rfc3339())),
    ]);
    if let Some(cohort) = &user.cohort {
        item.insert("cohort".to_string(), AttributeValue::S(cohort.clone()));
    }
    if let Some(expiration_date) = user.expiration_date {
        item.insert(
            "expiration_date".to_string(),
            AttributeValue::S(expiration_date.to_rfc3339()),
        );
    }
    item
}
