use crate::error::StoreError;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use serde::{Deserialize, Serialize};

pub const CONNECTION_PREFIX: &str = "CONNECTION#";
const CONNECTION_ENTITY: &str = "connection";

/// Dashboard WebSocket connection stored in DynamoDB
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Connection {
    pub connection_id: String,
    pub user_id: String,
    pub connected_at: String,
}

fn connection_pk(connection_id: &str) -> String {
    format!("{}{}", CONNECTION_PREFIX, connection_id)
}

/// Save a WebSocket connection to DynamoDB
pub async fn save_connection(
    client: &DynamoClient,
    table_name: &str,
    connection_id: &str,
    user_id: &str,
) -> Result<(), StoreError> {
    let now = chrono::Utc::now().to_rfc3339();
    let pk = connection_pk(connection_id);

    client
        .put_item()
        .table_name(table_name)
        .item("PK", AttributeValue::S(pk.clone()))
        .item("SK", AttributeValue::S(pk))
        .item("connection_id", AttributeValue::S(connection_id.to_string()))
        .item("user_id", AttributeValue::S(user_id.to_string()))
        .item("connected_at", AttributeValue::S(now))
        .item("entity_type", AttributeValue::S(CONNECTION_ENTITY.to_string()))
        .send()
        .await
        .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;

    tracing::info!("Connection saved: {} (user: {})", connection_id, user_id);
    Ok(())
}

/// Remove a WebSocket connection from DynamoDB
pub async fn remove_connection(
    client: &DynamoClient,
    table_name: &str,
    connection_id: &str,
) -> Result<(), StoreError> {
    let pk = connection_pk(connection_id);

    client
        .delete_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .send()
        .await
        .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;

    tracing::info!("Connection removed: {}", connection_id);
    Ok(())
}

/// Get all open dashboard connections
pub async fn get_all_connections(
    client: &DynamoClient,
    table_name: &str,
) -> Result<Vec<Connection>, StoreError> {
    let mut connections = Vec::new();
    let mut start_key = None;

    loop {
        let output = client
            .scan()
            .table_name(table_name)
            .filter_expression("entity_type = :type")
            .expression_attribute_values(":type", AttributeValue::S(CONNECTION_ENTITY.to_string()))
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;

        for item in output.items() {
            if let (Some(conn_id), Some(user_id), Some(connected_at)) = (
                item.get("connection_id").and_then(|v| v.as_s().ok()),
                item.get("user_id").and_then(|v| v.as_s().ok()),
                item.get("connected_at").and_then(|v| v.as_s().ok()),
            ) {
                connections.push(Connection {
                    connection_id: conn_id.clone(),
                    user_id: user_id.clone(),
                    connected_at: connected_at.clone(),
                });
            }
        }

        start_key = output.last_evaluated_key;
        if start_key.is_none() {
            break;
        }
    }

    Ok(connections)
}
