use super::connections::{get_all_connections, remove_connection};
use crate::error::StoreError;
use crate::live::UserChange;
use aws_sdk_apigatewaymanagement::Client as ApiGatewayManagementClient;
use aws_sdk_dynamodb::Client as DynamoClient;

/// Push a user change to every open dashboard connection.
///
/// Connections API Gateway reports as gone are removed from the table.
/// Returns the number of connections the message reached.
pub async fn broadcast_change(
    dynamo_client: &DynamoClient,
    api_gateway_client: &ApiGatewayManagementClient,
    table_name: &str,
    change: &UserChange,
) -> Result<usize, StoreError> {
    let connections = get_all_connections(dynamo_client, table_name).await?;
    let message_json = serde_json::to_string(change)
        .map_err(|e| StoreError::Backend(format!("failed to encode change: {}", e)))?;

    tracing::info!("Broadcasting to {} connections", connections.len());

    let mut delivered = 0;
    for conn in connections {
        let result = api_gateway_client
            .post_to_connection()
            .connection_id(&conn.connection_id)
            .data(message_json.as_bytes().to_vec().into())
            .send()
            .await;

        match result {
            Ok(_) => delivered += 1,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_gone_exception()) => {
                tracing::info!("Connection {} is gone, removing", conn.connection_id);
                if let Err(e) = remove_connection(dynamo_client, table_name, &conn.connection_id).await {
                    tracing::warn!("Failed to remove stale connection {}: {}", conn.connection_id, e);
                }
            }
            Err(e) => {
                tracing::warn!("Failed to send to connection {}: {}", conn.connection_id, e);
            }
        }
    }

    Ok(delivered)
}
