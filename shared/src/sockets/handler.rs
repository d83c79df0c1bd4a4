use super::connections::{remove_connection, save_connection};
use crate::access::require_admin;
use crate::auth::caller_identity;
use crate::AppState;
use lambda_http::request::RequestContext;
use lambda_http::{http::StatusCode, Body, Error, Request, RequestExt, Response};
use std::sync::Arc;

/// Handle dashboard WebSocket events ($connect, $disconnect, $default).
///
/// Only admins may hold a connection; the stream Lambda pushes every user
/// change to all saved connections.
pub async fn handle_websocket_event(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let (connection_id, route_key) = match event.request_context_ref() {
        Some(RequestContext::WebSocket(ctx)) => (
            ctx.connection_id.clone().unwrap_or_default(),
            ctx.route_key.clone().unwrap_or_default(),
        ),
        _ => return empty(StatusCode::BAD_REQUEST),
    };

    tracing::info!("WebSocket event: {} for connection: {}", route_key, connection_id);

    let table_name = &state.config.table_name;

    match route_key.as_str() {
        "$connect" => {
            let caller = caller_identity(&event, state.config.allow_user_id_header);
            let user_id = match require_admin(state.store.as_ref(), caller.as_ref()).await {
                Ok(caller) => caller.uid.clone(),
                Err(e) => {
                    tracing::warn!("WebSocket connect {} rejected: {}", connection_id, e);
                    return empty(e.status().http_status());
                }
            };
            let Some(dynamo_client) = state.dynamo_client.as_ref() else {
                return unavailable();
            };
            save_connection(dynamo_client, table_name, &connection_id, &user_id).await?;
            empty(StatusCode::OK)
        }
        "$disconnect" => {
            let Some(dynamo_client) = state.dynamo_client.as_ref() else {
                return unavailable();
            };
            remove_connection(dynamo_client, table_name, &connection_id).await?;
            empty(StatusCode::OK)
        }
        other => {
            // dashboards only listen; nothing is accepted from them
            tracing::warn!("Ignoring WebSocket route: {}", other);
            empty(StatusCode::BAD_REQUEST)
        }
    }
}

fn unavailable() -> Result<Response<Body>, Error> {
    tracing::warn!("WebSocket event received without a DynamoDB client configured");
    empty(StatusCode::SERVICE_UNAVAILABLE)
}

fn empty(status: StatusCode) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .body(Body::Empty)
        .map_err(Box::new)?)
}
