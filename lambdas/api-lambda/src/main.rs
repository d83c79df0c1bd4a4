use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use coachdesk_shared::config::Config;
use coachdesk_shared::dynamo::DynamoUserStore;
use coachdesk_shared::identity::{CognitoProvisioner, IdentityProvisioner, LocalProvisioner};
use coachdesk_shared::AppState;
use lambda_http::request::RequestContext;
use lambda_http::{run, service_fn, tracing, Error, Request, RequestExt};
use std::sync::Arc;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let config = Config::from_env()?;

    // Initialize AWS clients once at startup
    let aws_config = aws_config::load_from_env().await;
    let dynamo_client = DynamoClient::new(&aws_config);

    let provisioner: Arc<dyn IdentityProvisioner> = match &config.user_pool_id {
        Some(user_pool_id) => Arc::new(CognitoProvisioner::new(
            CognitoClient::new(&aws_config),
            user_pool_id.clone(),
        )),
        None => {
            tracing::warn!("COGNITO_USER_POOL_ID not set; new users get local ids");
            Arc::new(LocalProvisioner)
        }
    };

    let store = Arc::new(DynamoUserStore::new(dynamo_client.clone(), config.table_name.clone()));
    let state = AppState::new(config, store, provisioner, Some(dynamo_client));

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move {
            if matches!(event.request_context_ref(), Some(RequestContext::WebSocket(_))) {
                coachdesk_shared::sockets::handle_websocket_event(event, state).await
            } else {
                http_handler::function_handler(event, state).await
            }
        }
    }))
    .await
}
