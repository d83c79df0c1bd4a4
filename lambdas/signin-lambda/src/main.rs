use aws_lambda_events::event::cognito::CognitoEventUserPoolsPreAuthentication;
use aws_sdk_dynamodb::Client as DynamoClient;
use coachdesk_shared::config::Config;
use coachdesk_shared::dynamo::DynamoUserStore;
use coachdesk_shared::signin::before_sign_in;
use coachdesk_shared::store::UserStore;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = Config::from_env()?;
    let aws_config = aws_config::load_from_env().await;
    let store = DynamoUserStore::new(DynamoClient::new(&aws_config), config.table_name);
    let store = &store;

    run(service_fn(move |event: LambdaEvent<CognitoEventUserPoolsPreAuthentication>| async move {
        function_handler(event.payload, store).await
    }))
    .await
}

/// Cognito pre-authentication trigger. Returning an error rejects the
/// sign-in and Cognito shows the error message to the user.
async fn function_handler(
    event: CognitoEventUserPoolsPreAuthentication,
    store: &dyn UserStore,
) -> Result<CognitoEventUserPoolsPreAuthentication, Error> {
    let Some(uid) = principal_id(&event) else {
        tracing::warn!("Pre-authentication event without a subject, allowing");
        return Ok(event);
    };

    before_sign_in(store, &uid)
        .await
        .map_err(|e| Error::from(e.public_message()))?;
    Ok(event)
}

/// The member id is the Cognito `sub`; older pools only give the user name.
fn principal_id(event: &CognitoEventUserPoolsPreAuthentication) -> Option<String> {
    event
        .request
        .user_attributes
        .get("sub")
        .filter(|s| !s.is_empty())
        .cloned()
        .or_else(|| event.cognito_event_user_pools_header.user_name.clone())
}
