use aws_lambda_events::event::dynamodb::{Event, EventRecord};
use aws_sdk_apigatewaymanagement::Client as ApiGatewayManagementClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use coachdesk_shared::config::Config;
use coachdesk_shared::dynamo::{id_from_pk, user_from_stream_image};
use coachdesk_shared::error::StoreError;
use coachdesk_shared::live::UserChange;
use coachdesk_shared::sockets::broadcast::broadcast_change;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;

struct Clients {
    dynamo: DynamoClient,
    api_gateway: ApiGatewayManagementClient,
    table_name: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = Config::from_env()?;
    let ws_endpoint = config
        .ws_api_endpoint
        .clone()
        .ok_or("WS_API_ENDPOINT must be set for the stream handler")?;

    let aws_config = aws_config::load_from_env().await;
    let api_config = aws_sdk_apigatewaymanagement::config::Builder::from(&aws_config)
        .endpoint_url(ws_endpoint)
        .build();
    let clients = Clients {
        dynamo: DynamoClient::new(&aws_config),
        api_gateway: ApiGatewayManagementClient::from_conf(api_config),
        table_name: config.table_name,
    };
    let clients = &clients;

    run(service_fn(move |event: LambdaEvent<Event>| async move {
        function_handler(event, clients).await
    }))
    .await
}

async fn function_handler(event: LambdaEvent<Event>, clients: &Clients) -> Result<(), Error> {
    tracing::info!("DynamoDB Stream event received with {} records", event.payload.records.len());

    // One bad record must not stop the rest of the batch
    for record in &event.payload.records {
        if let Err(e) = process_record(record, clients).await {
            tracing::error!("Failed to process record: {}", e);
        }
    }

    Ok(())
}

async fn process_record(record: &EventRecord, clients: &Clients) -> Result<(), Error> {
    let new_image = serde_json::to_value(&record.change.new_image)?;
    let old_image = serde_json::to_value(&record.change.old_image)?;

    let Some(change) = change_from_images(&record.event_name, &new_image, &old_image)? else {
        return Ok(());
    };

    let delivered = broadcast_change(
        &clients.dynamo,
        &clients.api_gateway,
        &clients.table_name,
        &change,
    )
    .await?;
    tracing::info!("{} {} delivered to {} connections", record.event_name, change_id(&change), delivered);

    Ok(())
}

fn change_id(change: &UserChange) -> &str {
    match change {
        UserChange::Upserted { user } => &user.id,
        UserChange::Removed { id } => id,
    }
}

fn pk_of(image: &Value) -> Option<&str> {
    image.get("PK")?.get("S")?.as_str()
}

fn is_empty_image(image: &Value) -> bool {
    image.as_object().map_or(true, |m| m.is_empty())
}

/// Turn a stream record into the push message for dashboards.
///
/// Records that aren't users (connections, anything else in the table)
/// yield `None`.
fn change_from_images(
    event_name: &str,
    new_image: &Value,
    old_image: &Value,
) -> Result<Option<UserChange>, StoreError> {
    // REMOVE carries only the old image
    let image = if is_empty_image(new_image) { old_image } else { new_image };
    let Some(id) = pk_of(image).and_then(id_from_pk) else {
        return Ok(None);
    };

    match event_name {
        "INSERT" | "MODIFY" => Ok(Some(UserChange::Upserted {
            user: user_from_stream_image(new_image)?,
        })),
        "REMOVE" => Ok(Some(UserChange::Removed { id: id.to_string() })),
        other => {
            tracing::debug!("Skipping stream event {}", other);
            Ok(None)
        }
    }
}
