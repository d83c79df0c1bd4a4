pub mod access;
pub mod auth;
pub mod client;
pub mod config;
pub mod cycle;
pub mod demo;
pub mod dynamo;
pub mod error;
pub mod identity;
pub mod live;
pub mod signin;
pub mod sockets;
pub mod store;
pub mod types;
pub mod users;

use aws_sdk_dynamodb::Client as DynamoClient;
use config::Config;
use identity::IdentityProvisioner;
use std::sync::Arc;
use store::UserStore;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn UserStore>,
    pub provisioner: Arc<dyn IdentityProvisioner>,
    /// Present when deployed; connection bookkeeping needs the raw client.
    pub dynamo_client: Option<DynamoClient>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn UserStore>,
        provisioner: Arc<dyn IdentityProvisioner>,
        dynamo_client: Option<DynamoClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            provisioner,
            dynamo_client,
        })
    }
}
