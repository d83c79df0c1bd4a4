use crate::error::ProvisionError;
use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::error::DisplayErrorContext;
use aws_sdk_cognitoidentityprovider::types::{AttributeType, DeliveryMediumType};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;

/// Creates the sign-in principal for a new member and returns its stable
/// identifier, which becomes the user record's `id`.
#[async_trait]
pub trait IdentityProvisioner: Send + Sync {
    async fn provision(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<String, ProvisionError>;
}

/// Cognito user pool: `AdminCreateUser`, id = the pool's `sub`.
pub struct CognitoProvisioner {
    client: CognitoClient,
    user_pool_id: String,
}

impl CognitoProvisioner {
    pub fn new(client: CognitoClient, user_pool_id: impl Into<String>) -> Self {
        Self {
            client,
            user_pool_id: user_pool_id.into(),
        }
    }
}

fn attribute(name: &str, value: &str) -> Result<AttributeType, ProvisionError> {
    AttributeType::builder()
        .name(name)
        .value(value)
        .build()
        .map_err(|e| ProvisionError::Provider(e.to_string()))
}

#[async_trait]
impl IdentityProvisioner for CognitoProvisioner {
    async fn provision(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<String, ProvisionError> {
        let output = self
            .client
            .admin_create_user()
            .user_pool_id(&self.user_pool_id)
            .username(email)
            .user_attributes(attribute("email", email)?)
            .user_attributes(attribute("email_verified", "true")?)
            .user_attributes(attribute("given_name", first_name)?)
            .user_attributes(attribute("family_name", last_name)?)
            .desired_delivery_mediums(DeliveryMediumType::Email)
            .send()
            .await
            .map_err(|e| ProvisionError::Provider(DisplayErrorContext(&e).to_string()))?;

        let sub = output
            .user()
            .map(|user| user.attributes())
            .unwrap_or_default()
            .iter()
            .find(|attr| attr.name() == "sub")
            .and_then(|attr| attr.value())
            .map(|s| s.to_string());

        match sub {
            Some(sub) => {
                tracing::info!("Provisioned Cognito user {} for {}", sub, email);
                Ok(sub)
            }
            None => Err(ProvisionError::MissingSubject(email.to_string())),
        }
    }
}

/// No identity provider configured (local runs): ids are random UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalProvisioner;

#[async_trait]
impl IdentityProvisioner for LocalProvisioner {
    async fn provision(
        &self,
        email: &str,
        _first_name: &str,
        _last_name: &str,
    ) -> Result<String, ProvisionError> {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::debug!("Assigned local id {} to {}", id, email);
        Ok(id)
    }
}
