//! Typed RPC façade the dashboard uses to call the functions.
//!
//! The façade authorizes nothing itself; every call is checked server-side.
//! `next_role` / `next_status` only predict a value for optimistic display.

use crate::config::Config;
use crate::error::{ErrorEnvelope, ErrorStatus};
use crate::types::{
    AccessUpdate, CallableRequest, CallableResponse, CreateUserRequest, CreateUserResponse,
    ListUsersResponse, MessageResponse, ProfileUpdate, UserRole, UserStatus,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{status:?}: {message}")]
    Function { status: ErrorStatus, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
}

impl ClientError {
    pub fn status(&self) -> Option<ErrorStatus> {
        match self {
            ClientError::Function { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub struct DashboardClient {
    http: Client,
    base_url: String,
    id_token: String,
    config: Config,
}

impl DashboardClient {
    pub fn new(base_url: impl Into<String>, id_token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            id_token: id_token.into(),
            config: Config::default(),
        }
    }

    /// Use a non-default transition table for the cycling helpers.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub async fn create_user(&self, fields: &CreateUserRequest) -> Result<CreateUserResponse, ClientError> {
        self.call("createUser", fields).await
    }

    /// Role/status change; goes through `manageUserRole`.
    pub async fn update_user(&self, user_id: &str, update: &AccessUpdate) -> Result<MessageResponse, ClientError> {
        self.call("manageUserRole", &json!({ "targetUserId": user_id, "updates": update }))
            .await
    }

    pub async fn edit_user(&self, user_id: &str, update: &ProfileUpdate) -> Result<MessageResponse, ClientError> {
        self.call("editUser", &json!({ "targetUserId": user_id, "updates": update }))
            .await
    }

    pub async fn list_users(&self) -> Result<ListUsersResponse, ClientError> {
        self.call("listUsers", &json!({})).await
    }

    pub fn next_role(&self, current: UserRole) -> UserRole {
        self.config.next_role(current)
    }

    pub fn next_status(&self, current: UserStatus) -> UserStatus {
        self.config.next_status(current)
    }

    async fn call<Req, Resp>(&self, function: &str, data: &Req) -> Result<Resp, ClientError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, function);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.id_token)
            .json(&CallableRequest { data })
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        decode_response(status, &body)
    }
}

/// Map a callable response body to its result or its error.
pub fn decode_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ClientError> {
    if (200..300).contains(&status) {
        if let Ok(resp) = serde_json::from_str::<CallableResponse<T>>(body) {
            return Ok(resp.result);
        }
    } else if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        tracing::debug!("Function returned {:?}: {}", envelope.error.status, envelope.error.message);
        return Err(ClientError::Function {
            status: envelope.error.status,
            message: envelope.error.message,
        });
    }
    Err(ClientError::UnexpectedResponse {
        status,
        body: body.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_result_envelope() {
        let resp: MessageResponse =
            decode_response(200, r#"{"result":{"message":"User updated successfully."}}"#).unwrap();
        assert_eq!(resp.message, "User updated successfully.");
    }

    #[test]
    fn decodes_error_envelope() {
        let err = decode_response::<MessageResponse>(
            403,
            r#"{"error":{"status":"PERMISSION_DENIED","message":"Only admins can manage users."}}"#,
        )
        .unwrap_err();
        assert_eq!(err.status(), Some(ErrorStatus::PermissionDenied));
    }

    #[test]
    fn garbage_is_unexpected() {
        let err = decode_response::<MessageResponse>(502, "Bad Gateway").unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedResponse { status: 502, .. }));
        let err = decode_response::<MessageResponse>(200, "{}").unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedResponse { status: 200, .. }));
    }

    #[test]
    fn cycling_helpers_follow_configured_table() {
        let client = DashboardClient::new("http://localhost:9000/", "token");
        assert_eq!(client.base_url, "http://localhost:9000");
        assert_eq!(client.next_role(UserRole::Admin), UserRole::Student);
        assert_eq!(client.next_status(UserStatus::Pending), UserStatus::Active);
    }
}
