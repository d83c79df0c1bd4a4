use crate::types::CallerIdentity;
use lambda_http::aws_lambda_events::apigw::ApiGatewayRequestAuthorizer;
use lambda_http::{Request, RequestExt};

pub const USER_ID_HEADER: &str = "X-User-Id";

/// Resolve the authenticated caller of a request.
///
/// API Gateway validates the token before the Lambda runs and passes the
/// result in the request context: JWT claims on HTTP routes, the Lambda
/// authorizer's context on WebSocket routes. The `X-User-Id` header is
/// honoured only when `allow_header` is set for local development. There is
/// no fallback principal.
pub fn caller_identity(event: &Request, allow_header: bool) -> Option<CallerIdentity> {
    if allow_header {
        let from_header = event
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(uid) = from_header {
            tracing::debug!("Using {} header override: {}", USER_ID_HEADER, uid);
            return Some(CallerIdentity::new(uid));
        }
    }

    event
        .request_context_ref()
        .and_then(|ctx| ctx.authorizer())
        .and_then(authorized_subject)
        .map(CallerIdentity::new)
}

/// The Lambda authorizer puts the Cognito `sub` in its context and uses it
/// as `principalId`.
fn authorized_subject(authorizer: &ApiGatewayRequestAuthorizer) -> Option<String> {
    let from_jwt = authorizer
        .jwt
        .as_ref()
        .and_then(|jwt| jwt.claims.get("sub"))
        .map(|s| s.as_str());
    let from_lambda = || {
        ["sub", "principalId"]
            .iter()
            .find_map(|key| authorizer.fields.get(*key).and_then(|v| v.as_str()))
    };

    from_jwt
        .or_else(from_lambda)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
