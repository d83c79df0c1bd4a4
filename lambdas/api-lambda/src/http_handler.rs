use coachdesk_shared::auth::caller_identity;
use coachdesk_shared::error::FunctionError;
use coachdesk_shared::types::{CallableRequest, CallableResponse};
use coachdesk_shared::{access, users, AppState};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, Response,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Main Lambda handler - routes callable functions
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    tracing::info!("API Lambda invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "POST,OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type,Authorization,X-User-Id")
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    if method != Method::POST {
        return not_found();
    }

    let function = path.trim_matches('/');
    if !matches!(function, "manageUserRole" | "createUser" | "editUser" | "listUsers") {
        return not_found();
    }

    let caller = caller_identity(&event, state.config.allow_user_id_header);

    // A body that isn't a callable envelope becomes empty data; the function
    // still authorizes first and then rejects the missing arguments.
    let data = match serde_json::from_slice::<CallableRequest<Value>>(event.body()) {
        Ok(req) => req.data,
        Err(e) => {
            tracing::warn!("Unreadable request body for {}: {}", function, e);
            Value::Null
        }
    };

    let store = state.store.as_ref();
    match function {
        "manageUserRole" => respond(access::manage_user_role(store, caller.as_ref(), &data).await),
        "createUser" => respond(
            users::create_user(
                store,
                state.provisioner.as_ref(),
                state.config.default_access_days,
                caller.as_ref(),
                data,
            )
            .await,
        ),
        "editUser" => respond(users::edit_user(store, caller.as_ref(), &data).await),
        _ => respond(users::list_users(store, caller.as_ref()).await),
    }
}

fn respond<T: Serialize>(result: Result<T, FunctionError>) -> Result<Response<Body>, Error> {
    match result {
        Ok(result) => Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::to_string(&CallableResponse { result })?.into())
            .map_err(Box::new)?),
        Err(e) => e.into_response(),
    }
}

fn not_found() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::json!({"error": "Not found"}).to_string().into())
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coachdesk_shared::config::Config;
    use coachdesk_shared::identity::LocalProvisioner;
    use coachdesk_shared::store::{MemoryUserStore, UserStore};
    use coachdesk_shared::types::{User, UserRole, UserStatus};
    use serde_json::json;

    fn member(id: &str, role: UserRole) -> User {
        User {
            id: id.to_string(),
            first_name: "Test".to_string(),
            last_name: id.to_string(),
            email: format!("{}@example.com", id),
            role,
            status: UserStatus::Active,
            cohort: None,
            date_joined: Utc::now(),
            expiration_date: None,
        }
    }

    fn state() -> (Arc<AppState>, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::with_users([
            member("admin-a", UserRole::Admin),
            member("student-b", UserRole::Student),
            member("u1", UserRole::Student),
        ]));
        let config = Config {
            allow_user_id_header: true,
            ..Config::default()
        };
        let state = AppState::new(config, store.clone(), Arc::new(LocalProvisioner), None);
        (state, store)
    }

    fn call(function: &str, caller: Option<&str>, data: Value) -> Request {
        let mut builder = lambda_http::http::Request::builder()
            .method("POST")
            .uri(format!("/{}", function))
            .header("Content-Type", "application/json");
        if let Some(uid) = caller {
            builder = builder.header("X-User-Id", uid);
        }
        builder
            .body(Body::from(json!({ "data": data }).to_string()))
            .unwrap()
    }

    fn body_json(response: &Response<Body>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn admin_manages_role() {
        let (state, store) = state();
        let response = function_handler(
            call(
                "manageUserRole",
                Some("admin-a"),
                json!({"targetUserId": "u1", "updates": {"role": "coach", "status": "pending", "extra": "x"}}),
            ),
            state,
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(&response), json!({"result": {"message": "User updated successfully."}}));
        let user = store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.role, UserRole::Coach);
        assert_eq!(user.status, UserStatus::Pending);
    }

    #[tokio::test]
    async fn non_admin_gets_forbidden() {
        let (state, store) = state();
        let response = function_handler(
            call("manageUserRole", Some("student-b"), json!({"targetUserId": "u1", "updates": {"status": "active"}})),
            state,
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(&response)["error"]["status"], "PERMISSION_DENIED");
        assert_eq!(store.get_user("u1").await.unwrap().unwrap().role, UserRole::Student);
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorized() {
        let (state, _) = state();
        let response = function_handler(
            call("manageUserRole", None, json!({"targetUserId": "u1", "updates": {"status": "active"}})),
            state,
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(&response)["error"]["message"],
            "The function must be called while authenticated."
        );
    }

    #[tokio::test]
    async fn header_override_is_off_by_default() {
        let store = Arc::new(MemoryUserStore::with_users([member("admin-a", UserRole::Admin)]));
        let state = AppState::new(Config::default(), store, Arc::new(LocalProvisioner), None);
        let response = function_handler(call("listUsers", Some("admin-a"), json!({})), state)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_argument_for_admin() {
        let (state, _) = state();
        let request = lambda_http::http::Request::builder()
            .method("POST")
            .uri("/manageUserRole")
            .header("X-User-Id", "admin-a")
            .body(Body::from("not json"))
            .unwrap();
        let response = function_handler(request, state).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_then_list() {
        let (state, _) = state();
        let response = function_handler(
            call(
                "createUser",
                Some("admin-a"),
                json!({"firstName": "Nina", "lastName": "Simone", "email": "nina@example.com", "cohort": "jazz"}),
            ),
            Arc::clone(&state),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let id = body_json(&response)["result"]["id"].as_str().unwrap().to_string();

        let response = function_handler(call("listUsers", Some("admin-a"), json!({})), state)
            .await
            .unwrap();
        let users = body_json(&response)["result"]["users"].as_array().unwrap().clone();
        assert_eq!(users.len(), 4);
        assert!(users.iter().any(|u| u["id"] == id.as_str() && u["email"] == "nina@example.com"));
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let (state, _) = state();
        let response = function_handler(call("deleteUser", Some("admin-a"), json!({})), Arc::clone(&state))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let get = lambda_http::http::Request::builder()
            .method("GET")
            .uri("/listUsers")
            .body(Body::Empty)
            .unwrap();
        let response = function_handler(get, state).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn preflight_is_answered() {
        let (state, _) = state();
        let request = lambda_http::http::Request::builder()
            .method("OPTIONS")
            .uri("/manageUserRole")
            .body(Body::Empty)
            .unwrap();
        let response = function_handler(request, state).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
