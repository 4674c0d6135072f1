//! User sign-up and lookup backed by Supabase.
//!
//! # Routes
//! - `POST /users/`: register through Supabase Auth (`/auth/v1/signup`), then
//!   insert a profile row into the `users` table
//! - `GET /users/{user_id}`: fetch one row from the `users` table
//!
//! Both routes answer 500 until `SUPABASE_URL` and `SUPABASE_ANON_KEY` are set.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::GatewayConfig;
use crate::gateway::handlers::ErrorDetail;
use crate::gateway::GatewayState;
use crate::observability::metrics;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_UPSTREAM_BODY: usize = 1024 * 1024;

/// Supabase project endpoint and key.
#[derive(Debug, Clone)]
pub struct Supabase {
    base: Url,
    anon_key: String,
}

impl Supabase {
    /// `None` when either setting is missing or the URL does not parse.
    pub fn from_config(config: &GatewayConfig) -> Option<Self> {
        let (url, key) = match (&config.supabase_url, &config.supabase_anon_key) {
            (Some(url), Some(key)) => (url, key),
            _ => return None,
        };
        match Url::parse(url) {
            Ok(base) => Some(Self {
                base,
                anon_key: key.clone(),
            }),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Invalid Supabase URL, /users will fail");
                None
            }
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path)
    }

    fn request(&self, method: Method, url: &Url) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(url.as_str())
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.anon_key))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserCreate {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedUser {
    pub id: String,
    pub email: String,
}

pub async fn create_user(
    State(state): State<GatewayState>,
    Json(user): Json<UserCreate>,
) -> Response {
    let Some(supabase) = state.supabase.as_ref() else {
        return not_configured("/users");
    };
    if user.password.chars().count() < MIN_PASSWORD_LEN {
        return error(
            "/users",
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        );
    }

    let body = serde_json::json!({ "email": user.email, "password": user.password });
    let (status, reply) = match call(&state, supabase, Method::POST, "auth/v1/signup", Some(body)).await {
        Ok(outcome) => outcome,
        Err(response) => return response,
    };
    if !status.is_success() {
        let detail = upstream_message(&reply)
            .unwrap_or_else(|| "An unknown error occurred during sign up".to_string());
        tracing::info!(status = %status, detail = %detail, "Sign up rejected");
        return error("/users", StatusCode::BAD_REQUEST, detail);
    }

    // A confirmed sign-up nests the user next to its session.
    let account = reply.get("user").unwrap_or(&reply);
    let created = match (field(account, "id"), field(account, "email")) {
        (Some(id), Some(email)) => CreatedUser { id, email },
        _ => {
            return error(
                "/users",
                StatusCode::BAD_GATEWAY,
                "sign up response carried no user".to_string(),
            )
        }
    };

    let profile = serde_json::json!({ "id": created.id, "email": created.email });
    match call(&state, supabase, Method::POST, "rest/v1/users", Some(profile)).await {
        Ok((status, _)) if status.is_success() => {}
        Ok((status, reply)) => tracing::warn!(
            user_id = %created.id,
            status = %status,
            detail = %upstream_message(&reply).unwrap_or_default(),
            "Profile row not inserted"
        ),
        Err(_) => tracing::warn!(user_id = %created.id, "Profile row not inserted"),
    }

    metrics::record_request("/users", 201);
    (StatusCode::CREATED, Json(created)).into_response()
}

pub async fn get_user(State(state): State<GatewayState>, Path(user_id): Path<String>) -> Response {
    let Some(supabase) = state.supabase.as_ref() else {
        return not_configured("/users/{user_id}");
    };

    let mut url = match supabase.endpoint("rest/v1/users") {
        Ok(url) => url,
        Err(e) => return error("/users/{user_id}", StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    url.query_pairs_mut()
        .append_pair("select", "*")
        .append_pair("id", &format!("eq.{user_id}"));

    let request = supabase
        .request(Method::GET, &url)
        // Single-object response; zero or several rows is an error.
        .header(header::ACCEPT, "application/vnd.pgrst.object+json")
        .body(Body::empty());
    let (status, reply) = match send(&state, request).await {
        Ok(outcome) => outcome,
        Err(response) => return response,
    };

    if !status.is_success() {
        let detail = upstream_message(&reply).unwrap_or_else(|| format!("user {user_id} not found"));
        return error("/users/{user_id}", StatusCode::NOT_FOUND, detail);
    }
    metrics::record_request("/users/{user_id}", 200);
    Json(reply).into_response()
}

/// JSON request against `path` under the project URL.
async fn call(
    state: &GatewayState,
    supabase: &Supabase,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Value), Response> {
    let url = supabase
        .endpoint(path)
        .map_err(|e| error("/users", StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
    let mut request = supabase
        .request(method, &url)
        .header(header::CONTENT_TYPE, "application/json");
    if path.starts_with("rest/") {
        request = request.header("prefer", "return=minimal");
    }
    send(state, request.body(body)).await
}

async fn send(
    state: &GatewayState,
    request: Result<Request<Body>, axum::http::Error>,
) -> Result<(StatusCode, Value), Response> {
    let request = request
        .map_err(|e| error("/users", StatusCode::INTERNAL_SERVER_ERROR, format!("invalid upstream request: {e}")))?;
    let uri = request.uri().clone();

    let response = state.client.request(request).await.map_err(|e| {
        tracing::error!(upstream = %uri, error = %e, "Supabase request failed");
        error("/users", StatusCode::BAD_GATEWAY, "upstream request failed".to_string())
    })?;
    let status = response.status();
    let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_UPSTREAM_BODY)
        .await
        .map_err(|e| {
            tracing::error!(upstream = %uri, error = %e, "Failed to read Supabase response");
            error("/users", StatusCode::BAD_GATEWAY, "upstream response unreadable".to_string())
        })?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    Ok((status, value))
}

/// Error text from an Auth or PostgREST error body.
fn upstream_message(body: &Value) -> Option<String> {
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn not_configured(route: &'static str) -> Response {
    error(
        route,
        StatusCode::INTERNAL_SERVER_ERROR,
        "SUPABASE_URL and SUPABASE_ANON_KEY must be set in the environment.".to_string(),
    )
}

fn error(route: &'static str, status: StatusCode, detail: String) -> Response {
    metrics::record_request(route, status.as_u16());
    (status, Json(ErrorDetail { detail })).into_response()
}
