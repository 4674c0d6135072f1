//! Handlers for the gateway's own routes: liveness, text submission and the
//! upstream ping proxy.

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::gateway::GatewayState;
use crate::observability::metrics;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootMessage {
    pub message: String,
}

/// A text submission from the frontend form.
#[derive(Debug, Serialize, Deserialize)]
pub struct TextData {
    pub text: String,
    pub timestamp: String,
    pub source: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessTextResponse {
    pub status: String,
    pub message: String,
    pub received_text: String,
    pub processed_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

pub async fn read_root() -> Json<RootMessage> {
    metrics::record_request("/", 200);
    Json(RootMessage {
        message: "Gateway is working".to_string(),
    })
}

pub async fn process_text(Json(data): Json<TextData>) -> Json<ProcessTextResponse> {
    let processed_at = chrono::Local::now().to_rfc3339();

    tracing::info!(
        text = %data.text,
        timestamp = %data.timestamp,
        source = %data.source,
        processed_at = %processed_at,
        "Text received from frontend"
    );
    metrics::record_request("/process-text", 200);

    Json(ProcessTextResponse {
        status: "success".to_string(),
        message: "데이터가 성공적으로 처리되었습니다".to_string(),
        received_text: data.text,
        processed_at,
    })
}

/// Forward to the upstream ping endpoint and return its response verbatim.
pub async fn proxy_ping(State(state): State<GatewayState>) -> Response {
    let Some(uri) = state.ping_uri.clone() else {
        return bad_gateway("upstream ping URL is not configured correctly");
    };

    let request = match Request::builder()
        .method(Method::GET)
        .uri(uri.clone())
        .body(Body::empty())
    {
        Ok(request) => request,
        Err(e) => return bad_gateway(&format!("invalid upstream request: {e}")),
    };

    match state.client.request(request).await {
        Ok(response) if response.status().is_success() => {
            metrics::record_request("/service/ping", response.status().as_u16());
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Ok(response) => {
            tracing::warn!(upstream = %uri, status = %response.status(), "Upstream ping failed");
            bad_gateway(&format!("upstream returned {}", response.status()))
        }
        Err(e) => {
            tracing::error!(upstream = %uri, error = %e, "Upstream request failed");
            bad_gateway("upstream request failed")
        }
    }
}

fn bad_gateway(detail: &str) -> Response {
    metrics::record_request("/service/ping", 502);
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorDetail {
            detail: detail.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::gateway::build_router;
    use tower::ServiceExt;

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_read_root() {
        let app = build_router(&GatewayConfig::default());
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body: RootMessage = body_json(response).await;
        assert_eq!(body.message, "Gateway is working");
    }

    #[tokio::test]
    async fn test_process_text_echoes_text() {
        let app = build_router(&GatewayConfig::default());
        let payload = serde_json::json!({
            "text": "hello",
            "timestamp": "2024-01-01T00:00:00Z",
            "source": "form",
        });
        let response = app
            .oneshot(
                Request::post("/process-text")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: ProcessTextResponse = body_json(response).await;
        assert_eq!(body.status, "success");
        assert_eq!(body.message, "데이터가 성공적으로 처리되었습니다");
        assert_eq!(body.received_text, "hello");
        assert!(chrono::DateTime::parse_from_rfc3339(&body.processed_at).is_ok());
    }

    #[tokio::test]
    async fn test_process_text_rejects_missing_fields() {
        let app = build_router(&GatewayConfig::default());
        let response = app
            .oneshot(
                Request::post("/process-text")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"text":"hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_ping_unreachable_upstream_is_bad_gateway() {
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();
        drop(holder);

        let config = GatewayConfig {
            service_ping_url: format!("http://127.0.0.1:{port}/ping"),
            ..GatewayConfig::default()
        };
        let response = build_router(&config)
            .oneshot(Request::get("/service/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
