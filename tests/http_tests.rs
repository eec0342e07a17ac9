mod common;

use std::time::Duration;

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use lapidary::common::ApiError;
use lapidary::http::{AuthContext, Credential, HttpClient};
use serde_json::{json, Value};

/// Loopback backend speaking the `{data}` / `{error}` envelope.
async fn spawn_backend() -> String {
    let app = Router::new()
        .route(
            "/api/diamonds/count",
            get(|| async { Json(json!({"data": 3})) }),
        )
        .route(
            "/api/admins/:id",
            get(|Path(id): Path<i64>| async move { Json(json!({"data": id == 7})) }),
        )
        .route(
            "/api/echo-auth",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                Json(json!({"data": auth}))
            }),
        )
        .route(
            "/api/teapot",
            get(|| async {
                (
                    StatusCode::IM_A_TEAPOT,
                    Json(json!({"error": "short and stout"})),
                )
            }),
        )
        .route(
            "/api/plain-error",
            get(|| async { (StatusCode::BAD_GATEWAY, "oops") }),
        )
        .route("/api/garbled", get(|| async { "not json at all" }))
        .route(
            "/api/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"data": 1}))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve backend");
    });
    format!("http://{}", addr)
}

fn client(base_url: &str) -> (HttpClient, AuthContext) {
    let auth = AuthContext::new();
    let config = common::test_config(base_url);
    let http = HttpClient::new(&config, auth.clone()).expect("client builds");
    (http, auth)
}

#[tokio::test]
async fn success_envelope_is_unwrapped() {
    let base = spawn_backend().await;
    let (http, _auth) = client(&base);

    let count: u64 = http.get("/api/diamonds/count").await.unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn error_envelope_message_is_surfaced() {
    let base = spawn_backend().await;
    let (http, _auth) = client(&base);

    let result: Result<Value, ApiError> = http.get("/api/teapot").await;
    assert_eq!(
        result,
        Err(ApiError::Backend {
            status: 418,
            message: "short and stout".to_string(),
        })
    );
}

#[tokio::test]
async fn non_json_error_body_falls_back_to_status_reason() {
    let base = spawn_backend().await;
    let (http, _auth) = client(&base);

    let result: Result<Value, ApiError> = http.get("/api/plain-error").await;
    match result {
        Err(ApiError::Backend { status: 502, message }) => {
            assert_eq!(message, "Bad Gateway");
        }
        other => panic!("expected backend error, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_error() {
    let base = spawn_backend().await;
    let (http, _auth) = client(&base);

    let result: Result<Value, ApiError> = http.get("/api/garbled").await;
    assert!(matches!(result, Err(ApiError::Decode(_))));
}

#[tokio::test]
async fn bearer_header_follows_the_credential() {
    let base = spawn_backend().await;
    let (http, auth) = client(&base);

    // No credential: no header.
    let echoed: String = http.get("/api/echo-auth").await.unwrap();
    assert_eq!(echoed, "");

    auth.set(Credential {
        bearer: "tok-123".to_string(),
        user_id: 7,
    });
    let echoed: String = http.get("/api/echo-auth").await.unwrap();
    assert_eq!(echoed, "Bearer tok-123");

    // Sign-out takes effect on the very next request.
    auth.clear();
    let echoed: String = http.get("/api/echo-auth").await.unwrap();
    assert_eq!(echoed, "");
}

#[tokio::test]
async fn slow_responses_fail_as_network_errors() {
    let base = spawn_backend().await;
    let (http, _auth) = client(&base);

    let result: Result<Value, ApiError> = http.get("/api/slow").await;
    match result {
        Err(ApiError::Network(message)) => {
            assert!(message.contains("timed out"), "got: {message}")
        }
        other => panic!("expected a network error, got {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    // Nothing listens here.
    let (http, _auth) = client("http://127.0.0.1:9");

    let result: Result<Value, ApiError> = http.get("/api/diamonds/count").await;
    assert!(matches!(result, Err(ApiError::Network(_))));
}

#[tokio::test]
async fn admin_lookup_reads_the_allowlist() {
    let base = spawn_backend().await;
    let (http, _auth) = client(&base);

    assert!(http.is_admin(7).await.unwrap());
    assert!(!http.is_admin(8).await.unwrap());
}
