use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use nad_gateway::{GatewayAuth, GatewayClient, GatewayError};
use serde_json::{json, Value};
use tokio::net::TcpListener;

async fn gateway(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    match body["action"].as_str() {
        Some("plan") => (
            StatusCode::OK,
            Json(json!({
                "reply": {
                    "echo": body,
                    "authorization": header("authorization"),
                    "apiKey": header("x-api-key"),
                }
            })),
        ),
        Some("generate") => (StatusCode::OK, Json(json!({"threadId": body["params"]["threadId"]}))),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "unknown action"})),
        ),
    }
}

async fn spawn_gateway() -> String {
    let app = Router::new()
        .route("/api/gateway", post(gateway))
        .route("/health", get(|| async { Json(json!({"ok": true})) }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

#[tokio::test]
async fn create_task_posts_plan_with_bearer_token() {
    let base = spawn_gateway().await;
    let client = GatewayClient::new(base, GatewayAuth::Bearer("tok-1".into())).unwrap();

    let reply = client
        .create_task("Report", "Summarise sales", Some(vec![json!({"content": {"rows": 2}})]))
        .await
        .unwrap();

    assert_eq!(reply["authorization"], "Bearer tok-1");
    assert_eq!(reply["apiKey"], Value::Null);
    let echo = &reply["echo"];
    assert_eq!(echo["agent_id"], "module");
    assert_eq!(echo["params"]["title"], "Report");
    assert_eq!(echo["params"]["objective"], "Summarise sales");
    assert_eq!(echo["params"]["attachments"][0]["content"], r#"{"rows":2}"#);
}

#[tokio::test]
async fn api_key_is_sent_without_token() {
    let base = spawn_gateway().await;
    let client = GatewayClient::new(base, GatewayAuth::ApiKey("key-9".into())).unwrap();
    let reply = client.call("plan", json!({}), Some("web")).await.unwrap();
    assert_eq!(reply["apiKey"], "key-9");
    assert_eq!(reply["authorization"], Value::Null);
    assert_eq!(reply["echo"]["agent_id"], "web");
}

#[tokio::test]
async fn body_without_reply_is_returned_whole() {
    let base = spawn_gateway().await;
    let client = GatewayClient::new(base, GatewayAuth::None).unwrap();
    let reply = client.send_task_message("t-7", "hello", None).await.unwrap();
    assert_eq!(reply, json!({"threadId": "t-7"}));
}

#[tokio::test]
async fn rejection_carries_gateway_error_message() {
    let base = spawn_gateway().await;
    let client = GatewayClient::new(base, GatewayAuth::None).unwrap();
    let err = client.call("delete", json!({}), None).await.unwrap_err();
    match err {
        GatewayError::Rejected { status, message } => {
            assert_eq!(status.as_u16(), 400);
            assert_eq!(message, "unknown action");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn health_returns_json() {
    let base = spawn_gateway().await;
    let client = GatewayClient::new(base, GatewayAuth::None).unwrap();
    assert_eq!(client.health().await.unwrap(), json!({"ok": true}));
}
