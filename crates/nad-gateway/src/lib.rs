//! Client for the remote task gateway: one JSON action endpoint plus a health
//! check.

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_AGENT_ID: &str = "module";

pub const ACTION_PLAN: &str = "plan";
pub const ACTION_GENERATE: &str = "generate";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gateway returned {status}: {message}")]
    Rejected { status: StatusCode, message: String },
    #[error("gateway health check failed: {0}")]
    Unhealthy(StatusCode),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GatewayAuth {
    #[default]
    None,
    Bearer(String),
    ApiKey(String),
}

impl GatewayAuth {
    /// A bearer token wins over an API key.
    pub fn from_parts(token: Option<String>, api_key: Option<String>) -> Self {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        match (non_empty(token), non_empty(api_key)) {
            (Some(token), _) => GatewayAuth::Bearer(token),
            (None, Some(key)) => GatewayAuth::ApiKey(key),
            (None, None) => GatewayAuth::None,
        }
    }
}

#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    agent_id: &'a str,
    action: &'a str,
    params: Value,
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    base_url: String,
    auth: GatewayAuth,
    http: reqwest::Client,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>, auth: GatewayAuth) -> Result<Self, GatewayError> {
        Self::with_timeout(base_url, auth, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        auth: GatewayAuth,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Posts one action. Returns the body's `reply` field, or the whole body
    /// when there is none.
    pub async fn call(&self, action: &str, params: Value, agent_id: Option<&str>) -> Result<Value, GatewayError> {
        let url = format!("{}/api/gateway", self.base_url);
        let body = GatewayRequest {
            agent_id: agent_id.unwrap_or(DEFAULT_AGENT_ID),
            action,
            params,
        };
        let mut request = self.http.post(&url).json(&body);
        request = match &self.auth {
            GatewayAuth::Bearer(token) => request.bearer_auth(token),
            GatewayAuth::ApiKey(key) => request.header("X-API-Key", key),
            GatewayAuth::None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text).unwrap_or_else(|_| json!({}));
        debug!(event = "gateway_call", action, status = status.as_u16());

        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "Gateway error".to_string());
            warn!(event = "gateway_rejected", action, status = status.as_u16(), message = %message);
            return Err(GatewayError::Rejected { status, message });
        }

        Ok(match body {
            Value::Object(mut map) => match map.remove("reply") {
                Some(reply) if !reply.is_null() => reply,
                _ => Value::Object(map),
            },
            other => other,
        })
    }

    pub async fn create_task(
        &self,
        title: &str,
        input: &str,
        attachments: Option<Vec<Value>>,
    ) -> Result<Value, GatewayError> {
        let mut params = json!({ "title": title, "objective": input });
        if let Some(attachments) = attachments {
            params["attachments"] = normalize_attachments(attachments);
        }
        self.call(ACTION_PLAN, params, None).await
    }

    pub async fn send_task_message(
        &self,
        thread_id: &str,
        message: &str,
        attachments: Option<Vec<Value>>,
    ) -> Result<Value, GatewayError> {
        let mut params = json!({ "threadId": thread_id, "message": message });
        if let Some(attachments) = attachments {
            params["attachments"] = normalize_attachments(attachments);
        }
        self.call(ACTION_GENERATE, params, None).await
    }

    pub async fn health(&self) -> Result<Value, GatewayError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Unhealthy(status));
        }
        Ok(response.json().await?)
    }
}

/// Attachment contents travel as strings; anything else is JSON-encoded.
pub fn normalize_attachments(attachments: Vec<Value>) -> Value {
    Value::Array(
        attachments
            .into_iter()
            .map(|mut attachment| {
                if let Some(content) = attachment.get_mut("content") {
                    if !content.is_string() && !content.is_null() {
                        *content = Value::String(content.to_string());
                    }
                }
                attachment
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_takes_precedence_over_api_key() {
        assert_eq!(
            GatewayAuth::from_parts(Some("t".into()), Some("k".into())),
            GatewayAuth::Bearer("t".into())
        );
        assert_eq!(
            GatewayAuth::from_parts(Some(String::new()), Some("k".into())),
            GatewayAuth::ApiKey("k".into())
        );
        assert_eq!(GatewayAuth::from_parts(None, None), GatewayAuth::None);
    }

    #[test]
    fn structured_attachment_content_is_stringified() {
        let normalized = normalize_attachments(vec![
            json!({"name": "a.txt", "content": "plain"}),
            json!({"name": "b.json", "content": {"k": [1, 2]}}),
            json!({"name": "c.bin", "content_base64": "AAE="}),
        ]);
        assert_eq!(normalized[0]["content"], "plain");
        assert_eq!(normalized[1]["content"], r#"{"k":[1,2]}"#);
        assert!(normalized[2].get("content").is_none());
    }
}
