//! Chat API client: session-based AI backend (`POST /create-chat`, `POST /send-message`).

use crate::llm::AiGateway;
use crate::routing::AiSessionId;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("ai request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("ai request timed out")]
    Timeout,
    #[error("ai api error: {status} {body}")]
    Status { status: u16, body: String },
    #[error("ai response could not be decoded: {0}")]
    Decode(String),
    #[error("ai response did not contain a session id")]
    MissingSessionId,
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Request(e)
        }
    }
}

/// Client for the chat API.
#[derive(Clone)]
pub struct ChatApiClient {
    base_url: String,
    api_key: Option<String>,
    degraded_reply: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CreateChatRequest<'a> {
    model: &'a str,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
    chat_id: &'a str,
}

impl ChatApiClient {
    /// Build a client. `degraded_reply` is returned by `send_message` when the backend answers
    /// in neither known reply shape.
    pub fn new(
        base_url: Option<String>,
        api_key: Option<String>,
        degraded_reply: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, GatewayError> {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(GatewayError::Request)?;
        Ok(Self {
            base_url,
            api_key,
            degraded_reply: degraded_reply.into(),
            client,
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let req = self.client.post(url);
        match self.api_key {
            Some(ref key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn error_for_status(res: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        if res.status().is_success() {
            return Ok(res);
        }
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        Err(GatewayError::Status { status, body })
    }
}

/// Session id from a create-chat response. Accepts a non-empty string or a number.
fn session_id_from(body: &Value) -> Option<AiSessionId> {
    match body.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reply text from a send-message response: `response.content` first, then a bare string `response`.
/// Blank text counts as no reply.
fn reply_from(body: &Value) -> Option<String> {
    let response = body.get("response")?;
    response
        .get("content")
        .and_then(Value::as_str)
        .or_else(|| response.as_str())
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

#[async_trait]
impl AiGateway for ChatApiClient {
    /// POST /create-chat — open a new chat session for `model`.
    async fn create_session(&self, model: &str) -> Result<AiSessionId, GatewayError> {
        let res = self
            .post("create-chat")
            .json(&CreateChatRequest { model })
            .send()
            .await?;
        let res = Self::error_for_status(res).await?;
        let text = res.text().await?;
        let body: Value =
            serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))?;
        session_id_from(&body).ok_or(GatewayError::MissingSessionId)
    }

    /// POST /send-message — send user text to a session and return the reply text.
    async fn send_message(&self, session_id: &str, text: &str) -> Result<String, GatewayError> {
        let res = self
            .post("send-message")
            .json(&SendMessageRequest {
                content: text,
                chat_id: session_id,
            })
            .send()
            .await?;
        let res = Self::error_for_status(res).await?;
        let raw = res.text().await?;
        let body: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);
        match reply_from(&body) {
            Some(reply) => Ok(reply),
            None => {
                log::warn!(
                    "ai: send-message response for session {} had no reply text, using degraded reply",
                    session_id
                );
                Ok(self.degraded_reply.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DEGRADED: &str = "assistant unavailable";

    fn client_for(server: &MockServer) -> ChatApiClient {
        ChatApiClient::new(Some(server.uri()), None, DEGRADED, None).unwrap()
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let c = ChatApiClient::new(Some("http://ai.local/".into()), None, DEGRADED, None).unwrap();
        assert_eq!(c.base_url, "http://ai.local");
        let c = ChatApiClient::new(None, None, DEGRADED, None).unwrap();
        assert_eq!(c.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn reply_prefers_nested_content() {
        assert_eq!(
            reply_from(&json!({ "response": { "content": "X" } })).as_deref(),
            Some("X")
        );
        assert_eq!(reply_from(&json!({ "response": "Y" })).as_deref(), Some("Y"));
        assert_eq!(reply_from(&json!({ "response": { "text": "Z" } })), None);
        assert_eq!(reply_from(&json!({ "content": "W" })), None);
        assert_eq!(reply_from(&Value::Null), None);
    }

    #[test]
    fn blank_reply_is_no_reply() {
        assert_eq!(reply_from(&json!({ "response": { "content": "" } })), None);
        assert_eq!(reply_from(&json!({ "response": "  \n" })), None);
    }

    #[test]
    fn session_id_accepts_string_or_number() {
        assert_eq!(session_id_from(&json!({ "id": "abc" })).as_deref(), Some("abc"));
        assert_eq!(session_id_from(&json!({ "id": 42 })).as_deref(), Some("42"));
        assert_eq!(session_id_from(&json!({ "id": "" })), None);
        assert_eq!(session_id_from(&json!({ "id": null })), None);
        assert_eq!(session_id_from(&json!({})), None);
    }

    #[tokio::test]
    async fn create_session_posts_model_and_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create-chat"))
            .and(body_json(json!({ "model": "gpt-x" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "chat-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let id = client_for(&server).create_session("gpt-x").await.unwrap();
        assert_eq!(id, "chat-1");
    }

    #[tokio::test]
    async fn create_session_sends_bearer_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create-chat"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 7 })))
            .mount(&server)
            .await;

        let client =
            ChatApiClient::new(Some(server.uri()), Some("secret".into()), DEGRADED, None).unwrap();
        assert_eq!(client.create_session("m").await.unwrap(), "7");
    }

    #[tokio::test]
    async fn create_session_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create-chat"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let err = client_for(&server).create_session("m").await.unwrap_err();
        assert!(matches!(err, GatewayError::Status { status: 503, .. }));
        assert!(err.to_string().contains("down"));
    }

    #[tokio::test]
    async fn create_session_without_id_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create-chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&server)
            .await;

        let err = client_for(&server).create_session("m").await.unwrap_err();
        assert!(matches!(err, GatewayError::MissingSessionId));
    }

    #[tokio::test]
    async fn send_message_posts_content_and_chat_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send-message"))
            .and(body_json(json!({ "content": "hello", "chat_id": "chat-1" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "response": { "content": "X" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server).send_message("chat-1", "hello").await.unwrap();
        assert_eq!(reply, "X");
    }

    #[tokio::test]
    async fn send_message_flat_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send-message"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "Y" })))
            .mount(&server)
            .await;

        let reply = client_for(&server).send_message("chat-1", "hi").await.unwrap();
        assert_eq!(reply, "Y");
    }

    #[tokio::test]
    async fn send_message_unknown_shape_is_degraded_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send-message"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let reply = client_for(&server).send_message("chat-1", "hi").await.unwrap();
        assert_eq!(reply, DEGRADED);
    }

    #[tokio::test]
    async fn send_message_empty_content_is_degraded_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send-message"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "response": { "content": "" } })),
            )
            .mount(&server)
            .await;

        let reply = client_for(&server).send_message("chat-1", "hi").await.unwrap();
        assert_eq!(reply, DEGRADED);
    }

    #[tokio::test]
    async fn send_message_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send-message"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server).send_message("chat-1", "hi").await.unwrap_err();
        assert!(matches!(err, GatewayError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send-message"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": "late" }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = ChatApiClient::new(
            Some(server.uri()),
            None,
            DEGRADED,
            Some(Duration::from_millis(50)),
        )
        .unwrap();
        let err = client.send_message("chat-1", "hi").await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout));
    }
}
