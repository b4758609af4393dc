//! TikTok Business Messaging channel: send text replies via the business message API.

use crate::channels::sender::MessageSender;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TIKTOK_API_BASE: &str = "https://business-api.tiktok.com";
const SEND_MESSAGE_PATH: &str = "/open_api/v1.3/business/message/send/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("tiktok access token not configured")]
    NotConfigured,
    #[error("tiktok request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("tiktok request timed out")]
    Timeout,
    #[error("tiktok http error: {status} {body}")]
    Status { status: u16, body: String },
    /// Application-level failure: HTTP succeeded but `code` was non-zero.
    #[error("tiktok api error {code}: {message}")]
    Api { code: i64, message: String },
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PlatformError::Timeout
        } else {
            PlatformError::Request(e)
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    business_id: &'a str,
    recipient_type: &'static str,
    recipient: &'a str,
    message_type: &'static str,
    text: TextBody<'a>,
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    request_id: Option<String>,
}

/// TikTok channel connector (outbound only; inbound arrives via the gateway webhook).
pub struct TikTokChannel {
    base_url: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl TikTokChannel {
    pub fn new(
        base_url: Option<String>,
        access_token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, PlatformError> {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| TIKTOK_API_BASE.to_string());
        let client = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(PlatformError::Request)?;
        Ok(Self {
            base_url,
            access_token,
            client,
        })
    }

    pub fn has_token(&self) -> bool {
        self.access_token.is_some()
    }

    /// Send a text message to a conversation via the business message API.
    pub async fn send_text(
        &self,
        business_id: &str,
        conversation_id: &str,
        text: &str,
    ) -> Result<(), PlatformError> {
        let token = self
            .access_token
            .as_ref()
            .ok_or(PlatformError::NotConfigured)?;
        let url = format!("{}{}", self.base_url, SEND_MESSAGE_PATH);
        let body = SendMessageRequest {
            business_id,
            recipient_type: "CONVERSATION",
            recipient: conversation_id,
            message_type: "TEXT",
            text: TextBody { body: text },
        };
        let res = self
            .client
            .post(&url)
            .header("Access-Token", token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(PlatformError::Status { status, body });
        }
        let data: ApiResponse = res.json().await?;
        if data.code != 0 {
            return Err(PlatformError::Api {
                code: data.code,
                message: data.message,
            });
        }
        log::debug!(
            "tiktok: message sent to conversation {} (request {})",
            conversation_id,
            data.request_id.as_deref().unwrap_or("-")
        );
        Ok(())
    }
}

#[async_trait]
impl MessageSender for TikTokChannel {
    async fn send_text(
        &self,
        business_id: &str,
        conversation_id: &str,
        text: &str,
    ) -> Result<(), PlatformError> {
        TikTokChannel::send_text(self, business_id, conversation_id, text).await
    }
}
