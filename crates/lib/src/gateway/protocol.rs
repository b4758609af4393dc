//! Webhook wire format: the envelope the platform POSTs and the acknowledgment we answer with.

use crate::channels::{EventType, InboundEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Webhook POST body. Every field is optional on the wire and may be null or of an unexpected
/// type; such values degrade to an unknown event or an empty business id instead of a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub event: Value,
    /// Unix seconds; numbers and numeric strings are accepted.
    #[serde(default)]
    pub create_time: Value,
    /// JSON-encoded string. An inline object is tolerated and re-encoded.
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub user_openid: Value,
}

impl WebhookEnvelope {
    /// The event name exactly as delivered, when it is a string.
    pub fn event_name(&self) -> Option<&str> {
        self.event.as_str()
    }
}

/// Text of a string-like field: strings as-is, numbers rendered, anything else empty.
fn text_of(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn unix_seconds(v: &Value) -> i64 {
    match v {
        Value::Number(n) => n.as_i64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    }
}

impl From<WebhookEnvelope> for InboundEvent {
    fn from(envelope: WebhookEnvelope) -> Self {
        let raw_content = match envelope.content {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        InboundEvent {
            event_type: EventType::parse(&text_of(envelope.event)),
            create_time: unix_seconds(&envelope.create_time),
            raw_content,
            business_open_id: text_of(envelope.user_openid),
        }
    }
}

/// Fixed-shape webhook acknowledgment. Always sent with HTTP 200 so the platform does not retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl WebhookAck {
    /// Successful receipt, echoing the delivered event name (omitted when it was not a string).
    pub fn received(event: Option<&str>) -> Self {
        Self {
            success: true,
            message: Some("Webhook received".to_string()),
            error: None,
            event: event.map(str::to_string),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            event: None,
        }
    }
}
