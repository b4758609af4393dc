//! Inbound webhook events: event type classification and message content parsing.
//!
//! The platform delivers every event as an envelope whose `content` field is itself a
//! JSON-encoded string. Content parsing fails soft: a malformed payload is logged and treated
//! as empty so the event is still acknowledged.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Webhook event type (the envelope's `event` field).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    /// A user sent a message to the business account.
    ReceiveMessage,
    /// The business account sent a message (including our own replies).
    SendMessage,
    /// A message from an EU user; content is withheld by the platform.
    ReceiveMessageEu,
    /// A conversation opened from an ad or a short link.
    Referral,
    /// The user read messages up to a timestamp.
    MarkRead,
    AutoMessageConfigUpdate,
    AutoMessageAuditUpdate,
    HighIntentComment,
    Unknown(String),
}

/// What the relay should do with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// User-originated message: forward to the AI.
    Relay,
    /// Informational only.
    Ignore,
}

impl EventType {
    /// Exact match on the platform's event name; anything else is kept verbatim as `Unknown`.
    pub fn parse(event: &str) -> Self {
        match event {
            "im_receive_msg" => EventType::ReceiveMessage,
            "im_send_msg" => EventType::SendMessage,
            "im_receive_msg_eu" => EventType::ReceiveMessageEu,
            "im_referral_msg" => EventType::Referral,
            "im_mark_read_msg" => EventType::MarkRead,
            "im_auto_message_config_update" => EventType::AutoMessageConfigUpdate,
            "im_auto_message_audit_update" => EventType::AutoMessageAuditUpdate,
            "im_receive_high_intent_comment" => EventType::HighIntentComment,
            other => EventType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventType::ReceiveMessage => "im_receive_msg",
            EventType::SendMessage => "im_send_msg",
            EventType::ReceiveMessageEu => "im_receive_msg_eu",
            EventType::Referral => "im_referral_msg",
            EventType::MarkRead => "im_mark_read_msg",
            EventType::AutoMessageConfigUpdate => "im_auto_message_config_update",
            EventType::AutoMessageAuditUpdate => "im_auto_message_audit_update",
            EventType::HighIntentComment => "im_receive_high_intent_comment",
            EventType::Unknown(s) => s,
        }
    }

    /// Only user-originated messages are relayed. `im_send_msg` echoes our own replies and
    /// must never be relayed back, or the bot would answer itself.
    pub fn route(&self) -> Route {
        match self {
            EventType::ReceiveMessage => Route::Relay,
            _ => Route::Ignore,
        }
    }
}

/// Inbound webhook event, one per delivery.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub event_type: EventType,
    /// Unix seconds.
    pub create_time: i64,
    /// The `content` field as delivered (a JSON-encoded string).
    pub raw_content: String,
    /// Business account open id (`user_openid`).
    pub business_open_id: String,
}

impl InboundEvent {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.create_time, 0)
    }
}

/// Message payload of a content object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MessageContent {
    Text {
        body: String,
    },
    Image {
        media_id: String,
    },
    #[default]
    Other,
}

/// Parsed `content` object.
#[derive(Debug, Clone, Default)]
pub struct InboundContent {
    pub from: Option<String>,
    pub to: Option<String>,
    pub conversation_id: Option<String>,
    pub is_follower: Option<bool>,
    pub message: MessageContent,
    /// Full object, for event-specific details.
    pub raw: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("content is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("content is not a JSON object")]
    NotObject,
}

/// String-ish field: strings as-is, numbers rendered, anything else absent.
fn str_at(v: &Value, pointer: &str) -> Option<String> {
    match v.pointer(pointer)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn message_content(v: &Value) -> MessageContent {
    match v.get("type").and_then(Value::as_str) {
        Some("text") => match str_at(v, "/text/body") {
            Some(body) => MessageContent::Text { body },
            None => MessageContent::Other,
        },
        Some("image") => match str_at(v, "/image/media_id") {
            Some(media_id) => MessageContent::Image { media_id },
            None => MessageContent::Other,
        },
        _ => MessageContent::Other,
    }
}

/// Parse the JSON-encoded `content` string of an envelope.
pub fn parse_content(raw: &str) -> Result<InboundContent, ParseError> {
    let raw: Value = serde_json::from_str(raw)?;
    if !raw.is_object() {
        return Err(ParseError::NotObject);
    }
    Ok(InboundContent {
        from: str_at(&raw, "/from"),
        to: str_at(&raw, "/to"),
        conversation_id: str_at(&raw, "/conversation_id").filter(|s| !s.trim().is_empty()),
        is_follower: raw.get("is_follower").and_then(Value::as_bool),
        message: message_content(&raw),
        raw,
    })
}

/// Parse content, logging and falling back to empty content on failure.
pub fn parse_content_lossy(raw: &str, delivery: &str) -> InboundContent {
    match parse_content(raw) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("[{}] could not parse event content: {}", delivery, e);
            InboundContent::default()
        }
    }
}

fn millis_to_rfc3339(v: &Value, pointer: &str) -> Option<String> {
    let ms = v.pointer(pointer)?.as_i64()?;
    DateTime::from_timestamp_millis(ms).map(|t| t.to_rfc3339())
}

fn or_dash(s: Option<String>) -> String {
    s.unwrap_or_else(|| "-".to_string())
}

/// Log the event-specific details of a delivery.
pub fn log_event(delivery: &str, event: &InboundEvent, content: &InboundContent) {
    let at = event
        .created_at()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| event.create_time.to_string());
    log::info!("[{}] webhook event {} at {}", delivery, event.event_type.as_str(), at);

    let raw = &content.raw;
    match event.event_type {
        EventType::ReceiveMessage | EventType::SendMessage => {
            let kind = match content.message {
                MessageContent::Text { .. } => "text",
                MessageContent::Image { .. } => "image",
                MessageContent::Other => "other",
            };
            log::info!(
                "[{}] message from {} to {} in conversation {} ({}, follower: {:?})",
                delivery,
                or_dash(content.from.clone()),
                or_dash(content.to.clone()),
                or_dash(content.conversation_id.clone()),
                kind,
                content.is_follower
            );
            match content.message {
                MessageContent::Text { ref body } => log::debug!("[{}] text: {}", delivery, body),
                MessageContent::Image { ref media_id } => {
                    log::debug!("[{}] image media id: {}", delivery, media_id)
                }
                MessageContent::Other => {}
            }
        }
        EventType::ReceiveMessageEu => {
            log::info!(
                "[{}] EU message to {} at {} (content withheld by platform)",
                delivery,
                or_dash(content.to.clone()),
                or_dash(millis_to_rfc3339(raw, "/timestamp"))
            );
        }
        EventType::Referral => {
            let source = str_at(raw, "/referral/source");
            match source.as_deref() {
                Some("ad") => log::info!(
                    "[{}] referral from {} via ad {} (advertiser {})",
                    delivery,
                    or_dash(content.from.clone()),
                    or_dash(str_at(raw, "/referral/ad/ad_id")),
                    or_dash(str_at(raw, "/referral/ad/advertiser_id"))
                ),
                Some("short_link") => log::info!(
                    "[{}] referral from {} via short link ref {} (prefilled: {})",
                    delivery,
                    or_dash(content.from.clone()),
                    or_dash(str_at(raw, "/referral/short_link/ref")),
                    or_dash(str_at(raw, "/referral/short_link/prefilled_message"))
                ),
                _ => log::info!(
                    "[{}] referral from {} (source {})",
                    delivery,
                    or_dash(content.from.clone()),
                    or_dash(source)
                ),
            }
        }
        EventType::MarkRead => {
            log::info!(
                "[{}] {} read messages up to {}",
                delivery,
                or_dash(content.from.clone()),
                or_dash(millis_to_rfc3339(raw, "/read/last_read_timestamp"))
            );
        }
        EventType::AutoMessageConfigUpdate => {
            log::info!(
                "[{}] auto message {} config {}: {}",
                delivery,
                or_dash(str_at(raw, "/auto_message_id")),
                or_dash(str_at(raw, "/auto_message_type")),
                or_dash(str_at(raw, "/auto_message_action"))
            );
        }
        EventType::AutoMessageAuditUpdate => {
            log::info!(
                "[{}] auto message {} audit {}: {}",
                delivery,
                or_dash(str_at(raw, "/auto_message_id")),
                or_dash(str_at(raw, "/auto_message_type")),
                or_dash(str_at(raw, "/audit_status"))
            );
        }
        EventType::HighIntentComment => {
            log::info!(
                "[{}] high intent comment {} from {}",
                delivery,
                or_dash(str_at(raw, "/comment_id")),
                or_dash(content.from.clone())
            );
            if let Some(text) = str_at(raw, "/comment_text") {
                log::debug!("[{}] comment: {}", delivery, text);
            }
        }
        EventType::Unknown(ref name) => {
            log::info!("[{}] unknown event type: {}", delivery, name);
        }
    }
}
