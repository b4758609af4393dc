//! Communication channels (TikTok Business Messaging).
//!
//! Inbound events arrive through the gateway webhook and are classified here; replies leave
//! through a `MessageSender`.

mod inbound;
mod sender;
mod tiktok;

pub use inbound::{
    log_event, parse_content, parse_content_lossy, EventType, InboundContent, InboundEvent,
    MessageContent, ParseError, Route,
};
pub use sender::MessageSender;
pub use tiktok::{PlatformError, TikTokChannel};
