//! AI backend abstraction and the chat API client.
//!
//! The backend is session based: a chat is created once per conversation and follow-up
//! messages are sent to it by id.

mod chat_api;

pub use chat_api::{ChatApiClient, GatewayError};

use crate::routing::AiSessionId;
use async_trait::async_trait;

/// Session-oriented AI backend used by the relay.
#[async_trait]
pub trait AiGateway: Send + Sync {
    /// Create a chat session for the given model; returns the backend's session id.
    async fn create_session(&self, model: &str) -> Result<AiSessionId, GatewayError>;

    /// Send user text to a session and return the reply text.
    async fn send_message(&self, session_id: &str, text: &str) -> Result<String, GatewayError>;
}
