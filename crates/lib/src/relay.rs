//! Relay turn: resolve or create the AI session for a conversation, ask the AI, deliver the reply.
//!
//! A turn has two phases. The primary phase runs session resolution, the AI call and the reply
//! delivery; if any step fails, the fallback phase sends the configured apology exactly once.
//! A failed fallback is logged and the turn ends there.

use crate::channels::{
    EventType, InboundContent, InboundEvent, MessageContent, MessageSender, PlatformError, Route,
};
use crate::llm::{AiGateway, GatewayError};
use crate::routing::{AiSessionId, ConversationLocks, SessionRegistry};
use std::sync::Arc;

/// Failure of the primary phase.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Why an actionable event produced no outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotText,
    NoConversation,
    NoBusinessAccount,
}

/// Result of handling one event.
#[derive(Debug)]
pub enum RelayOutcome {
    /// Event type is not relayed.
    Ignored,
    Skipped(SkipReason),
    Replied {
        session_id: AiSessionId,
    },
    FallbackSent {
        cause: RelayError,
    },
    FallbackFailed {
        cause: RelayError,
        fallback: PlatformError,
    },
}

/// Static relay settings.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Model passed to `create_session`.
    pub model: String,
    /// Apology sent when the primary phase fails.
    pub fallback_message: String,
    /// Business account used when an event has no `user_openid`.
    pub default_business_id: Option<String>,
}

/// Ties the AI backend, the platform sender and the session registry together.
#[derive(Clone)]
pub struct Relay {
    ai: Arc<dyn AiGateway>,
    sender: Arc<dyn MessageSender>,
    registry: Arc<dyn SessionRegistry>,
    locks: Arc<ConversationLocks>,
    settings: Arc<RelaySettings>,
}

impl Relay {
    pub fn new(
        ai: Arc<dyn AiGateway>,
        sender: Arc<dyn MessageSender>,
        registry: Arc<dyn SessionRegistry>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            ai,
            sender,
            registry,
            locks: Arc::new(ConversationLocks::new()),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    fn business_id<'a>(&'a self, event: &'a InboundEvent) -> Option<&'a str> {
        let id = event.business_open_id.trim();
        if !id.is_empty() {
            return Some(id);
        }
        self.settings.default_business_id.as_deref()
    }

    /// Handle one classified event. Never fails; every error ends up in the outcome.
    pub async fn handle(
        &self,
        delivery: &str,
        event: &InboundEvent,
        content: &InboundContent,
    ) -> RelayOutcome {
        if event.event_type.route() != Route::Relay {
            if event.event_type == EventType::SendMessage {
                log::debug!("[{}] ignoring echo of a sent message", delivery);
            }
            return RelayOutcome::Ignored;
        }
        let text = match content.message {
            MessageContent::Text { ref body } => body.as_str(),
            MessageContent::Image { ref media_id } => {
                log::info!("[{}] image message ({}) not relayed", delivery, media_id);
                return RelayOutcome::Skipped(SkipReason::NotText);
            }
            MessageContent::Other => {
                log::info!("[{}] non-text message not relayed", delivery);
                return RelayOutcome::Skipped(SkipReason::NotText);
            }
        };
        let Some(conversation_id) = content.conversation_id.as_deref() else {
            log::warn!("[{}] text message without conversation id, not relayed", delivery);
            return RelayOutcome::Skipped(SkipReason::NoConversation);
        };
        let Some(business_id) = self.business_id(event) else {
            log::warn!("[{}] no business account id for reply, not relayed", delivery);
            return RelayOutcome::Skipped(SkipReason::NoBusinessAccount);
        };

        match self.primary(conversation_id, business_id, text).await {
            Ok(session_id) => {
                log::info!(
                    "[{}] relayed reply to conversation {} (session {})",
                    delivery,
                    conversation_id,
                    session_id
                );
                RelayOutcome::Replied { session_id }
            }
            Err(cause) => {
                log::warn!(
                    "[{}] relay failed for conversation {}: {}",
                    delivery,
                    conversation_id,
                    cause
                );
                self.fallback(delivery, business_id, conversation_id, cause)
                    .await
            }
        }
    }

    async fn primary(
        &self,
        conversation_id: &str,
        business_id: &str,
        text: &str,
    ) -> Result<AiSessionId, RelayError> {
        let session_id = self.resolve_or_create(conversation_id).await?;
        let reply = self.ai.send_message(&session_id, text).await?;
        self.sender
            .send_text(business_id, conversation_id, &reply)
            .await?;
        Ok(session_id)
    }

    /// At most one `create_session` per conversation, even with concurrent deliveries.
    async fn resolve_or_create(&self, conversation_id: &str) -> Result<AiSessionId, GatewayError> {
        let _guard = self.locks.acquire(conversation_id).await;
        if let Some(id) = self.registry.resolve(conversation_id).await {
            return Ok(id);
        }
        let id = self.ai.create_session(&self.settings.model).await?;
        self.registry.bind(conversation_id, &id).await;
        log::info!(
            "created ai session {} for conversation {}",
            id,
            conversation_id
        );
        Ok(id)
    }

    async fn fallback(
        &self,
        delivery: &str,
        business_id: &str,
        conversation_id: &str,
        cause: RelayError,
    ) -> RelayOutcome {
        match self
            .sender
            .send_text(business_id, conversation_id, &self.settings.fallback_message)
            .await
        {
            Ok(()) => RelayOutcome::FallbackSent { cause },
            Err(fallback) => {
                log::error!(
                    "[{}] fallback message to conversation {} failed: {}",
                    delivery,
                    conversation_id,
                    fallback
                );
                RelayOutcome::FallbackFailed { cause, fallback }
            }
        }
    }
}
