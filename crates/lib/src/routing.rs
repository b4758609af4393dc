//! Conversation–session binding for routing: conversation_id -> AI session id.
//!
//! Inbound: a message from a platform conversation is routed to the AI session bound to it
//! (created lazily by the relay on first contact). Entries live for the process lifetime.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Platform conversation identifier (opaque string).
pub type ConversationId = String;

/// Session identifier returned by the AI backend (opaque string).
pub type AiSessionId = String;

/// Store of conversation -> AI session bindings. At most one session per conversation.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Look up the AI session bound to a conversation.
    async fn resolve(&self, conversation_id: &str) -> Option<AiSessionId>;

    /// Bind a conversation to an AI session. Overwrites any existing binding.
    async fn bind(&self, conversation_id: &str, session_id: &str);
}

/// In-memory registry; created empty at startup, never evicts.
pub struct InMemorySessionRegistry {
    inner: Arc<RwLock<HashMap<ConversationId, AiSessionId>>>,
}

impl Default for InMemorySessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of bound conversations.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn resolve(&self, conversation_id: &str) -> Option<AiSessionId> {
        self.inner.read().await.get(conversation_id).cloned()
    }

    async fn bind(&self, conversation_id: &str, session_id: &str) {
        let previous = self
            .inner
            .write()
            .await
            .insert(conversation_id.to_string(), session_id.to_string());
        if let Some(old) = previous.filter(|old| old != session_id) {
            log::debug!(
                "routing: conversation {} rebound from session {} to {}",
                conversation_id,
                old,
                session_id
            );
        }
    }
}

/// Per-conversation async locks. Holding the guard serializes resolve-or-create for one
/// conversation while other conversations proceed independently.
#[derive(Default)]
pub struct ConversationLocks {
    locks: std::sync::Mutex<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a conversation, creating it on first use.
    pub async fn acquire(&self, conversation_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut g = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            g.entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn resolve_unknown_conversation_is_none() {
        let registry = InMemorySessionRegistry::new();
        assert_eq!(registry.resolve("conv-1").await, None);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn bind_then_resolve() {
        let registry = InMemorySessionRegistry::new();
        registry.bind("conv-1", "chat-9").await;
        assert_eq!(registry.resolve("conv-1").await.as_deref(), Some("chat-9"));
        assert_eq!(registry.resolve("conv-2").await, None);
    }

    #[tokio::test]
    async fn bind_overwrites_and_keeps_one_entry() {
        let registry = InMemorySessionRegistry::new();
        registry.bind("conv-1", "chat-1").await;
        registry.bind("conv-1", "chat-2").await;
        registry.bind("conv-1", "chat-2").await;
        assert_eq!(registry.resolve("conv-1").await.as_deref(), Some("chat-2"));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn same_conversation_lock_is_exclusive() {
        let locks = Arc::new(ConversationLocks::new());
        let guard = locks.acquire("conv-1").await;

        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.acquire("conv-1").await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn different_conversations_do_not_block() {
        let locks = ConversationLocks::new();
        let _a = locks.acquire("conv-a").await;
        let b = tokio::time::timeout(Duration::from_millis(200), locks.acquire("conv-b")).await;
        assert!(b.is_ok());
    }
}
