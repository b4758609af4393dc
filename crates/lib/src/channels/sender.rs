//! Outbound side of a channel: deliver text to a platform conversation.

use crate::channels::tiktok::PlatformError;
use async_trait::async_trait;

/// Sends text replies into a platform conversation on behalf of a business account.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send a text message to `conversation_id` as business `business_id`.
    async fn send_text(
        &self,
        business_id: &str,
        conversation_id: &str,
        text: &str,
    ) -> Result<(), PlatformError>;
}
