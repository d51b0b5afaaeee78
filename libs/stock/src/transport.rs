use async_trait::async_trait;

use crate::UserId;
use crate::error::TransportError;

/// Outbound side of the chat platform.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, user_id: UserId, text: &str) -> Result<(), TransportError>;
}
