use std::{mem::take, sync::Arc};

use async_trait::async_trait;
use serenity::all::{CreateMessage, Http, UserId as DiscordUserId};
use stock::{MessageSender, TransportError, UserId};
use tracing::debug;

/// Discord rejects messages longer than this many characters.
pub const MESSAGE_LIMIT: usize = 2000;

/// Delivers notifications as direct messages.
pub struct DiscordSender {
    http: Arc<Http>,
}

impl DiscordSender {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MessageSender for DiscordSender {
    async fn send_message(&self, user_id: UserId, text: &str) -> Result<(), TransportError> {
        if user_id == 0 {
            return Err(TransportError::new(user_id, "not a discord user id"));
        }
        let user = DiscordUserId::new(user_id);

        for chunk in split_message(text) {
            user.direct_message(&self.http, CreateMessage::new().content(chunk))
                .await
                .map_err(|e| TransportError::new(user_id, e))?;
        }

        debug!(user_id, "direct message delivered");
        Ok(())
    }
}

/// Split on line boundaries so each piece fits in one Discord message.
/// A single line longer than the limit is cut by characters.
pub fn split_message(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if current_len + line_len > MESSAGE_LIMIT && !current.is_empty() {
            chunks.push(take(&mut current));
            current_len = 0;
        }

        if line_len > MESSAGE_LIMIT {
            let chars: Vec<char> = line.chars().collect();
            chunks.extend(chars.chunks(MESSAGE_LIMIT).map(|c| c.iter().collect::<String>()));
            continue;
        }

        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
