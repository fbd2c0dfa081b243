use async_trait::async_trait;

use crate::{
    domain::ChatId,
    messaging::types::{ChatAction, InlineKeyboard},
    Result,
};

/// Outbound side of a messenger.
///
/// Telegram is the only implementation; the dispatch layer never calls this
/// directly, it returns a `Reply` that the adapter delivers through it.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}

/// Fetches media referenced by an incoming update.
#[async_trait]
pub trait MediaPort: Send + Sync {
    /// Download a file into memory.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>>;
}
