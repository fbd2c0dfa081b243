//! Telegram adapter (teloxide).
//!
//! Implements the `tib-core` messaging and media ports over the Telegram Bot API
//! and runs the long-polling loop that feeds updates to the core dispatcher.

use async_trait::async_trait;

use teloxide::{
    net::Download,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup},
};

pub mod handlers;
pub mod router;

use tib_core::{
    domain::ChatId,
    errors::Error,
    formatting::split_message,
    messaging::{
        port::{MediaPort, MessagingPort},
        types::{ChatAction, InlineKeyboard},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    max_message_len: usize,
}

impl TelegramMessenger {
    pub fn new(bot: Bot, max_message_len: usize) -> Self {
        Self {
            bot,
            max_message_len,
        }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    // Plain text: model output is not guaranteed to be valid HTML/Markdown.
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        for chunk in split_message(text, self.max_message_len) {
            if chunk.trim().is_empty() {
                continue;
            }
            self.bot
                .send_message(Self::tg_chat(chat_id), chunk)
                .await
                .map_err(Self::map_err)?;
        }
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .buttons
            .into_iter()
            .map(|b| vec![InlineKeyboardButton::callback(b.label, b.callback_data)])
            .collect();

        self.bot
            .send_message(Self::tg_chat(chat_id), text.to_string())
            .reply_markup(InlineKeyboardMarkup::new(rows))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let tg_action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
        };
        self.bot
            .send_chat_action(Self::tg_chat(chat_id), tg_action)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let mut req = self.bot.answer_callback_query(callback_id.to_string());
        if let Some(t) = text {
            req = req.text(t.to_string());
        }
        req.await.map_err(Self::map_err)?;
        Ok(())
    }
}

#[async_trait]
impl MediaPort for TelegramMessenger {
    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let file = self
            .bot
            .get_file(file_id.to_string())
            .await
            .map_err(Self::map_err)?;

        let mut buf: Vec<u8> = Vec::with_capacity(file.size as usize);
        self.bot
            .download_file(&file.path, &mut buf)
            .await
            .map_err(|e| Error::External(format!("telegram download error: {e}")))?;
        tracing::debug!(file_id, size = buf.len(), "downloaded telegram file");
        Ok(buf)
    }
}
