use std::sync::Arc;

use teloxide::{prelude::*, types::CallbackQuery};
use tracing::warn;

use tib_core::{
    domain::ChatId,
    messaging::types::{self, IncomingUpdate},
};

use crate::router::AppState;

use super::{deliver, sender};

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let (user_id, username) = sender(&q.from);
    let data = q.data.clone().unwrap_or_default();

    // Always answer the callback query so the client stops its spinner.
    if let Err(e) = state.messenger.answer_callback_query(&cb_id, None).await {
        warn!(user_id = user_id.0, error = %e, "failed to answer callback query");
    }
    if data.is_empty() {
        return Ok(());
    }

    // Buttons live in private chats, where the chat id equals the user id.
    let chat_id = q
        .message
        .as_ref()
        .map(|m| ChatId(m.chat.id.0))
        .unwrap_or(ChatId(user_id.0));

    let update = IncomingUpdate::Callback(types::CallbackQuery {
        chat_id,
        user_id,
        username,
        callback_id: cb_id,
        data,
    });
    deliver(&state, update).await;
    Ok(())
}
