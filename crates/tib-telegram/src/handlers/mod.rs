//! Telegram update handlers.
//!
//! Each handler only translates a teloxide update into a core `IncomingUpdate`,
//! hands it to the dispatcher and delivers the reply. Authorization and all
//! bot behavior live in `tib_core::dispatch`.

use std::{sync::Arc, time::Duration};

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message, User},
};
use tracing::{debug, error, warn};

use tib_core::{
    domain::{ChatId, UserId},
    messaging::types::{ChatAction, Command, IncomingUpdate, Reply, TextMessage},
};

use crate::router::AppState;

mod callback;
mod photo;

const TYPING_INTERVAL: Duration = Duration::from_secs(4);

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    callback::handle_callback(q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(update) = message_to_update(&msg, &state.bot_username) else {
        debug!(chat_id = msg.chat.id.0, "ignoring unsupported message");
        return Ok(());
    };
    deliver(&state, update).await;
    Ok(())
}

pub(crate) fn sender(user: &User) -> (UserId, Option<String>) {
    (UserId(user.id.0 as i64), user.username.clone())
}

/// Map a Telegram message to a core update. Messages without a sender,
/// without text/photo content, or with a command for another bot are ignored.
pub(crate) fn message_to_update(msg: &Message, bot_username: &str) -> Option<IncomingUpdate> {
    let (user_id, username) = sender(msg.from()?);
    let chat_id = ChatId(msg.chat.id.0);

    if let Some(photos) = msg.photo() {
        return photo::to_update(chat_id, user_id, username, photos, msg.caption());
    }

    let text = msg.text()?;
    if let Some(cmd) = Command::parse(chat_id, user_id, username.clone(), text) {
        if !cmd.is_addressed_to(bot_username) {
            debug!(command = %cmd.name, mention = ?cmd.mention, "command for another bot");
            return None;
        }
        return Some(IncomingUpdate::Command(cmd));
    }
    Some(IncomingUpdate::Text(TextMessage {
        chat_id,
        user_id,
        username,
        text: text.to_string(),
    }))
}

/// Run the dispatcher for one update and send its reply.
///
/// The dispatcher runs in its own task so a panic inside a handler is logged
/// and answered instead of taking the polling loop down.
pub(crate) async fn deliver(state: &AppState, update: IncomingUpdate) {
    let chat_id = update.chat_id();
    let user_id = update.user_id();
    let relays = matches!(update, IncomingUpdate::Text(_) | IncomingUpdate::Photo(_));

    let typing = relays.then(|| start_typing(state, chat_id));

    let dispatcher = state.dispatcher.clone();
    let reply = match tokio::spawn(async move { dispatcher.handle(update).await }).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(user_id = user_id.0, error = %e, "dispatcher task failed");
            Reply::text("Internal error while processing your request.")
        }
    };

    if let Some(stop) = typing {
        let _ = stop.send(());
    }

    send_reply(state, chat_id, reply).await;
}

async fn send_reply(state: &AppState, chat_id: ChatId, reply: Reply) {
    let res = match reply.keyboard {
        Some(kb) => {
            state
                .messenger
                .send_inline_keyboard(chat_id, &reply.text, kb)
                .await
        }
        None => state.messenger.send_text(chat_id, &reply.text).await,
    };
    if let Err(e) = res {
        error!(chat_id = chat_id.0, error = %e, "failed to send reply");
    }
}

/// Typing indicator loop (best-effort) until the returned sender fires or drops.
fn start_typing(state: &AppState, chat_id: ChatId) -> tokio::sync::oneshot::Sender<()> {
    let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
    let messenger = state.messenger.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(TYPING_INTERVAL);
        loop {
            tokio::select! {
              _ = tick.tick() => {
                if let Err(e) = messenger.send_chat_action(chat_id, ChatAction::Typing).await {
                    warn!(chat_id = chat_id.0, error = %e, "typing indicator failed");
                }
              }
              _ = &mut stop_rx => break,
            }
        }
    });
    stop_tx
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use tib_core::{
        config::Config,
        dispatch::Dispatcher,
        errors::Error,
        messaging::{
            port::{MediaPort, MessagingPort},
            types::InlineKeyboard,
        },
        model::{
            client::CompletionClient,
            types::{CompletionReply, CompletionRequest},
        },
        store::SqliteMembershipStore,
        Result,
    };

    use super::*;

    const BOT: &str = "image_bot";
    const ADMIN: i64 = 42;

    fn message(extra: serde_json::Value) -> Message {
        let mut v = json!({
            "message_id": 1,
            "date": 1_700_000_000,
            "chat": {"id": ADMIN, "first_name": "Ann", "type": "private"},
            "from": {"id": ADMIN, "is_bot": false, "first_name": "Ann", "username": "ann"}
        });
        if let (Some(base), Some(extra)) = (v.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_str(&v.to_string()).unwrap()
    }

    fn photo_sizes() -> serde_json::Value {
        json!([
            {"file_id": "small", "file_unique_id": "s", "file_size": 100, "width": 90, "height": 60},
            {"file_id": "large", "file_unique_id": "l", "file_size": 9000, "width": 1280, "height": 960},
            {"file_id": "medium", "file_unique_id": "m", "file_size": 900, "width": 320, "height": 240}
        ])
    }

    #[test]
    fn photo_takes_precedence_over_caption() {
        let msg = message(json!({"photo": photo_sizes(), "caption": "/add 5"}));
        match message_to_update(&msg, BOT) {
            Some(IncomingUpdate::Photo(p)) => {
                assert_eq!(p.file_id, "large");
                assert_eq!(p.caption.as_deref(), Some("/add 5"));
                assert_eq!(p.user_id, UserId(ADMIN));
                assert_eq!(p.username.as_deref(), Some("ann"));
            }
            other => panic!("expected photo, got {other:?}"),
        }
    }

    #[test]
    fn commands_and_text_are_told_apart() {
        let cmd = message_to_update(&message(json!({"text": "/add 7 bob"})), BOT);
        assert!(matches!(cmd, Some(IncomingUpdate::Command(ref c)) if c.name == "add" && c.args == "7 bob"));

        let own = message_to_update(&message(json!({"text": "/list@image_bot"})), BOT);
        assert!(matches!(own, Some(IncomingUpdate::Command(ref c)) if c.name == "list"));

        let text = message_to_update(&message(json!({"text": "what is rust?"})), BOT);
        assert!(matches!(text, Some(IncomingUpdate::Text(ref t)) if t.text == "what is rust?"));
    }

    #[test]
    fn command_for_another_bot_is_ignored() {
        let msg = message(json!({"text": "/list@other_bot"}));
        assert!(message_to_update(&msg, BOT).is_none());
    }

    #[test]
    fn messages_without_sender_or_content_are_ignored() {
        let channel_post: Message = serde_json::from_str(
            &json!({
                "message_id": 2,
                "date": 1_700_000_000,
                "chat": {"id": -1001, "title": "news", "type": "channel"},
                "text": "hello"
            })
            .to_string(),
        )
        .unwrap();
        assert!(message_to_update(&channel_post, BOT).is_none());

        let no_content = message(json!({"location": {"latitude": 52.5, "longitude": 13.4}}));
        assert!(message_to_update(&no_content, BOT).is_none());
    }

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<(String, bool)>>,
    }

    impl RecordingMessenger {
        fn sent(&self) -> Vec<(String, bool)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessagingPort for RecordingMessenger {
        async fn send_text(&self, _chat_id: ChatId, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((text.to_string(), false));
            Ok(())
        }

        async fn send_inline_keyboard(
            &self,
            _chat_id: ChatId,
            text: &str,
            _keyboard: InlineKeyboard,
        ) -> Result<()> {
            self.sent.lock().unwrap().push((text.to_string(), true));
            Ok(())
        }

        async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
            Ok(())
        }

        async fn answer_callback_query(&self, _callback_id: &str, _text: Option<&str>) -> Result<()> {
            Ok(())
        }
    }

    struct PanickingCompletion;

    #[async_trait]
    impl CompletionClient for PanickingCompletion {
        fn model(&self) -> &str {
            "test-model"
        }

        async fn complete(&self, _req: CompletionRequest) -> CompletionReply {
            panic!("completion backend crashed");
        }
    }

    struct NoMedia;

    #[async_trait]
    impl MediaPort for NoMedia {
        async fn download(&self, _file_id: &str) -> Result<Vec<u8>> {
            Err(Error::External("no media in tests".into()))
        }
    }

    async fn state() -> (AppState, Arc<RecordingMessenger>) {
        let cfg = Config::from_lookup(|k| match k {
            "TELEGRAM_TOKEN" => Some("tg-token-value".into()),
            "OPENAI_API_KEY" => Some("sk-test-value".into()),
            "ADMIN_TELEGRAM_ID" => Some(ADMIN.to_string()),
            _ => None,
        })
        .unwrap();
        let store = Arc::new(SqliteMembershipStore::in_memory().await.unwrap());
        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher = Dispatcher::new(&cfg, store, Arc::new(PanickingCompletion), Arc::new(NoMedia));
        let state = AppState {
            dispatcher: Arc::new(dispatcher),
            messenger: messenger.clone(),
            bot_username: BOT.to_string(),
        };
        (state, messenger)
    }

    fn text(body: &str) -> IncomingUpdate {
        IncomingUpdate::Text(TextMessage {
            chat_id: ChatId(ADMIN),
            user_id: UserId(ADMIN),
            username: None,
            text: body.to_string(),
        })
    }

    fn command(body: &str) -> IncomingUpdate {
        IncomingUpdate::Command(Command::parse(ChatId(ADMIN), UserId(ADMIN), None, body).unwrap())
    }

    #[tokio::test]
    async fn handler_panic_becomes_error_reply() {
        let (state, messenger) = state().await;

        deliver(&state, text("hi")).await;
        assert_eq!(
            messenger.sent(),
            vec![("Internal error while processing your request.".to_string(), false)]
        );

        // The next update is still served.
        deliver(&state, command("/myid")).await;
        assert_eq!(messenger.sent()[1], (format!("Your Telegram ID: {ADMIN}"), false));
    }

    #[tokio::test]
    async fn keyboard_replies_use_inline_keyboard() {
        let (state, messenger) = state().await;
        deliver(&state, command("/menu")).await;
        assert_eq!(messenger.sent(), vec![("Choose an action:".to_string(), true)]);
    }
}
