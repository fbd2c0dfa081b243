use crate::domain::{ChatId, UserId};

/// Cross-messenger incoming update model.
///
/// Telegram-specific fields live in the Telegram adapter; updates without a
/// sender never reach the core.
#[derive(Clone, Debug)]
pub enum IncomingUpdate {
    Command(Command),
    Text(TextMessage),
    Photo(PhotoMessage),
    Callback(CallbackQuery),
}

impl IncomingUpdate {
    pub fn user_id(&self) -> UserId {
        match self {
            IncomingUpdate::Command(c) => c.user_id,
            IncomingUpdate::Text(t) => t.user_id,
            IncomingUpdate::Photo(p) => p.user_id,
            IncomingUpdate::Callback(q) => q.user_id,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        match self {
            IncomingUpdate::Command(c) => c.chat_id,
            IncomingUpdate::Text(t) => t.chat_id,
            IncomingUpdate::Photo(p) => p.chat_id,
            IncomingUpdate::Callback(q) => q.chat_id,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            IncomingUpdate::Command(c) => c.username.as_deref(),
            IncomingUpdate::Text(t) => t.username.as_deref(),
            IncomingUpdate::Photo(p) => p.username.as_deref(),
            IncomingUpdate::Callback(q) => q.username.as_deref(),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            IncomingUpdate::Command(_) => "command",
            IncomingUpdate::Text(_) => "text",
            IncomingUpdate::Photo(_) => "photo",
            IncomingUpdate::Callback(_) => "callback",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Command {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    /// Lowercased, without the leading `/` or `@botname`.
    pub name: String,
    /// Bot named after `@`, if any.
    pub mention: Option<String>,
    pub args: String,
}

impl Command {
    /// Parse `/cmd@botname arg1 ...`. Returns `None` for non-command text.
    pub fn parse(
        chat_id: ChatId,
        user_id: UserId,
        username: Option<String>,
        text: &str,
    ) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }
        let mut parts = text.splitn(2, char::is_whitespace);
        let first = parts.next().unwrap_or("").trim();
        let args = parts.next().unwrap_or("").trim().to_string();

        let (name, mention) = match first.trim_start_matches('/').split_once('@') {
            Some((name, bot)) => (name, Some(bot.to_string())),
            None => (first.trim_start_matches('/'), None),
        };
        let name = name.to_lowercase();
        if name.is_empty() {
            return None;
        }

        Some(Self {
            chat_id,
            user_id,
            username,
            name,
            mention,
            args,
        })
    }

    /// True unless the command names a different bot (`/list@other_bot`).
    pub fn is_addressed_to(&self, bot_username: &str) -> bool {
        self.mention
            .as_deref()
            .map_or(true, |m| m.eq_ignore_ascii_case(bot_username))
    }

    pub fn arg_list(&self) -> Vec<&str> {
        self.args.split_whitespace().collect()
    }
}

#[derive(Clone, Debug)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct PhotoMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    /// File id of the highest-resolution size.
    pub file_id: String,
    pub caption: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub callback_id: String,
    pub data: String,
}

/// Outgoing "chat action" (typing indicator, etc).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

/// Inline keyboard attached to a reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }
}

/// What the dispatch layer wants sent back to the chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}
