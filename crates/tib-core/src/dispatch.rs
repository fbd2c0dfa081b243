//! Maps incoming updates to replies.
//!
//! `Dispatcher::handle` is the single entry point used by the Telegram adapter:
//! it authorizes the caller, runs the command or completion, and always returns
//! a reply. Failures are logged and turned into reply text here so one bad
//! update never affects the next.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    config::Config,
    domain::{Access, UserId},
    formatting::{format_member_list, truncate_chars},
    messaging::{
        port::MediaPort,
        types::{
            CallbackQuery, Command, IncomingUpdate, InlineButton, InlineKeyboard, PhotoMessage,
            Reply, TextMessage,
        },
    },
    model::client::CompletionClient,
    security::AccessGate,
    store::MembershipStore,
    Result,
};

pub const DEFAULT_IMAGE_PROMPT: &str = "Describe this image.";

const UNAUTHORIZED: &str = "You are not authorized to use this bot. Contact the administrator.";
const ADMIN_ONLY: &str = "Only the administrator can manage users.";
const ID_FORMAT_ERROR: &str = "telegram_id must be an integer.";

const CB_MYID: &str = "myid";
const CB_LIST: &str = "list";
const CB_HELP: &str = "help";

/// Explicit application context: everything a handler needs, built once at startup.
pub struct Dispatcher {
    gate: AccessGate,
    store: Arc<dyn MembershipStore>,
    completion: Arc<dyn CompletionClient>,
    media: Arc<dyn MediaPort>,
}

impl Dispatcher {
    pub fn new(
        cfg: &Config,
        store: Arc<dyn MembershipStore>,
        completion: Arc<dyn CompletionClient>,
        media: Arc<dyn MediaPort>,
    ) -> Self {
        Self {
            gate: AccessGate::new(cfg.admin_id, store.clone()),
            store,
            completion,
            media,
        }
    }

    /// Handle one update. Never fails: errors become reply text.
    pub async fn handle(&self, update: IncomingUpdate) -> Reply {
        let user_id = update.user_id();
        let kind = update.kind();
        let username = update.username().unwrap_or("-").to_string();
        info!(user_id = user_id.0, username = %username, kind, "update received");

        match self.route(update).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(user_id = user_id.0, username = %username, kind, error = %e, "handler failed");
                Reply::text(format!("Error while processing your request: {e}"))
            }
        }
    }

    async fn route(&self, update: IncomingUpdate) -> Result<Reply> {
        // Re-evaluated for every update; no session state.
        let access = self.gate.authorize(update.user_id()).await;
        match update {
            IncomingUpdate::Command(c) => self.handle_command(c, access).await,
            IncomingUpdate::Text(t) => self.handle_text(t, access).await,
            IncomingUpdate::Photo(p) => self.handle_photo(p, access).await,
            IncomingUpdate::Callback(q) => self.handle_callback(q, access).await,
        }
    }

    async fn handle_command(&self, cmd: Command, access: Access) -> Result<Reply> {
        match cmd.name.as_str() {
            "start" => Ok(Reply::text(start_text(access))),
            "add" => self.cmd_add(&cmd, access).await,
            "remove" => self.cmd_remove(&cmd, access).await,
            "list" => self.cmd_list(access).await,
            "myid" => Ok(myid_text(cmd.user_id)),
            "help" => Ok(Reply::text(help_text(access))),
            "menu" => Ok(menu(access)),
            other => {
                warn!(user_id = cmd.user_id.0, command = other, "unknown command");
                Ok(Reply::text("Unknown command. See /help."))
            }
        }
    }

    async fn cmd_add(&self, cmd: &Command, access: Access) -> Result<Reply> {
        if !access.is_admin() {
            warn!(user_id = cmd.user_id.0, "non-admin tried /add");
            return Ok(Reply::text(ADMIN_ONLY));
        }
        let args = cmd.arg_list();
        let Some(raw_id) = args.first() else {
            return Ok(Reply::text("Usage: /add <telegram_id> [username]"));
        };
        let Ok(id) = raw_id.parse::<i64>() else {
            warn!(arg = %raw_id, "invalid telegram_id for /add");
            return Ok(Reply::text(ID_FORMAT_ERROR));
        };
        let name = args.get(1).copied();

        match self.store.add(UserId(id), name).await {
            Ok(()) => Ok(Reply::text(format!("User {id} added."))),
            Err(e) => {
                error!(target_user = id, error = %e, "add failed");
                Ok(Reply::text(format!("Failed to add user {id}: {e}")))
            }
        }
    }

    async fn cmd_remove(&self, cmd: &Command, access: Access) -> Result<Reply> {
        if !access.is_admin() {
            warn!(user_id = cmd.user_id.0, "non-admin tried /remove");
            return Ok(Reply::text(ADMIN_ONLY));
        }
        let args = cmd.arg_list();
        let Some(raw_id) = args.first() else {
            return Ok(Reply::text("Usage: /remove <telegram_id>"));
        };
        let Ok(id) = raw_id.parse::<i64>() else {
            warn!(arg = %raw_id, "invalid telegram_id for /remove");
            return Ok(Reply::text(ID_FORMAT_ERROR));
        };

        match self.store.remove(UserId(id)).await {
            Ok(()) => Ok(Reply::text(format!("User {id} removed."))),
            Err(e) => {
                error!(target_user = id, error = %e, "remove failed");
                Ok(Reply::text(format!("Failed to remove user {id}: {e}")))
            }
        }
    }

    async fn cmd_list(&self, access: Access) -> Result<Reply> {
        if !access.is_admin() {
            return Ok(Reply::text(ADMIN_ONLY));
        }
        let members = self.store.list().await?;
        info!(count = members.len(), "listing members");
        Ok(Reply::text(format_member_list(&members)))
    }

    async fn handle_callback(&self, q: CallbackQuery, access: Access) -> Result<Reply> {
        match q.data.as_str() {
            CB_MYID => Ok(myid_text(q.user_id)),
            CB_LIST => self.cmd_list(access).await,
            CB_HELP => Ok(Reply::text(help_text(access))),
            other => {
                warn!(user_id = q.user_id.0, data = other, "unknown callback data");
                Ok(Reply::text("Unknown action."))
            }
        }
    }

    async fn handle_text(&self, msg: TextMessage, access: Access) -> Result<Reply> {
        if !access.can_relay() {
            warn!(user_id = msg.user_id.0, "unauthorized text message");
            return Ok(Reply::text(UNAUTHORIZED));
        }
        if msg.text.trim().is_empty() {
            return Ok(Reply::text("Send some text or a picture."));
        }

        info!(
            user_id = msg.user_id.0,
            prompt = %truncate_chars(&msg.text, 100),
            "relaying text prompt"
        );
        let reply = self.completion.complete_text(&msg.text).await;
        if !reply.is_text() {
            warn!(user_id = msg.user_id.0, ?reply, "completion failed");
        }
        Ok(Reply::text(reply.into_reply_text()))
    }

    async fn handle_photo(&self, msg: PhotoMessage, access: Access) -> Result<Reply> {
        if !access.can_relay() {
            warn!(user_id = msg.user_id.0, "unauthorized photo message");
            return Ok(Reply::text(UNAUTHORIZED));
        }

        let prompt = msg
            .caption
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_IMAGE_PROMPT);

        let bytes = match self.media.download(&msg.file_id).await {
            Ok(b) => b,
            Err(e) => {
                error!(user_id = msg.user_id.0, file_id = %msg.file_id, error = %e, "photo download failed");
                return Ok(Reply::text(format!("Failed to download the image: {e}")));
            }
        };
        info!(
            user_id = msg.user_id.0,
            size = bytes.len(),
            prompt = %truncate_chars(prompt, 100),
            "relaying photo"
        );

        // The bytes move into the request and are dropped with it.
        let reply = self.completion.complete_with_image(prompt, bytes).await;
        if !reply.is_text() {
            warn!(user_id = msg.user_id.0, ?reply, "completion failed");
        }
        Ok(Reply::text(reply.into_reply_text()))
    }
}

fn start_text(access: Access) -> String {
    match access {
        Access::Admin => {
            "Hi! You are the administrator. Use /add, /remove and /list to manage users, or /menu."
                .to_string()
        }
        Access::Allowed => {
            "Hi! Send me a picture with a question, or just a text prompt, and I will forward it to OpenAI."
                .to_string()
        }
        Access::Denied => UNAUTHORIZED.to_string(),
    }
}

fn myid_text(user_id: UserId) -> Reply {
    Reply::text(format!("Your Telegram ID: {user_id}"))
}

fn help_text(access: Access) -> String {
    let mut out = String::from(
        "Send a picture (the caption is used as the question) or a text message.\n\n\
         /start - status\n\
         /myid - show your Telegram ID\n\
         /menu - quick actions\n\
         /help - this message",
    );
    if access.is_admin() {
        out.push_str(
            "\n\nAdmin:\n\
             /add <telegram_id> [username] - allow a user\n\
             /remove <telegram_id> - revoke access\n\
             /list - show allowed users",
        );
    }
    out
}

fn menu(access: Access) -> Reply {
    let mut buttons = vec![
        InlineButton::new("My ID", CB_MYID),
        InlineButton::new("Help", CB_HELP),
    ];
    if access.is_admin() {
        buttons.push(InlineButton::new("Users", CB_LIST));
    }
    Reply::with_keyboard("Choose an action:", InlineKeyboard::new(buttons))
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        domain::ChatId,
        errors::Error,
        model::types::{CompletionFailure, CompletionReply, CompletionRequest},
        store::SqliteMembershipStore,
    };

    const ADMIN: UserId = UserId(1);
    const MEMBER: UserId = UserId(2);
    const STRANGER: UserId = UserId(3);

    #[derive(Default)]
    struct FakeCompletion {
        requests: Mutex<Vec<CompletionRequest>>,
        fail: bool,
    }

    impl FakeCompletion {
        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionClient for FakeCompletion {
        fn model(&self) -> &str {
            "test-model"
        }

        async fn complete(&self, req: CompletionRequest) -> CompletionReply {
            let prompt = req.prompt.clone();
            self.requests.lock().unwrap().push(req);
            if self.fail {
                CompletionReply::Failed(CompletionFailure::Timeout { secs: 240 })
            } else {
                CompletionReply::Text(format!("echo: {prompt}"))
            }
        }
    }

    #[derive(Default)]
    struct FakeMedia {
        downloads: AtomicUsize,
        broken: bool,
    }

    #[async_trait]
    impl MediaPort for FakeMedia {
        async fn download(&self, _file_id: &str) -> Result<Vec<u8>> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            if self.broken {
                return Err(Error::External("telegram file api down".into()));
            }
            Ok(vec![0x89, b'P', b'N', b'G'])
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        store: Arc<SqliteMembershipStore>,
        completion: Arc<FakeCompletion>,
        media: Arc<FakeMedia>,
    }

    async fn harness_with(completion: FakeCompletion, media: FakeMedia) -> Harness {
        let cfg = Config::from_lookup(|k| match k {
            "TELEGRAM_TOKEN" => Some("tg-token-value".into()),
            "OPENAI_API_KEY" => Some("sk-test-value".into()),
            "ADMIN_TELEGRAM_ID" => Some(ADMIN.0.to_string()),
            _ => None,
        })
        .unwrap();
        let store = Arc::new(SqliteMembershipStore::in_memory().await.unwrap());
        store.add(MEMBER, Some("member")).await.unwrap();
        let completion = Arc::new(completion);
        let media = Arc::new(media);
        Harness {
            dispatcher: Dispatcher::new(
                &cfg,
                store.clone(),
                completion.clone(),
                media.clone(),
            ),
            store,
            completion,
            media,
        }
    }

    async fn harness() -> Harness {
        harness_with(FakeCompletion::default(), FakeMedia::default()).await
    }

    fn command(user: UserId, text: &str) -> IncomingUpdate {
        IncomingUpdate::Command(Command::parse(ChatId(user.0), user, None, text).unwrap())
    }

    fn text(user: UserId, text: &str) -> IncomingUpdate {
        IncomingUpdate::Text(TextMessage {
            chat_id: ChatId(user.0),
            user_id: user,
            username: None,
            text: text.to_string(),
        })
    }

    fn photo(user: UserId, caption: Option<&str>) -> IncomingUpdate {
        IncomingUpdate::Photo(PhotoMessage {
            chat_id: ChatId(user.0),
            user_id: user,
            username: None,
            file_id: "file-1".to_string(),
            caption: caption.map(str::to_string),
        })
    }

    fn callback(user: UserId, data: &str) -> IncomingUpdate {
        IncomingUpdate::Callback(CallbackQuery {
            chat_id: ChatId(user.0),
            user_id: user,
            username: None,
            callback_id: "cb-1".to_string(),
            data: data.to_string(),
        })
    }

    #[tokio::test]
    async fn start_reflects_access_level() {
        let h = harness().await;
        let admin = h.dispatcher.handle(command(ADMIN, "/start")).await;
        let member = h.dispatcher.handle(command(MEMBER, "/start")).await;
        let stranger = h.dispatcher.handle(command(STRANGER, "/start")).await;
        assert!(admin.text.contains("administrator"));
        assert!(member.text.contains("forward it to OpenAI"));
        assert_eq!(stranger.text, UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_adds_and_removes_users() {
        let h = harness().await;
        let r = h.dispatcher.handle(command(ADMIN, "/add 555 carol")).await;
        assert_eq!(r.text, "User 555 added.");
        assert!(h.store.is_member(UserId(555)).await);

        let listed = h.store.list().await.unwrap();
        assert_eq!(listed[0].display_name.as_deref(), Some("carol"));

        let r = h.dispatcher.handle(command(ADMIN, "/remove 555")).await;
        assert_eq!(r.text, "User 555 removed.");
        assert!(!h.store.is_member(UserId(555)).await);
    }

    #[tokio::test]
    async fn non_integer_id_is_a_format_error() {
        let h = harness().await;
        let before = h.store.list().await.unwrap();

        let r = h.dispatcher.handle(command(ADMIN, "/add abc")).await;
        assert_eq!(r.text, ID_FORMAT_ERROR);
        let r = h.dispatcher.handle(command(ADMIN, "/remove 12x")).await;
        assert_eq!(r.text, ID_FORMAT_ERROR);

        assert_eq!(h.store.list().await.unwrap(), before);
    }

    #[tokio::test]
    async fn missing_id_shows_usage() {
        let h = harness().await;
        let r = h.dispatcher.handle(command(ADMIN, "/add")).await;
        assert!(r.text.starts_with("Usage: /add"));
        let r = h.dispatcher.handle(command(ADMIN, "/remove")).await;
        assert!(r.text.starts_with("Usage: /remove"));
    }

    #[tokio::test]
    async fn only_admin_manages_membership() {
        let h = harness().await;
        for cmd in ["/add 9", "/remove 2", "/list"] {
            let r = h.dispatcher.handle(command(MEMBER, cmd)).await;
            assert_eq!(r.text, ADMIN_ONLY, "{cmd}");
        }
        assert!(!h.store.is_member(UserId(9)).await);
        assert!(h.store.is_member(MEMBER).await);
    }

    #[tokio::test]
    async fn list_is_numbered_report() {
        let h = harness().await;
        let r = h.dispatcher.handle(command(ADMIN, "/list")).await;
        assert!(r.text.starts_with("Allowed users (1):"));
        assert!(r.text.contains("1. 2 (member)"));
    }

    #[tokio::test]
    async fn denied_caller_never_reaches_completion() {
        let h = harness().await;
        let r = h.dispatcher.handle(text(STRANGER, "hello")).await;
        assert_eq!(r.text, UNAUTHORIZED);
        let r = h.dispatcher.handle(photo(STRANGER, Some("what is this"))).await;
        assert_eq!(r.text, UNAUTHORIZED);

        assert_eq!(h.completion.calls(), 0);
        assert_eq!(h.media.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn member_text_is_relayed() {
        let h = harness().await;
        let r = h.dispatcher.handle(text(MEMBER, "what is rust?")).await;
        assert_eq!(r.text, "echo: what is rust?");

        let reqs = h.completion.requests.lock().unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].model, "test-model");
        assert!(reqs[0].image.is_none());
    }

    #[tokio::test]
    async fn admin_without_membership_can_relay() {
        let h = harness().await;
        assert!(!h.store.is_member(ADMIN).await);
        let r = h.dispatcher.handle(text(ADMIN, "ping")).await;
        assert_eq!(r.text, "echo: ping");
    }

    #[tokio::test]
    async fn photo_without_caption_uses_default_prompt() {
        let h = harness().await;
        let r = h.dispatcher.handle(photo(MEMBER, None)).await;
        assert_eq!(r.text, format!("echo: {DEFAULT_IMAGE_PROMPT}"));

        let r = h.dispatcher.handle(photo(MEMBER, Some("   "))).await;
        assert_eq!(r.text, format!("echo: {DEFAULT_IMAGE_PROMPT}"));

        let reqs = h.completion.requests.lock().unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].image.as_ref().unwrap().bytes, vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn photo_caption_becomes_prompt() {
        let h = harness().await;
        let r = h.dispatcher.handle(photo(MEMBER, Some("count the cats"))).await;
        assert_eq!(r.text, "echo: count the cats");
        assert_eq!(h.media.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn download_failure_is_a_reply() {
        let h = harness_with(
            FakeCompletion::default(),
            FakeMedia {
                broken: true,
                ..Default::default()
            },
        )
        .await;
        let r = h.dispatcher.handle(photo(MEMBER, None)).await;
        assert!(r.text.contains("Failed to download the image"));
        assert_eq!(h.completion.calls(), 0);
    }

    #[tokio::test]
    async fn upstream_failure_is_a_reply() {
        let h = harness_with(
            FakeCompletion {
                fail: true,
                ..Default::default()
            },
            FakeMedia::default(),
        )
        .await;
        let r = h.dispatcher.handle(text(MEMBER, "hi")).await;
        assert!(r.text.contains("timed out"));
    }

    #[tokio::test]
    async fn menu_and_buttons() {
        let h = harness().await;
        let admin_menu = h.dispatcher.handle(command(ADMIN, "/menu")).await;
        let member_menu = h.dispatcher.handle(command(MEMBER, "/menu")).await;
        assert_eq!(admin_menu.keyboard.unwrap().buttons.len(), 3);
        assert_eq!(member_menu.keyboard.unwrap().buttons.len(), 2);

        let r = h.dispatcher.handle(callback(STRANGER, CB_MYID)).await;
        assert_eq!(r.text, "Your Telegram ID: 3");
        let r = h.dispatcher.handle(callback(MEMBER, CB_LIST)).await;
        assert_eq!(r.text, ADMIN_ONLY);
        let r = h.dispatcher.handle(callback(ADMIN, CB_LIST)).await;
        assert!(r.text.contains("1. 2 (member)"));
        let r = h.dispatcher.handle(callback(ADMIN, "bogus")).await;
        assert_eq!(r.text, "Unknown action.");
    }

    #[tokio::test]
    async fn help_hides_admin_commands_from_members() {
        let h = harness().await;
        let admin = h.dispatcher.handle(command(ADMIN, "/help")).await;
        let member = h.dispatcher.handle(command(MEMBER, "/help")).await;
        assert!(admin.text.contains("/add"));
        assert!(!member.text.contains("/add"));
    }

    #[tokio::test]
    async fn myid_and_unknown_commands() {
        let h = harness().await;
        let r = h.dispatcher.handle(command(STRANGER, "/myid")).await;
        assert_eq!(r.text, "Your Telegram ID: 3");
        let r = h.dispatcher.handle(command(MEMBER, "/frobnicate")).await;
        assert_eq!(r.text, "Unknown command. See /help.");
    }
}
