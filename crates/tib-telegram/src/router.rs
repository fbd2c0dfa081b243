use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::BotCommand};
use tracing::{info, warn};

use tib_core::{
    config::Config, dispatch, messaging::port::MessagingPort, model::client::CompletionClient,
    store::MembershipStore,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<dispatch::Dispatcher>,
    pub messenger: Arc<dyn MessagingPort>,
    /// Our own `@username`, for `/cmd@bot` filtering.
    pub bot_username: String,
}

pub fn bot_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "Check your access"),
        BotCommand::new("menu", "Quick actions"),
        BotCommand::new("myid", "Show your Telegram ID"),
        BotCommand::new("help", "How to use the bot"),
        BotCommand::new("add", "Admin: allow a user"),
        BotCommand::new("remove", "Admin: revoke a user"),
        BotCommand::new("list", "Admin: list allowed users"),
    ]
}

pub async fn run_polling(
    cfg: Arc<Config>,
    store: Arc<dyn MembershipStore>,
    completion: Arc<dyn CompletionClient>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_token.clone());

    // Fails fast on a bad token.
    let me = bot.get_me().await?;
    info!(username = %me.username(), admin_id = cfg.admin_id.0, "bot started");

    if let Err(e) = bot.set_my_commands(bot_commands()).await {
        warn!(error = %e, "failed to register bot commands");
    }

    let messenger = Arc::new(TelegramMessenger::new(bot.clone(), cfg.message_limit));
    let dispatcher = Arc::new(dispatch::Dispatcher::new(
        &cfg,
        store,
        completion,
        messenger.clone(),
    ));

    let state = Arc::new(AppState {
        dispatcher,
        messenger,
        bot_username: me.username().to_string(),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    info!("polling for updates");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    info!("polling stopped");
    Ok(())
}
