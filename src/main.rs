use std::sync::Arc;

use anyhow::Context as _;
use park_bot::{
    bot::{telegram, Authorizer, CommandHandler},
    Config, Portal,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Init logger
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!("starting park-bot");

    let config = Config::from_env().context("Failed to load config")?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to init tokio runtime")?
        .block_on(async move {
            let bot = Arc::new(telegram::TelegramBot::new(config.telegram)?);
            let bot_name = bot
                .validate()
                .await
                .context("Telegram bot token was rejected")?;
            info!("Polling as @{bot_name}");

            let authorizer = Authorizer::new(config.authorized_user_ids);
            let portal = Portal::new(config.portal).context("Failed to set up portal")?;
            let handler =
                Arc::new(CommandHandler::new(portal, authorizer).with_bot_name(bot_name));

            telegram::run(bot, handler, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for ctrl-c - {e}");
                    std::future::pending::<()>().await;
                }
            })
            .await
        })
}
