use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::instrument;

use spotify_bot::config::Args;
use spotify_bot::telegram::TelegramSink;
use spotify_bot::{Command, Relay};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    tracing::info!("Starting Spotify relay bot with {:?}", args);
    let config = args.into_config();

    let client = convert_client::Client::new(config.client)
        .context("Failed to build conversion client")?;

    // Uploads of large MP3s outlive teloxide's default request timeout.
    let http = teloxide::net::default_reqwest_settings()
        .timeout(config.upload_timeout)
        .build()
        .context("Failed to build Telegram HTTP client")?;
    let bot = Bot::with_client(config.tg_token, http);

    let bot_info = bot
        .get_me()
        .await
        .context("Failed to reach Telegram, check TELEGRAM_TOKEN")?;
    tracing::info!("Started bot: {:?}", bot_info.user.username);

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        tracing::warn!("Could not register bot commands: {:?}", e);
    }

    let relay = Arc::new(Relay::new(client, bot_info.username()));
    let upload_timeout = config.upload_timeout;

    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        let relay = relay.clone();
        async move {
            bot_msg_handler(bot, msg, relay, upload_timeout).await;
            Ok(())
        }
    })
    .await;

    tracing::info!("Bot shutdown");
    Ok(())
}

#[instrument(skip_all, fields(user, message_id = msg.id.0))]
async fn bot_msg_handler(bot: Bot, msg: Message, relay: Arc<Relay>, upload_timeout: Duration) {
    let user = msg.from().and_then(|user| user.username.clone());
    tracing::Span::current().record("user", user.as_deref());

    let Some(text) = msg.text() else {
        tracing::info!("Ignoring non-text message");
        return;
    };

    let sink = TelegramSink::new(bot, upload_timeout);
    relay.handle_text(&sink, msg.chat.id, text).await;
}
