use crate::delivery::ChatSink;
use crate::validator;
use convert_client::{Client, FailureKind};
use teloxide::types::{ChatId, MessageId};
use teloxide::utils::command::BotCommands;
use tracing::{instrument, Span};

pub const WELCOME_TEXT: &str = "Hello! I am your Spotify Music Downloader Bot. 🎵\n\n\
    Send me a direct Spotify track URL, and I will try to download the MP3 file for you.";
pub const USAGE_TEXT: &str = "That doesn't look like a valid Spotify track URL. \
    Please send a link that starts with https://open.spotify.com/track/...";
pub const PROGRESS_TEXT: &str =
    "⏳ Connecting to download API and fetching track... This may take a moment.";
pub const SUCCESS_TEXT: &str = "✅ Download successful! Sending your audio file now.";
pub const FAILURE_TEXT: &str = "❌ Download Failed. The external API could not process the request \
    or I failed to connect. This could be due to an invalid link, an API error, \
    or the request timing out. Please try again later.";
pub const DELIVERY_FAILURE_TEXT: &str =
    "❌ Error: I downloaded the file but failed to upload it to Telegram. Please try again later.";

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "show the welcome message.")]
    Start,
    #[command(description = "show this help.")]
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Conversion(FailureKind),
    Delivery,
}

/// Terminal state of one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Command,
    Rejected,
    Delivered,
    Failed(Failure),
}

/// Per-message pipeline: validate, convert, deliver. Holds no mutable
/// state, so one instance is shared by every handler task.
#[derive(Debug, Clone)]
pub struct Relay {
    client: Client,
    bot_username: String,
}

impl Relay {
    pub fn new(client: Client, bot_username: impl Into<String>) -> Self {
        Self {
            client,
            bot_username: bot_username.into(),
        }
    }

    #[instrument(skip_all, fields(chat_id = chat.0, outcome))]
    pub async fn handle_text(&self, sink: &dyn ChatSink, chat: ChatId, text: &str) -> Outcome {
        let outcome = match Command::parse(text, &self.bot_username) {
            Ok(command) => {
                self.run_command(sink, chat, command).await;
                Outcome::Command
            }
            Err(_) => match validator::find_track_url(text) {
                Some(track) => {
                    tracing::info!(track_id = track.id, "Relaying track");
                    self.relay_track(sink, chat, track.url, track.id).await
                }
                None => {
                    reply(sink, chat, USAGE_TEXT).await;
                    Outcome::Rejected
                }
            },
        };

        Span::current().record("outcome", tracing::field::debug(&outcome));
        tracing::info!("Message handled");
        outcome
    }

    async fn run_command(&self, sink: &dyn ChatSink, chat: ChatId, command: Command) {
        match command {
            Command::Start => reply(sink, chat, WELCOME_TEXT).await,
            Command::Help => reply(sink, chat, &Command::descriptions().to_string()).await,
        }
    }

    async fn relay_track(
        &self,
        sink: &dyn ChatSink,
        chat: ChatId,
        url: &str,
        track_id: &str,
    ) -> Outcome {
        let status = match sink.send_text(chat, PROGRESS_TEXT).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Could not send progress message: {:?}", e);
                None
            }
        };

        let track = match self.client.convert(url, track_id).await {
            Ok(track) => track,
            Err(e) => {
                tracing::error!(kind = %e.kind(), "Conversion failed: {}", e);
                update_status(sink, chat, status, FAILURE_TEXT).await;
                return Outcome::Failed(Failure::Conversion(e.kind()));
            }
        };

        if let Err(e) = sink.send_audio(chat, &track).await {
            tracing::error!("Failed to send audio via Telegram: {:?}", e);
            update_status(sink, chat, status, DELIVERY_FAILURE_TEXT).await;
            return Outcome::Failed(Failure::Delivery);
        }

        if let Some(status) = status {
            if let Err(e) = sink.edit_text(chat, status, SUCCESS_TEXT).await {
                tracing::warn!("Could not update progress message: {:?}", e);
            }
        }
        Outcome::Delivered
    }
}

/// Rewrites the progress message, or posts `text` fresh when there is none
/// or the edit fails.
async fn update_status(sink: &dyn ChatSink, chat: ChatId, status: Option<MessageId>, text: &str) {
    if let Some(message) = status {
        match sink.edit_text(chat, message, text).await {
            Ok(()) => return,
            Err(e) => tracing::warn!("Could not edit progress message: {:?}", e),
        }
    }
    reply(sink, chat, text).await;
}

async fn reply(sink: &dyn ChatSink, chat: ChatId, text: &str) {
    if let Err(e) = sink.send_text(chat, text).await {
        tracing::error!("Error sending message: {:?}", e);
    }
}
