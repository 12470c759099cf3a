use async_trait::async_trait;
use convert_client::ConvertedTrack;
use teloxide::types::{ChatId, MessageId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("telegram call timed out")]
    Timeout,

    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
}

/// Outbound side of a chat. Every reply the bot makes goes through here.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId, DeliveryError>;

    async fn edit_text(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
    ) -> Result<(), DeliveryError>;

    async fn send_audio(&self, chat: ChatId, track: &ConvertedTrack)
        -> Result<(), DeliveryError>;
}
