use crate::delivery::{ChatSink, DeliveryError};
use async_trait::async_trait;
use convert_client::ConvertedTrack;
use std::future::Future;
use std::time::Duration;
use teloxide::payloads::SendAudioSetters;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId};

/// [`ChatSink`] backed by the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramSink {
    bot: Bot,
    timeout: Duration,
}

impl TelegramSink {
    pub fn new(bot: Bot, timeout: Duration) -> Self {
        Self { bot, timeout }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, DeliveryError>
    where
        F: Future<Output = Result<T, teloxide::RequestError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| DeliveryError::Timeout)?
            .map_err(DeliveryError::from)
    }
}

#[async_trait]
impl ChatSink for TelegramSink {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId, DeliveryError> {
        let sent = self
            .bounded(self.bot.send_message(chat, text).send())
            .await?;
        Ok(sent.id)
    }

    async fn edit_text(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
    ) -> Result<(), DeliveryError> {
        self.bounded(self.bot.edit_message_text(chat, message, text).send())
            .await?;
        Ok(())
    }

    async fn send_audio(
        &self,
        chat: ChatId,
        track: &ConvertedTrack,
    ) -> Result<(), DeliveryError> {
        let file = InputFile::memory(track.audio.clone()).file_name(track.file_name.clone());
        self.bounded(self.bot.send_audio(chat, file).title(track.track_name.clone()).send())
            .await?;
        Ok(())
    }
}
