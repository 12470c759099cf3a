use async_trait::async_trait;
use convert_client::fake::{FakeApi, FakeBehavior};
use convert_client::{Client, ClientConfig, ConvertedTrack, FailureKind};
use spotify_bot::relay::{
    DELIVERY_FAILURE_TEXT, FAILURE_TEXT, PROGRESS_TEXT, SUCCESS_TEXT, USAGE_TEXT, WELCOME_TEXT,
};
use spotify_bot::{ChatSink, DeliveryError, Failure, Outcome, Relay};
use std::sync::Mutex;
use std::time::Duration;
use teloxide::types::{ChatId, MessageId};

const TRACK_URL: &str = "https://open.spotify.com/track/abc123";
const CHAT: ChatId = ChatId(42);

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text(String),
    Edit(MessageId, String),
    Audio { file_name: String, bytes: usize },
}

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(ChatId, Sent)>>,
    fail_audio: bool,
    fail_edits: bool,
}

impl RecordingSink {
    fn sent(&self) -> Vec<(ChatId, Sent)> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_to(&self, chat: ChatId) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| *to == chat)
            .map(|(_, sent)| sent)
            .collect()
    }

    fn count_text(&self, text: &str) -> usize {
        self.sent()
            .iter()
            .filter(|(_, sent)| match sent {
                Sent::Text(t) | Sent::Edit(_, t) => t == text,
                Sent::Audio { .. } => false,
            })
            .count()
    }

    fn audio_count(&self) -> usize {
        self.sent()
            .iter()
            .filter(|(_, sent)| matches!(sent, Sent::Audio { .. }))
            .count()
    }

    fn push(&self, chat: ChatId, sent: Sent) -> MessageId {
        let mut log = self.sent.lock().unwrap();
        log.push((chat, sent));
        MessageId(log.len() as i32)
    }
}

#[async_trait]
impl ChatSink for RecordingSink {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId, DeliveryError> {
        Ok(self.push(chat, Sent::Text(text.to_owned())))
    }

    async fn edit_text(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
    ) -> Result<(), DeliveryError> {
        if self.fail_edits {
            return Err(DeliveryError::Timeout);
        }
        self.push(chat, Sent::Edit(message, text.to_owned()));
        Ok(())
    }

    async fn send_audio(
        &self,
        chat: ChatId,
        track: &ConvertedTrack,
    ) -> Result<(), DeliveryError> {
        if self.fail_audio {
            return Err(DeliveryError::Timeout);
        }
        self.push(
            chat,
            Sent::Audio {
                file_name: track.file_name.clone(),
                bytes: track.audio.len(),
            },
        );
        Ok(())
    }
}

async fn relay_with(behavior: FakeBehavior) -> (FakeApi, Relay) {
    let api = FakeApi::start(behavior).await.unwrap();
    let mut config = ClientConfig::new("test-key").with_api(api.endpoint(), api.host());
    config.convert_timeout = Duration::from_millis(300);
    let client = Client::new(config).unwrap();
    (api, Relay::new(client, "spotify_test_bot"))
}

fn success() -> FakeBehavior {
    FakeBehavior::Success {
        audio: vec![0xFF; 1024],
    }
}

#[tokio::test]
async fn valid_link_delivers_one_audio_file() {
    let (api, relay) = relay_with(success()).await;
    let sink = RecordingSink::default();

    let outcome = relay.handle_text(&sink, CHAT, TRACK_URL).await;

    assert_eq!(outcome, Outcome::Delivered);
    assert_eq!(api.convert_calls().len(), 1);
    assert_eq!(
        sink.sent_to(CHAT),
        vec![
            Sent::Text(PROGRESS_TEXT.to_owned()),
            Sent::Audio {
                file_name: "Track_abc123.mp3".to_owned(),
                bytes: 1024
            },
            Sent::Edit(MessageId(1), SUCCESS_TEXT.to_owned()),
        ]
    );
    assert_eq!(sink.count_text(FAILURE_TEXT), 0);
}

#[tokio::test]
async fn link_inside_other_text_is_found() {
    let (api, relay) = relay_with(success()).await;
    let sink = RecordingSink::default();

    let text = format!("check this out {TRACK_URL}?si=xYz123 thanks");
    let outcome = relay.handle_text(&sink, CHAT, &text).await;

    assert_eq!(outcome, Outcome::Delivered);
    let calls = api.convert_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].query.get("urls").map(String::as_str),
        Some("https://open.spotify.com/track/abc123?si=xYz123")
    );
    assert!(sink.sent_to(CHAT).contains(&Sent::Audio {
        file_name: "Track_abc123.mp3".to_owned(),
        bytes: 1024
    }));
}

#[tokio::test]
async fn non_link_gets_usage_hint_and_no_http_call() {
    let (api, relay) = relay_with(success()).await;
    let sink = RecordingSink::default();

    let outcome = relay.handle_text(&sink, CHAT, "not a url").await;

    assert_eq!(outcome, Outcome::Rejected);
    assert_eq!(sink.sent_to(CHAT), vec![Sent::Text(USAGE_TEXT.to_owned())]);
    assert!(api.convert_calls().is_empty());
    assert!(api.download_calls().is_empty());
}

#[tokio::test]
async fn album_link_is_rejected() {
    let (api, relay) = relay_with(success()).await;
    let sink = RecordingSink::default();

    let outcome = relay
        .handle_text(&sink, CHAT, "https://open.spotify.com/album/abc123")
        .await;

    assert_eq!(outcome, Outcome::Rejected);
    assert!(api.convert_calls().is_empty());
}

#[tokio::test]
async fn server_error_yields_exactly_one_failure_message() {
    let (api, relay) = relay_with(FakeBehavior::ConvertStatus(500)).await;
    let sink = RecordingSink::default();

    let outcome = relay.handle_text(&sink, CHAT, TRACK_URL).await;

    assert_eq!(
        outcome,
        Outcome::Failed(Failure::Conversion(FailureKind::UpstreamError))
    );
    assert_eq!(api.convert_calls().len(), 1);
    assert_eq!(sink.count_text(FAILURE_TEXT), 1);
    assert_eq!(sink.audio_count(), 0);
}

#[tokio::test]
async fn timeout_yields_failure_message_not_raw_error() {
    let (_api, relay) = relay_with(FakeBehavior::SlowConvert(Duration::from_secs(5))).await;
    let sink = RecordingSink::default();

    let outcome = relay.handle_text(&sink, CHAT, TRACK_URL).await;

    assert_eq!(
        outcome,
        Outcome::Failed(Failure::Conversion(FailureKind::UpstreamTimeout))
    );
    assert_eq!(
        sink.sent_to(CHAT),
        vec![
            Sent::Text(PROGRESS_TEXT.to_owned()),
            Sent::Edit(MessageId(1), FAILURE_TEXT.to_owned()),
        ]
    );
}

#[tokio::test]
async fn malformed_response_is_reported() {
    let (_api, relay) = relay_with(FakeBehavior::MissingPayload).await;
    let sink = RecordingSink::default();

    let outcome = relay.handle_text(&sink, CHAT, TRACK_URL).await;

    assert_eq!(
        outcome,
        Outcome::Failed(Failure::Conversion(
            FailureKind::UpstreamMalformedResponse
        ))
    );
    assert_eq!(sink.count_text(FAILURE_TEXT), 1);
}

#[tokio::test]
async fn failure_text_is_sent_fresh_when_edit_fails() {
    let (_api, relay) = relay_with(FakeBehavior::ConvertStatus(502)).await;
    let sink = RecordingSink {
        fail_edits: true,
        ..Default::default()
    };

    relay.handle_text(&sink, CHAT, TRACK_URL).await;

    assert_eq!(
        sink.sent_to(CHAT),
        vec![
            Sent::Text(PROGRESS_TEXT.to_owned()),
            Sent::Text(FAILURE_TEXT.to_owned()),
        ]
    );
}

#[tokio::test]
async fn upload_failure_reports_delivery_error() {
    let (_api, relay) = relay_with(success()).await;
    let sink = RecordingSink {
        fail_audio: true,
        ..Default::default()
    };

    let outcome = relay.handle_text(&sink, CHAT, TRACK_URL).await;

    assert_eq!(outcome, Outcome::Failed(Failure::Delivery));
    assert_eq!(sink.count_text(DELIVERY_FAILURE_TEXT), 1);
    assert_eq!(sink.count_text(FAILURE_TEXT), 0);
}

#[tokio::test]
async fn start_command_greets_without_http_call() {
    let (api, relay) = relay_with(success()).await;
    let sink = RecordingSink::default();

    let outcome = relay.handle_text(&sink, CHAT, "/start").await;

    assert_eq!(outcome, Outcome::Command);
    assert_eq!(sink.sent_to(CHAT), vec![Sent::Text(WELCOME_TEXT.to_owned())]);
    assert!(api.convert_calls().is_empty());
}

#[tokio::test]
async fn help_lists_commands() {
    let (_api, relay) = relay_with(success()).await;
    let sink = RecordingSink::default();

    relay.handle_text(&sink, CHAT, "/help").await;

    match sink.sent_to(CHAT).as_slice() {
        [Sent::Text(text)] => assert!(text.contains("/start"), "{text}"),
        other => panic!("unexpected replies: {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_chats_each_get_their_own_file() {
    let (api, relay) = relay_with(success()).await;
    let sink = RecordingSink::default();
    let chats = [ChatId(1), ChatId(2), ChatId(3)];

    let outcomes = tokio::join!(
        relay.handle_text(&sink, chats[0], TRACK_URL),
        relay.handle_text(&sink, chats[1], TRACK_URL),
        relay.handle_text(&sink, chats[2], TRACK_URL),
    );

    assert_eq!(
        outcomes,
        (Outcome::Delivered, Outcome::Delivered, Outcome::Delivered)
    );
    assert_eq!(api.convert_calls().len(), chats.len());
    for chat in chats {
        let audio = sink
            .sent_to(chat)
            .into_iter()
            .filter(|sent| matches!(sent, Sent::Audio { .. }))
            .count();
        assert_eq!(audio, 1, "chat {chat:?}");
    }
}
