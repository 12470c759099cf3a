mod error;
#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use error::{ConvertError, FailureKind, Stage};

use futures_util::StreamExt;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Debug;
use std::time::Duration;
use tracing::instrument;

pub const DEFAULT_ENDPOINT: &str = "https://spotify-downloader12.p.rapidapi.com/convert";
pub const DEFAULT_HOST: &str = "spotify-downloader12.p.rapidapi.com";
/// Telegram refuses bot uploads above 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

const MAX_LOGGED_BODY: usize = 512;

#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub endpoint: String,
    pub host: String,
    pub convert_timeout: Duration,
    pub download_timeout: Duration,
    pub max_file_size: u64,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            host: DEFAULT_HOST.to_owned(),
            convert_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(60),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    pub fn with_api(mut self, endpoint: impl Into<String>, host: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self.host = host.into();
        self
    }
}

impl Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("host", &self.host)
            .field("convert_timeout", &self.convert_timeout)
            .field("download_timeout", &self.download_timeout)
            .field("max_file_size", &self.max_file_size)
            .finish_non_exhaustive()
    }
}

/// First-step answer. The provider adds fields at will, so everything is
/// optional and unknown keys are ignored.
#[derive(Deserialize, Debug)]
struct ConvertResponse {
    #[serde(default)]
    error: Value,
    #[serde(default)]
    message: Value,
    url: Option<String>,
    payload: Option<String>,
}

#[derive(Clone)]
pub struct ConvertedTrack {
    pub track_name: String,
    pub file_name: String,
    pub audio: Vec<u8>,
}

impl Debug for ConvertedTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvertedTrack")
            .field("file_name", &self.file_name)
            .field("bytes", &self.audio.len())
            .finish()
    }
}

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    endpoint: Url,
    config: ClientConfig,
}

impl Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ConvertError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            ConvertError::Config(format!("endpoint {:?}: {e}", config.endpoint))
        })?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ConvertError::Config(e.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            config,
        })
    }

    /// Converts a track URL into an MP3. One attempt: a convert call that
    /// yields a download link, then the download itself. `track_id` names
    /// the resulting file.
    #[instrument(skip_all, fields(url = spotify_url))]
    pub async fn convert(
        &self,
        spotify_url: &str,
        track_id: &str,
    ) -> Result<ConvertedTrack, ConvertError> {
        tracing::info!("Requesting conversion");
        let (download_url, payload) = self.request_conversion(spotify_url).await?;

        tracing::info!("Conversion accepted, downloading audio");
        let audio = self.download(&download_url, &payload).await?;

        let track_name = format!("Track_{track_id}");
        let file_name = format!("{track_name}.mp3");
        tracing::info!(
            "Downloaded {} ({:.2} MB)",
            file_name,
            audio.len() as f64 / (1024.0 * 1024.0)
        );

        Ok(ConvertedTrack {
            track_name,
            file_name,
            audio,
        })
    }

    async fn request_conversion(&self, spotify_url: &str) -> Result<(String, String), ConvertError> {
        let stage = Stage::Convert;
        let response = self
            .http
            .post(self.endpoint.clone())
            .query(&[("urls", spotify_url)])
            .header("x-rapidapi-key", &self.config.api_key)
            .header("x-rapidapi-host", &self.config.host)
            .json(&serde_json::json!({}))
            .timeout(self.config.convert_timeout)
            .send()
            .await
            .map_err(|e| ConvertError::from_reqwest(stage, e))?;

        let response = check_status(stage, response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| ConvertError::from_reqwest(stage, e))?;

        parse_conversion(&body)
    }

    async fn download(&self, url: &str, payload: &str) -> Result<Vec<u8>, ConvertError> {
        let stage = Stage::Download;
        let url = Url::parse(url)
            .map_err(|e| ConvertError::Malformed(format!("download url {url:?}: {e}")))?;

        let response = self
            .http
            .get(url)
            .query(&[("payload", payload)])
            .timeout(self.config.download_timeout)
            .send()
            .await
            .map_err(|e| ConvertError::from_reqwest(stage, e))?;
        let response = check_status(stage, response).await?;

        let limit = self.config.max_file_size;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(ConvertError::TooLarge { limit });
        }

        let capacity = response.content_length().unwrap_or(0).min(limit) as usize;
        let mut audio = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ConvertError::from_reqwest(stage, e))?;
            if (audio.len() + chunk.len()) as u64 > limit {
                return Err(ConvertError::TooLarge { limit });
            }
            audio.extend_from_slice(&chunk);
        }

        if audio.is_empty() {
            return Err(ConvertError::Malformed("empty audio download".to_owned()));
        }
        Ok(audio)
    }
}

async fn check_status(
    stage: Stage,
    response: reqwest::Response,
) -> Result<reqwest::Response, ConvertError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body = truncate(&body).to_owned();
    tracing::error!(%status, %body, "Conversion API error during {stage}");
    Err(ConvertError::Status {
        stage,
        status,
        body,
    })
}

fn parse_conversion(body: &str) -> Result<(String, String), ConvertError> {
    let response: ConvertResponse = serde_json::from_str(body)
        .map_err(|e| ConvertError::Malformed(format!("{e}: {}", truncate(body))))?;

    if response.error == Value::Bool(true) {
        let message = response
            .message
            .as_str()
            .unwrap_or("no error message")
            .to_owned();
        return Err(ConvertError::Rejected(message));
    }

    let url = response
        .url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ConvertError::Malformed("response has no `url`".to_owned()))?;
    let payload = response
        .payload
        .filter(|payload| !payload.is_empty())
        .ok_or_else(|| ConvertError::Malformed("response has no `payload`".to_owned()))?;

    Ok((url, payload))
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_LOGGED_BODY) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}
