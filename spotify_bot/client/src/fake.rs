//! In-process stand-in for the conversion API. It speaks the same two-step
//! protocol as the real provider and records every call it receives.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const FAKE_PAYLOAD: &str = "fake-payload-token";

#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// Both steps succeed and the download serves `audio`.
    Success { audio: Vec<u8> },
    /// The convert step answers with this status code.
    ConvertStatus(u16),
    /// The convert step answers `{"error": true, "message": ...}`.
    ApiError(String),
    /// The convert step returns a `url` without a `payload`.
    MissingPayload,
    /// The convert step returns a body that is not JSON.
    NotJson,
    /// The convert step stalls before answering.
    SlowConvert(Duration),
    /// The download step answers with this status code.
    DownloadStatus(u16),
    /// The download step sends headers and a first chunk, then the body
    /// never finishes.
    StalledDownload,
}

#[derive(Debug, Clone, Default)]
pub struct RecordedCall {
    pub query: HashMap<String, String>,
    pub api_key: Option<String>,
    pub host: Option<String>,
}

struct FakeState {
    behavior: FakeBehavior,
    base_url: String,
    convert_calls: Mutex<Vec<RecordedCall>>,
    download_calls: Mutex<Vec<RecordedCall>>,
}

pub struct FakeApi {
    addr: SocketAddr,
    state: Arc<FakeState>,
    server: JoinHandle<()>,
}

impl FakeApi {
    pub async fn start(behavior: FakeBehavior) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(FakeState {
            behavior,
            base_url: format!("http://{addr}"),
            convert_calls: Mutex::new(Vec::new()),
            download_calls: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/convert", post(convert))
            .route("/download", get(download))
            .with_state(state.clone());

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Fake conversion API stopped: {:?}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            server,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/convert", self.addr)
    }

    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn convert_calls(&self) -> Vec<RecordedCall> {
        lock(&self.state.convert_calls).clone()
    }

    pub fn download_calls(&self) -> Vec<RecordedCall> {
        lock(&self.state.download_calls).clone()
    }
}

impl Drop for FakeApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn lock(calls: &Mutex<Vec<RecordedCall>>) -> std::sync::MutexGuard<'_, Vec<RecordedCall>> {
    calls.lock().unwrap_or_else(PoisonError::into_inner)
}

fn record(headers: &HeaderMap, query: HashMap<String, String>) -> RecordedCall {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    };
    RecordedCall {
        query,
        api_key: header("x-rapidapi-key"),
        host: header("x-rapidapi-host"),
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn convert(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    lock(&state.convert_calls).push(record(&headers, query));

    let download_url = format!("{}/download", state.base_url);
    match &state.behavior {
        FakeBehavior::ConvertStatus(code) => (status(*code), "upstream failure").into_response(),
        FakeBehavior::ApiError(message) => {
            Json(serde_json::json!({ "error": true, "message": message })).into_response()
        }
        FakeBehavior::MissingPayload => {
            Json(serde_json::json!({ "error": false, "url": download_url })).into_response()
        }
        FakeBehavior::NotJson => "<html>down for maintenance</html>".into_response(),
        FakeBehavior::SlowConvert(delay) => {
            tokio::time::sleep(*delay).await;
            accepted(&download_url)
        }
        FakeBehavior::Success { .. }
        | FakeBehavior::DownloadStatus(_)
        | FakeBehavior::StalledDownload => accepted(&download_url),
    }
}

fn accepted(download_url: &str) -> Response {
    Json(serde_json::json!({
        "error": false,
        "url": download_url,
        "payload": FAKE_PAYLOAD,
        "quota": { "remaining": 99 },
    }))
    .into_response()
}

async fn download(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    lock(&state.download_calls).push(record(&headers, query));

    match &state.behavior {
        FakeBehavior::Success { audio } => {
            ([(header::CONTENT_TYPE, "audio/mpeg")], audio.clone()).into_response()
        }
        FakeBehavior::DownloadStatus(code) => (status(*code), "gone").into_response(),
        FakeBehavior::StalledDownload => {
            let body = stream::once(async { Ok::<_, std::io::Error>(vec![0xFF_u8; 64]) })
                .chain(stream::pending());
            ([(header::CONTENT_TYPE, "audio/mpeg")], Body::from_stream(body)).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
