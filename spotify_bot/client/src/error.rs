use reqwest::StatusCode;
use strum::Display;
use thiserror::Error;

/// Which of the two HTTP calls a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Convert,
    Download,
}

/// Coarse failure class the bot reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FailureKind {
    UpstreamTimeout,
    UpstreamError,
    UpstreamMalformedResponse,
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("request timed out during {stage}")]
    Timeout { stage: Stage },

    #[error("network error during {stage}: {source}")]
    Network {
        stage: Stage,
        #[source]
        source: reqwest::Error,
    },

    #[error("conversion API returned {status} during {stage}: {body}")]
    Status {
        stage: Stage,
        status: StatusCode,
        body: String,
    },

    #[error("conversion API rejected the track: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("audio file exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl ConvertError {
    pub(crate) fn from_reqwest(stage: Stage, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ConvertError::Timeout { stage }
        } else {
            ConvertError::Network { stage, source }
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ConvertError::Timeout { .. } => FailureKind::UpstreamTimeout,
            ConvertError::Malformed(_) => FailureKind::UpstreamMalformedResponse,
            ConvertError::Network { .. }
            | ConvertError::Status { .. }
            | ConvertError::Rejected(_)
            | ConvertError::TooLarge { .. }
            | ConvertError::Config(_) => FailureKind::UpstreamError,
        }
    }
}
