use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    /// Registration-time misconfiguration. Never reaches an end user.
    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown streaming callback: {0}")]
    UnknownCallback(String),

    #[error("Client does not accept text/event-stream")]
    NotAcceptable,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Timeout for callback: {callback} | {callback_id}")]
    Timeout { callback: String, callback_id: String },

    #[error("Producer error: {0}")]
    Producer(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StreamError {
    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::UnknownCallback(_) => "unknown_callback",
            Self::NotAcceptable => "not_acceptable",
            Self::BadRequest(_) => "bad_request",
            Self::Timeout { .. } => "timeout",
            Self::Producer(_) => "producer",
            Self::Codec(_) => "codec",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
