use thiserror::Error;

/// Core error type for stratchat.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
#[derive(Debug, Error)]
pub enum StratChatError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// A new streaming session was requested while the previous one for the
    /// same widget was still open.
    #[error("a streaming session is already open for this widget")]
    SessionBusy,

    /// Network-level failure: connect refused, reset mid-stream, timeout.
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// The backend answered with a non-2xx status.
    #[error("server error: {code} {message}")]
    Server { code: String, message: String },

    /// A response body (or the double-encoded strategy JSON inside one)
    /// did not parse.
    #[error("decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CoreResult<T> = std::result::Result<T, StratChatError>;

impl StratChatError {
    /// Stable label used in turn logs and tracing events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::SessionBusy => "session_busy",
            Self::Transport { .. } => "transport",
            Self::Server { .. } => "server",
            Self::Decode(_) => "decode",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}
