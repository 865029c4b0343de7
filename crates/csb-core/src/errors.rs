/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this taxonomy so handlers
/// can render a precise user-facing message and decide whether a retry makes
/// sense. `Persistence` during a session commit is the one retryable case:
/// the upload session stays intact so the caller can commit again.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("upload session has no files")]
    EmptySession,

    #[error("malformed action token: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Persistence(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
