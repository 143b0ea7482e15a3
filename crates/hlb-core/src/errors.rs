/// Core error type for the lounge bot.
///
/// Adapter crates map their specific errors into this type so the dispatcher
/// can record failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// Network/TLS failure (or timeout) reaching the platform or a third party.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote service answered, but reported failure.
    #[error("api error calling {method}: {description} (code {code:?})")]
    Api {
        method: String,
        code: Option<i64>,
        description: String,
    },

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn api(method: impl Into<String>, code: Option<i64>, description: impl Into<String>) -> Self {
        Self::Api {
            method: method.into(),
            code,
            description: description.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
