use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphClientError>;

#[derive(Debug, Error)]
pub enum GraphClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited by the service")]
    RateLimited,

    #[error("Session rejected (status {status})")]
    Unauthorized { status: u16 },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl GraphClientError {
    /// Errors after which no further request with the same session can succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GraphClientError::Unauthorized { .. })
    }
}

impl From<reqwest::Error> for GraphClientError {
    fn from(err: reqwest::Error) -> Self {
        GraphClientError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for GraphClientError {
    fn from(err: serde_json::Error) -> Self {
        GraphClientError::Parse(err.to_string())
    }
}
