use thiserror::Error;

#[derive(Error, Debug)]
pub enum FollowScoutError {
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Identifier not found for {0}")]
    NotFound(String),

    #[error("No candidates harvested")]
    NoCandidates,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session rejected by the service: {0}")]
    SessionRejected(String),

    #[error("Busy: a {0} is already in progress")]
    Busy(String),

    #[error("Nothing pending: scan a target first")]
    NothingPending,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
