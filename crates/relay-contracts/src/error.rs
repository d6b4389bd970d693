use thiserror::Error;

pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Failure kinds surfaced by the relay core.
///
/// HTTP and I/O plumbing builds `anyhow` chains with context; they are
/// classified into one of these variants where the remote service boundary is
/// crossed, so callers can tell a missing file from a broken connection.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0:#}")]
    Transport(anyhow::Error),

    #[error("remote file not found: {0}")]
    NotFound(String),

    #[error("invalid mapping document: {0}")]
    Validation(String),

    #[error("run {run_id} did not reach a terminal status within {waited_s:.1}s")]
    Timeout { run_id: String, waited_s: f64 },
}

impl RelayError {
    pub fn transport(err: impl Into<anyhow::Error>) -> Self {
        Self::Transport(err.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Timeout { .. } => "timeout",
        }
    }
}
