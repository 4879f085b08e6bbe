use thiserror::Error;

use cyberloop_client::{ClientError, ErrorKind};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    /// The completion endpoint failed. Fatal to the run.
    #[error("LLM request failed: {0}")]
    Client(#[from] ClientError),

    /// The run was cancelled through its cancellation token.
    #[error("Run cancelled")]
    Cancelled,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Classification of the underlying client failure, if this is one.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Client(e) => Some(e.kind()),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
