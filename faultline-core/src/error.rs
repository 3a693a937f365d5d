use crate::record::FaultKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("credential pool must not be empty")]
    EmptyCredentialPool,

    #[error("`{0}` must be a positive duration")]
    InvalidDuration(&'static str),

    #[error("`concurrency` must be a positive integer")]
    InvalidConcurrency,

    #[error("`{0}` must be a positive integer")]
    InvalidCount(&'static str),

    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid dependency address `{0}` (expected host:port)")]
    InvalidDependencyAddress(String),
}

/// Failure of a single workflow step, classified by [`FaultKind`].
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("{0}")]
    Transport(#[from] faultline_http::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("business error (code {code}): {message}")]
    Business {
        status: u16,
        code: i64,
        message: String,
    },

    #[error("protocol error: {message}")]
    Protocol { status: u16, message: String },

    #[error("empty locator")]
    EmptyLocator { status: u16 },

    #[error("integrity check failed: {0}")]
    Integrity(String),
}

impl StepError {
    pub(crate) fn protocol(status: u16, message: impl Into<String>) -> Self {
        Self::Protocol {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            Self::Transport(e) if e.is_network() => FaultKind::Transport,
            // Rejected before it left the process: a malformed URL or header.
            Self::Transport(_) => FaultKind::Protocol,
            Self::Http { .. } => FaultKind::Http,
            Self::Business { .. } => FaultKind::Business,
            Self::Protocol { .. } | Self::EmptyLocator { .. } => FaultKind::Protocol,
            Self::Integrity(_) => FaultKind::Integrity,
        }
    }

    /// Status of the response that produced this error; 0 when no response arrived.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Transport(_) | Self::Integrity(_) => 0,
            Self::Http { status, .. }
            | Self::Business { status, .. }
            | Self::Protocol { status, .. }
            | Self::EmptyLocator { status } => *status,
        }
    }
}
