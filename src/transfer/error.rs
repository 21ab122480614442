use thiserror::Error;

/// Failure of a single network attempt, as reported by a collaborator adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
}

impl TransportError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        TransportError::Status {
            status,
            message: message.into(),
        }
    }

    /// Only server-side, throttling and connectivity failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            TransportError::Network(_) | TransportError::Timeout => true,
        }
    }
}

/// Terminal outcome of [`super::TransferController::execute`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("{endpoint} timed out after {attempts} attempt(s)")]
    Timeout { endpoint: String, attempts: u32 },
    #[error("{endpoint} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        endpoint: String,
        attempts: u32,
        last: TransportError,
    },
    #[error("{endpoint} rejected with HTTP {status}: {message}")]
    Rejected {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("{endpoint} cancelled after {attempts} attempt(s)")]
    Cancelled { endpoint: String, attempts: u32 },
}

impl TransferError {
    pub fn attempts(&self) -> u32 {
        match self {
            TransferError::Timeout { attempts, .. }
            | TransferError::Exhausted { attempts, .. }
            | TransferError::Cancelled { attempts, .. } => *attempts,
            TransferError::Rejected { .. } => 1,
        }
    }

    /// Retries performed beyond the first attempt.
    pub fn retries(&self) -> u32 {
        self.attempts().saturating_sub(1)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransferError::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled { .. })
    }
}
