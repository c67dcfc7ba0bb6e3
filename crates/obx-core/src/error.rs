use thiserror::Error;

pub type ObxResult<T> = Result<T, ObxError>;

#[derive(Debug, Error)]
pub enum ObxError {
    /// Malformed salt, nonce, size or request field, caught before any
    /// network or crypto call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Wrong key or tampered ciphertext. Deliberately carries no detail.
    #[error("wrong key or corrupted data")]
    AuthenticationFailed,

    #[error("encryption key required to delete this object")]
    VerificationRequired,

    #[error("invalid encryption key for deletion")]
    VerificationFailed,

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// Retries exhausted on a retryable network condition.
    #[error("transfer failed after {attempts} attempt(s): {reason}")]
    TransferFailed { attempts: u32, reason: String },

    /// Terminal rejection from the capability endpoint, never retried.
    #[error("transfer rejected (status {}): {reason}", status.map_or_else(|| "none".to_string(), |s| s.to_string()))]
    TransferRejected { status: Option<u16>, reason: String },

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ObxError {
    /// Errors the caller can fix by correcting what it sent.
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            ObxError::InvalidInput(_)
                | ObxError::VerificationRequired
                | ObxError::VerificationFailed
        )
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        ObxError::InvalidInput(msg.into())
    }
}
