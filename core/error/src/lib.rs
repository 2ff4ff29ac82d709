//! The error taxonomy shared by every crate in the ting workspace.
//!
//! Mirrors the kinds enumerated in `ting/exceptions.py` in the original
//! implementation, widened to the handful of additional kinds the Rust
//! rewrite's adapter and responder layers need.

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, TingError>;

/// Every fallible outcome the ting measurement engine can produce.
#[derive(Debug, thiserror::Error)]
pub enum TingError {
    /// A `tingrc` key was missing or malformed. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// No control port answered, or the control connection dropped.
    #[error("could not reach the Tor control port: {0}")]
    ControllerUnavailable(String),

    /// The control port rejected our authentication attempt.
    #[error("Tor control port authentication failed: {0}")]
    AuthFailed(String),

    /// A circuit failed to build after exhausting all retry attempts.
    #[error("circuit build failed after {attempts} attempt(s): {cause}")]
    CircuitBuildFailed { attempts: u32, cause: String },

    /// Tor could not attach our stream to the target circuit.
    #[error("stream attach failed: {0}")]
    AttachFailed(String),

    /// A probe's socket I/O or frame decode failed.
    #[error("probe failed: {0}")]
    ProbeFailed(String),

    /// A frame on the wire could not be decoded.
    #[error("malformed frame: {0}")]
    Decode(String),

    /// A second echo responder tried to bind while one was already active.
    #[error("an echo responder is already running on this endpoint")]
    ConnectionAlreadyExists,

    /// Teardown of some resource did not complete cleanly. Never fatal.
    #[error("shutdown did not complete cleanly: {0}")]
    Shutdown(String),

    /// Wraps an I/O error encountered anywhere in the stack.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TingError {
    /// True for errors that should end the whole session rather than just
    /// the current pair or circuit.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            TingError::ControllerUnavailable(_)
                | TingError::AuthFailed(_)
                | TingError::Config(_)
                | TingError::ConnectionAlreadyExists
        )
    }
}
