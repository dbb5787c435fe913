//! Error types for utalog
//!
//! One taxonomy for the whole pipeline. Recovery scope is the important
//! property of each variant: `Parse` never escapes its video, `NotFound`
//! never escapes its item, `Transient` is retried by the platform client,
//! `QuotaExceeded` halts the run but preserves completed work, and
//! `Config`/`Integrity`/`Io` are fatal.

use thiserror::Error;

/// Common result type for utalog operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed configuration or channel id; fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Platform signalled (or local budget predicted) quota exhaustion
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Recoverable network/server failure; retried by the client
    #[error("Transient error: {0}")]
    Transient(String),

    /// Missing resource; logged and skipped
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed text mid-parse; the offending line is dropped
    #[error("Parse error: {0}")]
    Parse(String),

    /// Catalog invariant violated during merge; previous catalog kept
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Underlying storage failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for the CLI surface
    ///
    /// 0 ok, 2 quota exceeded (partial success), 3 config error, 4 I/O error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::QuotaExceeded(_) => 2,
            Error::Config(_) => 3,
            Error::Io(_) => 4,
            // Integrity aborts like an I/O fault: state on disk is untouched
            Error::Integrity(_) => 4,
            _ => 1,
        }
    }

    /// Whether the platform client should retry this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }

    /// Whether this error must halt all remaining platform calls
    pub fn is_quota(&self) -> bool {
        matches!(self, Error::QuotaExceeded(_))
    }
}
