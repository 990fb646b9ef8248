use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Engine-level failure taxonomy. Raw transport errors never leave the
/// provider/probe boundary; everything above it deals in these kinds.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The provider (or a probe target) could not be reached in time.
    /// Retryable: scheduled jobs log it and wait for the next tick, the
    /// purchase path surfaces it as "try again".
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    /// The provider understood the request and refused it. Never retried
    /// automatically.
    #[error("rejected: {0}")]
    Rejected(String),
    /// No listing matched the filters and probed online.
    #[error("no matching proxy available")]
    NoneAvailable,
    #[error("insufficient balance")]
    InsufficientFunds,
    /// The lease's balance credit already happened; terminal.
    #[error("lease already refunded")]
    AlreadyRefunded,
    /// The lease's host was retired and is out of circulation for good.
    #[error("host already retired")]
    AlreadyRetired,
    #[error("not found")]
    NotFound,
    #[error("storage error")]
    Db(#[from] sqlx::Error),
}
