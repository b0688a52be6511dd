use thiserror::Error;

/// Errors produced by the chat core.
///
/// Synchronous operations surface these to the caller; the asynchronous
/// attachment phase converts failures into terminal `Error` status on the
/// record instead of returning them.
#[derive(Debug, Error)]
pub enum Error {
    /// A chat, message, attachment or notification does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed or out-of-range input. Surfaced to the caller, no retry.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller is not allowed to perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Object storage or another downstream dependency failed.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Document store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Local filesystem I/O (staged upload files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
