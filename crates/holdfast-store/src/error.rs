/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure in a shared primitive (codec, atomic publish).
    #[error(transparent)]
    Core(#[from] holdfast_core::CoreError),

    /// `save` was called before any load succeeded; honoring it could
    /// overwrite a good backup with an empty in-memory document.
    #[error("store has not completed a successful load")]
    NotLoaded,

    /// The log store was asked to append or compact before reaching `Ready`.
    #[error("log store is not ready (current state: {0})")]
    NotReady(&'static str),

    /// The blob store's file handle has already been released.
    #[error("blob store is closed")]
    Closed,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
