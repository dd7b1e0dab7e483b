/// Errors from manager construction.
///
/// Only the session open path reports errors; every post-construction
/// manager operation absorbs failures internally and degrades to a safe
/// default, because the host process must never fault on a storage hiccup.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// I/O error preparing the storage directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A store failed to open.
    #[error(transparent)]
    Store(#[from] holdfast_store::StoreError),
}

/// Result alias for manager construction.
pub type ManagerResult<T> = Result<T, ManagerError>;
