/// Errors from the shared persistence primitives.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The codec failed to serialize a document.
    #[error("encode error: {0}")]
    Encode(String),

    /// The codec failed to parse a document.
    #[error("decode error: {0}")]
    Decode(String),

    /// An encoded document came out smaller than any plausible state.
    #[error("implausible output: {len} bytes, minimum {min}")]
    ImplausibleOutput { len: u64, min: u64 },
}

/// Result alias for primitive operations.
pub type CoreResult<T> = Result<T, CoreError>;
