//! Error types for the directory store.
//!
//! Directory operations themselves never fail: registering a taken name or
//! updating an unknown user is an expected outcome, reported as `false`.
//! Only reading and writing the snapshot can go wrong.

/// Errors from loading or saving a [`UserDirectory`](crate::UserDirectory)
/// snapshot.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The stored snapshot exists but could not be parsed.
    #[error("store snapshot is corrupt: {0}")]
    Decode(#[source] serde_json::Error),

    /// The directory could not be serialized.
    #[error("failed to serialize directory: {0}")]
    Encode(#[source] serde_json::Error),
}
