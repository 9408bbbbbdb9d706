//! Error types for the connection registry.

/// Errors that can occur while routing envelopes to connections.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The envelope names neither a destination user nor an address.
    #[error("envelope has no destination")]
    NoDestination,

    /// No connection with this address is registered.
    #[error("no connection at {0}")]
    ConnectionNotFound(String),

    /// The name is not bound to any connection.
    #[error("{0} is not identified")]
    NotIdentified(String),

    /// The connection exists but can no longer accept envelopes.
    #[error("connection {0} is closed")]
    ConnectionClosed(String),
}
