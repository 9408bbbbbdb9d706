//! Unified error type for the Courier server.

use courier_directory::StoreError;
use courier_protocol::ProtocolError;
use courier_registry::RegistryError;
use courier_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A routing error (no destination, unknown or closed connection).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Loading or saving the user directory failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
