//! Live connection tracking for Courier.
//!
//! Every accepted socket is registered here, first as unidentified and
//! then, after a successful login, bound to a user name. Envelopes for
//! users who are offline wait in a FIFO delivery queue until they log in.
//!
//! # Key types
//!
//! - [`ConnectionRegistry`]: the two connection pools and the queue
//! - [`ConnectionHandle`]: non-blocking sender for one connection
//! - [`Outbound`]: the receiving side a connection's writer task drains
//! - [`Delivery`] / [`BroadcastReport`]: what a send actually did

mod error;
mod handle;
mod registry;

pub use error::RegistryError;
pub use handle::{ConnectionHandle, Outbound};
pub use registry::{BroadcastReport, ConnectionRegistry, Delivery};
