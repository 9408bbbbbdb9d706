//! Wire protocol for Courier.
//!
//! - **Types** ([`Envelope`], [`MessageKind`], [`Attachment`],
//!   [`UserProfile`]): the message structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (framed bytes) and the router
//! (user names). It doesn't know about connections or accounts.
//!
//! ```text
//! Transport (frames) → Protocol (Envelope) → Router (users, queue)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{Attachment, Contact, Envelope, MessageKind, UserProfile};
