//! # Courier
//!
//! Name-routed chat relay server.
//!
//! Clients connect over WebSocket, log in (registering on first login), and
//! exchange [`Envelope`](courier_protocol::Envelope)s addressed by user
//! name. The server forwards each envelope to the recipient's connection, or
//! holds it in a delivery queue until the recipient logs in.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use courier::prelude::*;
//!
//! # async fn run() -> Result<(), CourierError> {
//! let directory = JsonFileStore::new("user_data.json").load().await?;
//! let router = Arc::new(Router::new(directory, TracingDisplay));
//! let server = CourierServerBuilder::new()
//!     .bind("0.0.0.0:5000")
//!     .build(router)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod console;
mod display;
mod error;
mod handler;
mod router;
mod server;

pub use config::ServerConfig;
pub use console::{Command, Console, Flow};
pub use display::{DisplaySink, TracingDisplay};
pub use error::CourierError;
pub use router::Router;
pub use server::{CourierServer, CourierServerBuilder};

/// Everything needed to embed or run a Courier server.
pub mod prelude {
    pub use crate::{
        Command, Console, CourierError, CourierServer, CourierServerBuilder,
        DisplaySink, Flow, Router, ServerConfig, TracingDisplay,
    };
    pub use courier_directory::{JsonFileStore, User, UserDirectory, UserStore};
    pub use courier_protocol::{
        Attachment, Codec, Contact, Envelope, JsonCodec, MessageKind,
        UserProfile,
    };
    pub use courier_registry::BroadcastReport;
}
