//! Command-line and environment configuration for `courier-server`.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use courier_directory::DEFAULT_DATA_FILE;

use crate::server::{CourierServerBuilder, DEFAULT_MAX_CONNECTIONS};

/// Courier chat relay server
#[derive(Parser, Clone, Debug)]
#[command(name = "courier-server", version, about = "Courier chat relay server")]
pub struct ServerConfig {
    /// Port to listen on
    #[arg(long, env = "COURIER_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "COURIER_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// User directory snapshot, loaded on /start and saved on /exit
    #[arg(long, env = "COURIER_DATA_FILE", default_value = DEFAULT_DATA_FILE)]
    pub data_file: PathBuf,

    /// Maximum number of simultaneous client connections
    #[arg(long, env = "COURIER_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// Seconds a client has to finish the WebSocket handshake
    #[arg(long, env = "COURIER_HANDSHAKE_TIMEOUT", default_value_t = 10)]
    pub handshake_timeout_secs: u64,

    /// Run /start immediately instead of waiting for the command
    #[arg(long, env = "COURIER_AUTOSTART")]
    pub autostart: bool,
}

impl ServerConfig {
    /// `bind_address:port`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// A server builder carrying the listen address, connection cap, and
    /// handshake deadline.
    pub fn server_builder(&self) -> CourierServerBuilder {
        CourierServerBuilder::new()
            .bind(&self.listen_addr())
            .max_connections(self.max_connections)
            .handshake_timeout(Duration::from_secs(self.handshake_timeout_secs))
    }
}
