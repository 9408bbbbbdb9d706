//! `CourierServer` builder and accept loop.
//!
//! This is the network entry point of the relay. It ties together all the
//! layers: transport → protocol → router → registry/directory.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use courier_protocol::{Codec, JsonCodec};
use courier_transport::{
    Connection, PendingConnection, PendingWebSocket, Transport, TransportError,
    WebSocketConnection, WebSocketTransport,
};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::CourierError;
use crate::display::DisplaySink;
use crate::handler::handle_connection;
use crate::router::Router;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Default cap on simultaneous connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Default time a peer has to finish the WebSocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for configuring and starting a Courier server.
///
/// # Example
///
/// ```rust,ignore
/// use courier::prelude::*;
///
/// let router = Arc::new(Router::new(UserDirectory::new(), TracingDisplay));
/// let server = CourierServerBuilder::new()
///     .bind("0.0.0.0:5000")
///     .max_connections(256)
///     .build(router)
///     .await?;
/// server.run().await
/// ```
#[derive(Debug, Clone)]
pub struct CourierServerBuilder {
    bind_addr: String,
    max_connections: usize,
    handshake_timeout: Duration,
}

impl CourierServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets how many connections may be open at once. Connections beyond
    /// the limit are closed right after the handshake.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets how long a peer may take to finish the WebSocket handshake
    /// before it is dropped.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Binds the listener and returns a server routing through `router`.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<D: DisplaySink>(
        self,
        router: Arc<Router<D>>,
    ) -> Result<CourierServer<D, JsonCodec>, CourierError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        Ok(CourierServer {
            transport,
            router,
            codec: JsonCodec,
            limit: Arc::new(Semaphore::new(self.max_connections)),
            handshake_timeout: self.handshake_timeout,
        })
    }
}

impl Default for CourierServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Courier server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct CourierServer<D: DisplaySink, K: Codec> {
    transport: WebSocketTransport,
    router: Arc<Router<D>>,
    codec: K,
    limit: Arc<Semaphore>,
    handshake_timeout: Duration,
}

impl<D, K> CourierServer<D, K>
where
    D: DisplaySink,
    K: Codec + Clone,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop.
    ///
    /// Each accepted peer gets its own task that performs the handshake and
    /// then runs the connection handler, so a peer that never finishes its
    /// handshake only ever stalls itself. The tasks live in a `JoinSet`
    /// owned by this future, so dropping or aborting it tears every
    /// connection down. Runs until aborted.
    pub async fn run(mut self) -> Result<(), CourierError> {
        tracing::info!("Courier server running");
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(pending) => {
                        let timeout = self.handshake_timeout;
                        let Ok(permit) = Arc::clone(&self.limit).try_acquire_owned()
                        else {
                            tracing::warn!(
                                remote = %pending.remote_addr(),
                                "connection limit reached, rejecting"
                            );
                            connections.spawn(reject(pending, timeout));
                            continue;
                        };

                        let router = Arc::clone(&self.router);
                        let codec = self.codec.clone();
                        connections.spawn(async move {
                            let _permit = permit;
                            if let Some(conn) = upgrade(pending, timeout).await {
                                handle_connection(conn, router, codec).await;
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
                Some(finished) = connections.join_next() => {
                    log_finished(finished);
                }
            }
        }
    }
}

/// Runs the WebSocket handshake, giving up after `timeout`.
async fn upgrade(pending: PendingWebSocket, timeout: Duration) -> Option<WebSocketConnection> {
    let remote = pending.remote_addr();
    let result = match tokio::time::timeout(timeout, pending.upgrade()).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::HandshakeFailed(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "handshake timed out",
        ))),
    };
    match result {
        Ok(conn) => Some(conn),
        Err(e) => {
            tracing::warn!(%remote, error = %e, "dropping peer");
            None
        }
    }
}

/// Completes the handshake of a peer over the connection limit, then closes
/// it so the client sees a clean close instead of a reset.
async fn reject(pending: PendingWebSocket, timeout: Duration) {
    if let Some(conn) = upgrade(pending, timeout).await {
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "close failed");
        }
    }
}

fn log_finished(finished: Result<(), JoinError>) {
    if let Err(e) = finished {
        if e.is_panic() {
            tracing::error!(error = %e, "connection task panicked");
        }
    }
}
