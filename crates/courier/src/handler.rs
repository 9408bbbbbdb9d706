//! Per-connection handler: read loop, writer task, and disconnect cleanup.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register an unidentified `ConnectionHandle` with the router
//!   2. Spawn the writer task that drains the handle's channel to the socket
//!   3. Loop: receive frame → decode → stamp source address → dispatch →
//!      queue the reply on the same channel
//!   4. On close or error: mark inactive, close the socket, purge

use std::sync::Arc;

use courier_protocol::{Codec, Envelope};
use courier_registry::{ConnectionHandle, Outbound};
use courier_transport::{Connection, WebSocketConnection};

use crate::display::DisplaySink;
use crate::router::Router;

/// Drop guard that marks the connection closed and purges it from the
/// registry when the handler exits.
///
/// This also covers the handler task being aborted (server stop) or
/// panicking. Since `Drop` is synchronous, the purge runs as a
/// fire-and-forget task.
struct DisconnectGuard<D: DisplaySink> {
    handle: ConnectionHandle,
    router: Arc<Router<D>>,
}

impl<D: DisplaySink> Drop for DisconnectGuard<D> {
    fn drop(&mut self) {
        self.handle.close();
        let address = self.handle.address().to_string();
        let router = Arc::clone(&self.router);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                router.disconnected(&address).await;
            });
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<D, K>(
    conn: WebSocketConnection,
    router: Arc<Router<D>>,
    codec: K,
) where
    D: DisplaySink,
    K: Codec + Clone,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let address = conn.remote_addr().to_string();
    tracing::debug!(%conn_id, %address, "handling new connection");

    let (handle, outbound) = ConnectionHandle::new(address.clone());
    router.connected(handle.clone()).await;
    let _guard = DisconnectGuard {
        handle: handle.clone(),
        router: Arc::clone(&router),
    };

    let mut writer =
        tokio::spawn(write_loop(Arc::clone(&conn), outbound, codec.clone()));

    loop {
        let data = tokio::select! {
            received = conn.recv() => match received {
                Ok(Some(data)) => data,
                Ok(None) => {
                    tracing::info!(%conn_id, %address, "connection closed cleanly");
                    break;
                }
                Err(e) => {
                    tracing::debug!(%conn_id, error = %e, "recv error");
                    break;
                }
            },
            _ = &mut writer => {
                tracing::debug!(%conn_id, "writer stopped, closing connection");
                break;
            }
        };

        let mut envelope: Envelope = match codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(%conn_id, %address, error = %e, "discarding undecodable frame");
                continue;
            }
        };
        if envelope.source_address.is_none() {
            envelope.source_address = Some(address.clone());
        }

        if let Some(reply) = router.dispatch(envelope).await {
            if let Err(e) = handle.send(reply) {
                tracing::debug!(%conn_id, error = %e, "reply dropped");
                break;
            }
        }
    }

    handle.close();
    writer.abort();
    if let Err(e) = conn.close().await {
        tracing::debug!(%conn_id, error = %e, "close failed");
    }
    // _guard drops here → purge + online refresh.
}

/// Drains a connection's outbound channel onto the socket, in order.
///
/// Ends when the socket rejects a write; the connection is then marked
/// closed so the registry stops routing to it.
async fn write_loop<K: Codec>(
    conn: Arc<WebSocketConnection>,
    mut outbound: Outbound,
    codec: K,
) {
    while let Some(envelope) = outbound.recv().await {
        let bytes = match codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode envelope");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "send failed");
            outbound.close();
            return;
        }
    }
}
