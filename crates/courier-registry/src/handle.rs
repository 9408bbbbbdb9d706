//! The registry's view of one live connection.
//!
//! A [`ConnectionHandle`] is the sending half of a per-connection FIFO
//! channel plus a shared liveness flag. The connection handler owns the
//! transport and the matching [`Outbound`] receiver, and a writer task drains
//! that receiver onto the socket. Handing an envelope to a handle never
//! waits on the network, so a slow peer only backs up its own channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use courier_protocol::Envelope;
use tokio::sync::mpsc;

use crate::RegistryError;

/// Cheap-to-clone sender for one connection, identified by remote address.
///
/// Handles compare equal when their addresses are equal.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    address: String,
    sender: mpsc::UnboundedSender<Envelope>,
    active: Arc<AtomicBool>,
}

/// Receiving end of a connection's outbound channel, owned by its writer
/// task.
#[derive(Debug)]
pub struct Outbound {
    receiver: mpsc::UnboundedReceiver<Envelope>,
    active: Arc<AtomicBool>,
}

impl ConnectionHandle {
    /// Creates a handle for the connection at `address` together with the
    /// receiver its writer task will drain.
    pub fn new(address: impl Into<String>) -> (Self, Outbound) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicBool::new(true));
        let handle = Self {
            address: address.into(),
            sender,
            active: Arc::clone(&active),
        };
        (handle, Outbound { receiver, active })
    }

    /// The remote address, `ip:port`.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// `false` once the handler or writer has closed the connection.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    /// Marks the connection as closed. Called by the owning handler; the
    /// registry only ever observes this through [`is_active`](Self::is_active).
    pub fn close(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Queues `envelope` for this connection.
    ///
    /// An unset destination address is filled with this connection's
    /// address, so the recipient learns how the server sees it.
    ///
    /// # Errors
    /// [`RegistryError::ConnectionClosed`] if the connection is gone.
    pub fn send(&self, envelope: Envelope) -> Result<(), RegistryError> {
        self.deliver(envelope)
            .map_err(|_| RegistryError::ConnectionClosed(self.address.clone()))
    }

    /// Like [`send`](Self::send) but hands the envelope back untouched on
    /// failure, so the caller can keep it queued.
    pub(crate) fn deliver(&self, mut envelope: Envelope) -> Result<(), Envelope> {
        if !self.is_active() {
            return Err(envelope);
        }
        let stamped = envelope.destination_address.is_none();
        if stamped {
            envelope.destination_address = Some(self.address.clone());
        }
        self.sender.send(envelope).map_err(|e| {
            let mut envelope = e.0;
            if stamped {
                envelope.destination_address = None;
            }
            envelope
        })
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for ConnectionHandle {}

impl Outbound {
    /// Waits for the next envelope. Returns `None` once every handle has
    /// been dropped.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    /// Takes the next envelope if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.receiver.try_recv().ok()
    }

    /// Marks the connection as closed, e.g. after a failed socket write.
    pub fn close(&mut self) {
        self.active.store(false, Ordering::Release);
        self.receiver.close();
    }
}
