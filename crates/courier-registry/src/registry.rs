//! Connection registry: who is connected, under which name, and what is
//! waiting for users who are not.
//!
//! # Concurrency note
//!
//! Like the user directory, `ConnectionRegistry` does no locking itself.
//! The router keeps it behind a single mutex, which is what makes
//! `identify` followed by `drain_queue_for` one atomic step: a message for
//! a user is either already in the queue when the drain runs, or it is sent
//! after the name is bound and goes straight to the connection. It is never
//! delivered twice or lost in between.

use std::collections::{HashMap, VecDeque};

use courier_protocol::Envelope;

use crate::{ConnectionHandle, RegistryError};

/// What [`ConnectionRegistry::send`] did with an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the destination's connection.
    Sent,
    /// Destination not online; held in the delivery queue.
    Queued,
}

/// Outcome of a broadcast. Each connection is attempted independently.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Number of connections the envelope was handed to.
    pub delivered: usize,
    /// Connections that could not take the envelope, by user name.
    pub failed: Vec<(String, RegistryError)>,
}

impl BroadcastReport {
    /// `true` if every identified connection received the envelope.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Tracks live connections and the offline delivery queue.
///
/// ```text
/// accept ──→ unidentified ──(identify)──→ identified
///                 ↑                            │
///                 └────────(unidentify)────────┘
///        (either pool) ──(inactive + purge)──→ gone
/// ```
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Connections bound to a user name. One connection per name.
    identified: HashMap<String, ConnectionHandle>,

    /// Accepted connections not bound to any name, keyed by address.
    unidentified: HashMap<String, ConnectionHandle>,

    /// Envelopes whose destination name was offline when sent, oldest
    /// first.
    queue: VecDeque<Envelope>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted connection.
    pub fn add_unidentified(&mut self, handle: ConnectionHandle) {
        tracing::debug!(address = handle.address(), "connection registered");
        if let Some(stale) =
            self.unidentified.insert(handle.address().to_string(), handle)
        {
            tracing::debug!(
                address = stale.address(),
                "replaced stale connection with the same address"
            );
        }
    }

    /// Routes an envelope.
    ///
    /// - destination name online → sent to that connection
    /// - destination name offline → appended to the delivery queue
    /// - no name but an address → sent to the connection with that address
    ///
    /// # Errors
    /// - [`RegistryError::NoDestination`]: neither name nor address set
    /// - [`RegistryError::ConnectionNotFound`]: address-only envelope and no
    ///   such connection
    /// - [`RegistryError::ConnectionClosed`]: the target connection is gone
    pub fn send(&mut self, envelope: Envelope) -> Result<Delivery, RegistryError> {
        if envelope.has_no_destination() {
            return Err(RegistryError::NoDestination);
        }

        if let Some(name) = envelope.destination_name.clone() {
            return match self.identified.get(&name) {
                Some(handle) => {
                    handle.send(envelope)?;
                    Ok(Delivery::Sent)
                }
                None => {
                    tracing::debug!(destination = %name, "destination offline, queued");
                    self.queue.push_back(envelope);
                    Ok(Delivery::Queued)
                }
            };
        }

        let address = envelope.destination_address.clone().unwrap_or_default();
        let handle = self
            .find_by_address(&address)
            .ok_or(RegistryError::ConnectionNotFound(address))?;
        handle.send(envelope)?;
        Ok(Delivery::Sent)
    }

    /// Delivers every queued envelope addressed to `name`, oldest first.
    ///
    /// Does nothing if `name` is not identified. Each envelope leaves the
    /// queue as it is sent; on the first failure the failing envelope and
    /// everything after it stay queued.
    ///
    /// Returns how many envelopes were delivered.
    pub fn drain_queue_for(&mut self, name: &str) -> Result<usize, RegistryError> {
        let Some(handle) = self.identified.get(name) else {
            return Ok(0);
        };

        let mut delivered = 0;
        let mut index = 0;
        while index < self.queue.len() {
            if self.queue[index].destination_name.as_deref() != Some(name) {
                index += 1;
                continue;
            }
            let Some(envelope) = self.queue.remove(index) else {
                break;
            };
            if let Err(envelope) = handle.deliver(envelope) {
                self.queue.insert(index, envelope);
                return Err(RegistryError::ConnectionClosed(
                    handle.address().to_string(),
                ));
            }
            delivered += 1;
        }

        if delivered > 0 {
            tracing::info!(name, delivered, "delivered queued messages");
        }
        Ok(delivered)
    }

    /// Sends a copy of `envelope` to every identified connection.
    ///
    /// A failure on one connection is recorded in the report and does not
    /// stop delivery to the rest.
    pub fn broadcast(&self, envelope: &Envelope) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for (name, handle) in &self.identified {
            match handle.send(envelope.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(%name, error = %e, "broadcast delivery failed");
                    report.failed.push((name.clone(), e));
                }
            }
        }
        report
    }

    /// Binds the unidentified connection at `address` to `name`.
    ///
    /// If `name` was bound to a different connection, that connection is
    /// moved back to the unidentified pool, keeping names unique.
    ///
    /// # Errors
    /// [`RegistryError::ConnectionNotFound`] if no unidentified connection
    /// has that address. A connection is never created here.
    pub fn identify(&mut self, name: &str, address: &str) -> Result<(), RegistryError> {
        if self
            .identified
            .get(name)
            .is_some_and(|h| h.address() == address)
        {
            return Ok(());
        }

        let handle = self
            .unidentified
            .remove(address)
            .ok_or_else(|| RegistryError::ConnectionNotFound(address.to_string()))?;

        if let Some(previous) = self.identified.insert(name.to_string(), handle) {
            tracing::info!(
                name,
                previous = previous.address(),
                "name rebound, previous connection demoted"
            );
            self.unidentified
                .insert(previous.address().to_string(), previous);
        }
        tracing::info!(name, address, "connection identified");
        Ok(())
    }

    /// Unbinds `name`, returning its connection to the unidentified pool.
    ///
    /// # Errors
    /// [`RegistryError::NotIdentified`] if `name` is not bound.
    pub fn unidentify(&mut self, name: &str) -> Result<(), RegistryError> {
        let handle = self
            .identified
            .remove(name)
            .ok_or_else(|| RegistryError::NotIdentified(name.to_string()))?;
        tracing::info!(name, address = handle.address(), "connection unidentified");
        self.unidentified.insert(handle.address().to_string(), handle);
        Ok(())
    }

    /// Drops every inactive connection from both pools.
    ///
    /// Returns the addresses removed. Calling it again right away removes
    /// nothing.
    pub fn purge(&mut self) -> Vec<String> {
        let mut removed = Vec::new();
        self.unidentified.retain(|_, handle| {
            let keep = handle.is_active();
            if !keep {
                removed.push(handle.address().to_string());
            }
            keep
        });
        self.identified.retain(|_, handle| {
            let keep = handle.is_active();
            if !keep {
                removed.push(handle.address().to_string());
            }
            keep
        });
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "purged inactive connections");
        }
        removed
    }

    /// Forgets every connection. Queued envelopes are kept.
    pub fn clear(&mut self) {
        self.identified.clear();
        self.unidentified.clear();
    }

    /// Sorted names with a bound connection.
    pub fn identified_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.identified.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_identified(&self, name: &str) -> bool {
        self.identified.contains_key(name)
    }

    /// Looks a connection up by address in either pool.
    pub fn find_by_address(&self, address: &str) -> Option<&ConnectionHandle> {
        self.unidentified
            .get(address)
            .or_else(|| self.identified.values().find(|h| h.address() == address))
    }

    /// Drops every queued envelope addressed to `name` and returns how many
    /// were dropped. Used when the name stops belonging to its old owner.
    pub fn discard_queued_for(&mut self, name: &str) -> usize {
        let before = self.queue.len();
        self.queue
            .retain(|e| e.destination_name.as_deref() != Some(name));
        let discarded = before - self.queue.len();
        if discarded > 0 {
            tracing::info!(name, discarded, "discarded queued messages");
        }
        discarded
    }

    /// Number of queued envelopes addressed to `name`.
    pub fn queued_for(&self, name: &str) -> usize {
        self.queue
            .iter()
            .filter(|e| e.destination_name.as_deref() == Some(name))
            .count()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn identified_len(&self) -> usize {
        self.identified.len()
    }

    pub fn unidentified_len(&self) -> usize {
        self.unidentified.len()
    }
}

// =========================================================================
// Tests
// =========================================================================
