//! The routing state machine.
//!
//! Every decoded envelope from every connection goes through
//! [`Router::dispatch`]. The router owns the user directory and the
//! connection registry and is shared by all connection tasks as
//! `Arc<Router<D>>`.
//!
//! Locking: each mutex is held only for in-memory work, never across a
//! socket write (registry sends only enqueue onto a connection's channel).
//! When a request touches both, the directory lock is released before the
//! registry lock is taken.

use courier_directory::{User, UserDirectory};
use courier_protocol::{Attachment, Envelope, MessageKind};
use courier_registry::{BroadcastReport, ConnectionHandle, ConnectionRegistry, Delivery};
use tokio::sync::Mutex;

use crate::display::DisplaySink;

/// Routes envelopes between users and answers account requests.
pub struct Router<D: DisplaySink> {
    directory: Mutex<UserDirectory>,
    registry: Mutex<ConnectionRegistry>,
    display: D,
}

impl<D: DisplaySink> Router<D> {
    /// Creates a router over a loaded directory with no connections.
    pub fn new(directory: UserDirectory, display: D) -> Self {
        display.set_registered_users(&directory.names());
        display.set_online_users(&[]);
        Self {
            directory: Mutex::new(directory),
            registry: Mutex::new(ConnectionRegistry::new()),
            display,
        }
    }

    /// Handles one inbound envelope and returns the reply for the sender,
    /// if the kind has one.
    ///
    /// Kinds that only ever flow server → client are logged and ignored.
    pub async fn dispatch(&self, envelope: Envelope) -> Option<Envelope> {
        self.display.log_line(&envelope.to_string());

        match envelope.kind() {
            MessageKind::LoginRequest => Some(self.login_request(&envelope).await),
            MessageKind::LoginConfirmation => {
                self.login_confirmation(&envelope).await;
                None
            }
            MessageKind::AddingRequest => Some(self.adding_request(envelope).await),
            MessageKind::AddingReply | MessageKind::AddingRemove => {
                self.forward(envelope).await;
                None
            }
            MessageKind::UserMessage => Some(self.user_message(envelope).await),
            MessageKind::UserUpdate => {
                self.user_update(envelope).await;
                None
            }
            MessageKind::UserLogout => {
                self.user_logout(&envelope).await;
                None
            }
            MessageKind::UserRemove => {
                self.user_remove(&envelope).await;
                None
            }
            MessageKind::LoginReply
            | MessageKind::AddingForwarding
            | MessageKind::UserMessageForwarding
            | MessageKind::UserUpdateRequest => {
                tracing::debug!(kind = %envelope.kind(), "ignoring server-bound reply kind");
                None
            }
        }
    }

    /// Login doubles as registration: an unknown name is registered with
    /// the supplied password.
    async fn login_request(&self, request: &Envelope) -> Envelope {
        let reply = request.reply(MessageKind::LoginReply);
        let (Some(name), Some(password)) =
            (request.source_name.as_deref(), request.content.as_deref())
        else {
            return reply
                .with_condition(false)
                .with_content("Missing user name or password.");
        };

        let mut directory = self.directory.lock().await;

        if directory.is_registered(name) {
            if !directory.validate_password(Some(name), Some(password)) {
                tracing::info!(name, "login rejected");
                return reply
                    .with_condition(false)
                    .with_content("Incorrect password.");
            }
            let reply = reply
                .with_condition(true)
                .with_content(format!("Logged in successfully as {name}"));
            return match directory.get(name) {
                Some(user) => reply.with_attachment(Attachment::User(user.to_profile())),
                None => reply,
            };
        }

        let user = User::new(name, password);
        let profile = user.to_profile();
        directory.register(user);
        let registered = directory.names();
        drop(directory);

        // Anything still queued under this name predates the account.
        self.registry.lock().await.discard_queued_for(name);
        self.display.set_registered_users(&registered);
        reply
            .with_condition(true)
            .with_content(format!("User {name} registered successfully."))
            .with_attachment(Attachment::User(profile))
    }

    /// Binds the sender's connection to its name and flushes everything
    /// that was queued for it.
    async fn login_confirmation(&self, request: &Envelope) {
        let (Some(name), Some(address)) =
            (request.source_name.as_deref(), request.source_address.as_deref())
        else {
            tracing::warn!("login confirmation without name or address");
            return;
        };

        let online = {
            let mut registry = self.registry.lock().await;
            if let Err(e) = registry.identify(name, address) {
                tracing::warn!(name, address, error = %e, "identify failed");
                self.display.log_line(&format!("An error occurred: {e}"));
                return;
            }
            if let Err(e) = registry.drain_queue_for(name) {
                tracing::warn!(name, error = %e, "queued delivery interrupted");
                self.display.log_line(&format!("An error occurred: {e}"));
            }
            registry.identified_names()
        };
        self.display.set_online_users(&online);
    }

    async fn adding_request(&self, request: Envelope) -> Envelope {
        let reply = request.reply(MessageKind::AddingForwarding);
        let destination = request.destination_name.clone().unwrap_or_default();

        if !self.is_registered(&destination).await {
            return reply
                .with_condition(false)
                .with_content(format!("User {destination} does not exist."));
        }

        self.forward(request).await;
        reply
            .with_condition(true)
            .with_content(format!("Adding request sent to {destination}"))
    }

    /// Forwards a chat message. The sender's confirmation looks like it
    /// came from the recipient and echoes the text back.
    async fn user_message(&self, message: Envelope) -> Envelope {
        let reply = message.reply(MessageKind::UserMessageForwarding);
        let destination = message.destination_name.clone().unwrap_or_default();

        if !self.is_registered(&destination).await {
            return reply
                .with_condition(false)
                .with_content(format!("User {destination} does not exist."));
        }

        let mut reply = reply.with_condition(true);
        reply.content = message.content.clone();
        reply.source_name = Some(destination);
        self.forward(message).await;
        reply
    }

    async fn user_update(&self, envelope: Envelope) {
        let Some(Attachment::User(profile)) = envelope.attachment else {
            tracing::warn!("user update without a user attachment");
            return;
        };
        let name = profile.name.clone();
        let updated = self.directory.lock().await.update_from_profile(profile);
        self.display
            .log_line(&format!("User {name} has been updated: {updated}"));
    }

    async fn user_logout(&self, request: &Envelope) {
        let Some(name) = request.source_name.as_deref() else {
            return;
        };
        let online = {
            let mut registry = self.registry.lock().await;
            if let Err(e) = registry.unidentify(name) {
                tracing::debug!(name, error = %e, "logout for unbound name");
            }
            registry.identified_names()
        };
        self.display.set_online_users(&online);
    }

    async fn user_remove(&self, request: &Envelope) {
        let Some(name) = request.source_name.as_deref() else {
            return;
        };
        let (removed, registered) = {
            let mut directory = self.directory.lock().await;
            let removed = directory.remove(name);
            (removed, directory.names())
        };
        if removed {
            self.registry.lock().await.discard_queued_for(name);
        }
        self.display.set_registered_users(&registered);
    }

    /// Hands an envelope to the registry. Failures are logged, never
    /// reported to the sender.
    async fn forward(&self, envelope: Envelope) {
        let result = self.registry.lock().await.send(envelope);
        match result {
            Ok(Delivery::Sent) => {}
            Ok(Delivery::Queued) => tracing::debug!("recipient offline, message queued"),
            Err(e) => {
                tracing::warn!(error = %e, "forwarding failed");
                self.display.log_line(&format!("An error occurred: {e}"));
            }
        }
    }

    async fn is_registered(&self, name: &str) -> bool {
        self.directory.lock().await.is_registered(name)
    }

    // ---------------------------------------------------------------------
    // Connection lifecycle
    // ---------------------------------------------------------------------

    /// Registers a freshly accepted connection as unidentified.
    pub async fn connected(&self, handle: ConnectionHandle) {
        self.display
            .log_line(&format!("Connection received: {}", handle.address()));
        self.registry.lock().await.add_unidentified(handle);
    }

    /// Called when a connection's handler ends. Drops every closed
    /// connection and refreshes the online list.
    pub async fn disconnected(&self, address: &str) {
        self.display.log_line(&format!("Connection lost: {address}"));
        let online = {
            let mut registry = self.registry.lock().await;
            registry.purge();
            registry.identified_names()
        };
        self.display.set_online_users(&online);
    }

    /// Asks every online client to push its current profile.
    pub async fn broadcast_update_request(&self) -> BroadcastReport {
        let report = self
            .registry
            .lock()
            .await
            .broadcast(&Envelope::new(MessageKind::UserUpdateRequest));
        for (name, e) in &report.failed {
            self.display
                .log_line(&format!("An error occurred sending to {name}: {e}"));
        }
        self.display.log_line(&format!(
            "Update request sent to {} identified connections.",
            report.delivered
        ));
        report
    }

    /// Forgets every connection. Users and queued messages are kept.
    pub async fn reset_connections(&self) {
        self.registry.lock().await.clear();
        self.display.set_online_users(&[]);
    }

    /// A copy of the directory, for persisting.
    pub async fn directory_snapshot(&self) -> UserDirectory {
        self.directory.lock().await.clone()
    }

    pub async fn registered_names(&self) -> Vec<String> {
        self.directory.lock().await.names()
    }

    pub async fn online_names(&self) -> Vec<String> {
        self.registry.lock().await.identified_names()
    }

    /// Number of envelopes waiting for `name` to come online.
    pub async fn queued_for(&self, name: &str) -> usize {
        self.registry.lock().await.queued_for(name)
    }
}

// =========================================================================
// Tests
// =========================================================================
