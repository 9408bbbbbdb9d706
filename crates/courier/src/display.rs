//! Where the server reports what it is doing.
//!
//! The router pushes three things to a [`DisplaySink`]: a line for every
//! notable event, the full list of registered users whenever it changes,
//! and the list of online users whenever that changes. Calls are
//! fire-and-forget; a sink must never block the router.

/// Receives server activity for presentation.
pub trait DisplaySink: Send + Sync + 'static {
    /// One line of activity, e.g. a received envelope.
    fn log_line(&self, line: &str);

    /// The sorted names of every registered user.
    fn set_registered_users(&self, names: &[String]);

    /// The sorted names of every identified (online) user.
    fn set_online_users(&self, names: &[String]);
}

/// Default sink that writes everything to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDisplay;

impl DisplaySink for TracingDisplay {
    fn log_line(&self, line: &str) {
        tracing::info!(target: "courier::display", "{line}");
    }

    fn set_registered_users(&self, names: &[String]) {
        tracing::info!(
            target: "courier::display",
            count = names.len(),
            users = ?names,
            "registered users"
        );
    }

    fn set_online_users(&self, names: &[String]) {
        tracing::info!(
            target: "courier::display",
            count = names.len(),
            users = ?names,
            "online users"
        );
    }
}
