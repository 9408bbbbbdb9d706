//! Operator commands: `/start`, `/stop`, `/update`, `/exit`.
//!
//! The [`Console`] owns the server's lifecycle. The router (and with it the
//! user directory) is created on the first `/start` and survives `/stop`,
//! so restarting the listener keeps every account and queued message.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use courier_directory::UserStore;
use courier_registry::BroadcastReport;
use courier_transport::TransportError;
use tokio::task::JoinHandle;

use crate::CourierError;
use crate::display::DisplaySink;
use crate::router::Router;
use crate::server::CourierServerBuilder;

/// A recognised operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Update,
    Exit,
}

impl Command {
    /// Parses one input line. Anything that is not exactly one of the four
    /// slash commands is `None`.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().strip_prefix('/')? {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "update" => Some(Self::Update),
            "exit" => Some(Self::Exit),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "/start",
            Self::Stop => "/stop",
            Self::Update => "/update",
            Self::Exit => "/exit",
        };
        f.write_str(name)
    }
}

/// Whether the command loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

struct Running {
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// Executes operator commands against one server instance.
pub struct Console<S: UserStore, D: DisplaySink + Clone> {
    listener: CourierServerBuilder,
    store: S,
    display: D,
    router: Option<Arc<Router<D>>>,
    server: Option<Running>,
}

impl<S, D> Console<S, D>
where
    S: UserStore,
    D: DisplaySink + Clone,
{
    pub fn new(listener: CourierServerBuilder, store: S, display: D) -> Self {
        Self {
            listener,
            store,
            display,
            router: None,
            server: None,
        }
    }

    /// Parses and runs one line of input. Unrecognised input is ignored.
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        match Command::parse(line) {
            Some(command) => self.execute(command).await,
            None => Flow::Continue,
        }
    }

    /// Runs `command`. Failures are logged; only `/exit` ends the loop.
    pub async fn execute(&mut self, command: Command) -> Flow {
        self.display.log_line(&command.to_string());
        match command {
            Command::Start => {
                if let Err(e) = self.start().await {
                    tracing::error!(error = %e, "start failed");
                    self.display.log_line(&format!("An error occurred: {e}"));
                }
                Flow::Continue
            }
            Command::Stop => {
                self.stop().await;
                Flow::Continue
            }
            Command::Update => {
                self.update().await;
                Flow::Continue
            }
            Command::Exit => {
                if let Err(e) = self.exit().await {
                    tracing::error!(error = %e, "saving user data failed");
                    self.display.log_line(&format!("An error occurred: {e}"));
                }
                Flow::Exit
            }
        }
    }

    /// Loads the directory (first start only) and starts listening.
    ///
    /// # Errors
    /// Loading the directory or binding the listener failed. Nothing is
    /// started in that case.
    pub async fn start(&mut self) -> Result<(), CourierError> {
        if self.server.is_some() {
            self.display.log_line("Server is already listening.");
            return Ok(());
        }

        let router = match &self.router {
            Some(router) => Arc::clone(router),
            None => {
                let directory = self.store.load().await?;
                self.display
                    .log_line(&format!("User data loaded: {} users", directory.len()));
                let router = Arc::new(Router::new(directory, self.display.clone()));
                self.router = Some(Arc::clone(&router));
                router
            }
        };

        let server = self.listener.clone().build(router).await?;
        let local_addr = server
            .local_addr()
            .map_err(TransportError::AcceptFailed)?;
        let task = tokio::spawn(async move {
            if let Err(e) = server.run().await {
                tracing::error!(error = %e, "server stopped with error");
            }
        });

        self.display.log_line(&format!(
            "Server is now listening for connections on {local_addr}"
        ));
        self.server = Some(Running { task, local_addr });
        Ok(())
    }

    /// Stops listening and drops every connection. Users and queued
    /// messages stay in memory; nothing is saved.
    pub async fn stop(&mut self) {
        let Some(running) = self.server.take() else {
            self.display.log_line("Server is not listening.");
            return;
        };
        running.task.abort();
        // Wait for the accept loop (and its connection set) to be dropped.
        let _ = running.task.await;
        if let Some(router) = &self.router {
            router.reset_connections().await;
        }
        self.display
            .log_line("Server is no longer listening for connections.");
    }

    /// Asks every online client for its current profile.
    pub async fn update(&self) -> Option<BroadcastReport> {
        match &self.router {
            Some(router) => Some(router.broadcast_update_request().await),
            None => {
                self.display.log_line("Server has not been started.");
                None
            }
        }
    }

    /// Stops the server if running and saves the directory. A server that
    /// was never started has nothing to save.
    pub async fn exit(&mut self) -> Result<(), CourierError> {
        if let Some(running) = self.server.take() {
            running.task.abort();
            let _ = running.task.await;
        }
        let Some(router) = &self.router else {
            return Ok(());
        };
        let snapshot = router.directory_snapshot().await;
        self.store.save(&snapshot).await?;
        self.display
            .log_line(&format!("User data saved: {} users", snapshot.len()));
        Ok(())
    }

    /// The listener's bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(|running| running.local_addr)
    }

    /// The router, once the server has been started.
    pub fn router(&self) -> Option<&Arc<Router<D>>> {
        self.router.as_ref()
    }
}
