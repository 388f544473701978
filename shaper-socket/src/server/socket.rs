use std::{net::SocketAddr, sync::Arc};

use tokio::{
    net::{TcpListener, ToSocketAddrs},
    task::JoinHandle,
};
use tracing::debug;

use shaper_core::Registry;

use super::{driver::ServerDriver, ServerError, ServerOptions, ServerState, ServerStats};

/// Serves shaper control requests for the devices of a [`Registry`].
pub struct ShaperServer {
    /// The devices requests are run against.
    registry: Arc<Registry>,
    /// The server options, shared with the driver.
    options: Arc<ServerOptions>,
    /// The server state, shared with the driver.
    state: Arc<ServerState>,
    /// The local address this server is bound to.
    local_addr: Option<SocketAddr>,
    /// Internal task representing a running [`ServerDriver`].
    driver_task: Option<JoinHandle<()>>,
}

impl ShaperServer {
    /// Creates a new server with the default [`ServerOptions`].
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_options(registry, ServerOptions::default())
    }

    pub fn with_options(registry: Arc<Registry>, options: ServerOptions) -> Self {
        Self {
            registry,
            options: Arc::new(options),
            state: Arc::new(ServerState::default()),
            local_addr: None,
            driver_task: None,
        }
    }

    /// Binds the server to the given address. This spawns the server driver task.
    pub async fn bind(&mut self, addr: impl ToSocketAddrs) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let span = tracing::info_span!(parent: None, "shaper_server", ?local_addr);
        span.in_scope(|| debug!("listening"));

        let driver = ServerDriver {
            listener,
            registry: Arc::clone(&self.registry),
            options: Arc::clone(&self.options),
            state: Arc::clone(&self.state),
            span,
        };

        if let Some(task) = self.driver_task.replace(tokio::spawn(driver.run())) {
            task.abort();
        }
        self.local_addr = Some(local_addr);

        Ok(())
    }

    /// Returns the statistics for this server.
    pub fn stats(&self) -> &ServerStats {
        &self.state.stats
    }

    /// Returns the local address this server is bound to. `None` if the server is not bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl Drop for ShaperServer {
    fn drop(&mut self) {
        if let Some(task) = self.driver_task.take() {
            task.abort();
        }
    }
}
