use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn, Instrument};

use shaper_core::{errno, Registry};
use shaper_wire::{Codec, Error as WireError, Frame, Reply, Request};

use super::{handler, stats::ClientGuard, ServerOptions, ServerState};

/// How long a rejected connection is drained before it is dropped.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Accepts connections and spawns a [`Session`] for each of them.
pub(crate) struct ServerDriver {
    pub(crate) listener: TcpListener,
    pub(crate) registry: Arc<Registry>,
    /// Options shared with the server.
    pub(crate) options: Arc<ServerOptions>,
    /// State shared with the server.
    pub(crate) state: Arc<ServerState>,
    pub(crate) span: tracing::Span,
}

impl ServerDriver {
    pub(crate) async fn run(self) {
        let span = self.span.clone();
        self.accept_loop().instrument(span).await
    }

    async fn accept_loop(self) {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(incoming) => incoming,
                Err(e) => {
                    error!(?e, "error accepting incoming connection");
                    continue;
                }
            };

            if let Some(max) = self.options.max_clients {
                if self.state.stats.active_clients() >= max {
                    warn!(max, %addr, "max connections reached, rejecting new incoming connection");
                    drop(stream);
                    continue;
                }
            }

            if let Err(e) = stream.set_nodelay(true) {
                debug!(?e, %addr, "failed to set TCP_NODELAY");
            }

            info!(%addr, "new connection");

            let session = Session {
                conn: Framed::new(stream, Codec::new(self.options.max_frame_size)),
                addr,
                registry: Arc::clone(&self.registry),
                options: Arc::clone(&self.options),
                state: Arc::clone(&self.state),
                _client: self.state.stats.connect(),
            };

            tokio::spawn(session.run().instrument(tracing::debug_span!("session", %addr)));
        }
    }
}

/// A connected client. Requests are answered in the order they arrive.
struct Session {
    conn: Framed<TcpStream, Codec>,
    addr: SocketAddr,
    registry: Arc<Registry>,
    options: Arc<ServerOptions>,
    state: Arc<ServerState>,
    /// Counts the session as an active client until it ends.
    _client: ClientGuard,
}

impl Session {
    async fn run(mut self) {
        let mut drain = false;

        while let Some(frame) = self.conn.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(WireError::FrameTooLarge { seq, size, max }) => {
                    // The payload is still in flight, so the stream can't be resynchronized.
                    warn!(seq, size, max, "request too large, closing connection");
                    self.state.stats.increment_oversized();
                    let reply = Reply::Error {
                        code: errno::EMSGSIZE,
                        message: format!(
                            "request of {size} bytes exceeds the limit of {max} bytes"
                        ),
                    };
                    if let Err(e) = self.respond(seq, reply).await {
                        debug!(?e, "failed to reject oversized request");
                    }
                    drain = true;
                    break;
                }
                Err(e) => {
                    warn!(?e, "wire protocol error, closing connection");
                    break;
                }
            };

            self.state.stats.record_request(frame.cmd(), frame.size());
            let seq = frame.seq();
            let reply = self.process(&frame).await;

            if let Err(e) = self.respond(seq, reply).await {
                warn!(?e, "failed to send reply, closing connection");
                break;
            }
        }

        debug!(addr = %self.addr, "connection closed");

        if drain {
            // Read what the peer still sends so the reply isn't lost to a reset.
            let mut stream = self.conn.into_inner();
            let _ = stream.shutdown().await;
            let drained = tokio::time::timeout(
                DRAIN_TIMEOUT,
                tokio::io::copy(&mut stream, &mut tokio::io::sink()),
            )
            .await;
            debug!(?drained, "rejected connection drained");
        }
    }

    async fn process(&self, frame: &Frame) -> Reply {
        let request = match Request::from_frame(frame) {
            Ok(request) => request,
            Err(e) => {
                debug!(?e, cmd = frame.cmd(), "malformed request");
                self.state.stats.increment_malformed();
                return Reply::Error { code: errno::EINVAL, message: e.to_string() };
            }
        };

        debug!(seq = frame.seq(), ?request, "request");

        let registry = Arc::clone(&self.registry);
        let max_page_size = self.options.max_page_size;
        let handled =
            tokio::task::spawn_blocking(move || handler::handle(&registry, request, max_page_size));

        match handled.await {
            Ok(reply) => reply,
            Err(e) => {
                error!(?e, "request handler failed");
                Reply::Error { code: errno::EIO, message: "internal error".to_string() }
            }
        }
    }

    async fn respond(&mut self, seq: u32, reply: Reply) -> Result<(), WireError> {
        let failed = matches!(reply, Reply::Error { .. });
        if failed {
            self.state.stats.increment_failed();
        }

        let frame = reply.to_frame(seq);
        let size = frame.size();

        match self.conn.send(frame).await {
            Ok(()) => {
                self.state.stats.increment_tx(size);
                Ok(())
            }
            Err(WireError::FrameTooLarge { size, max, .. }) => {
                warn!(seq, size, max, "reply too large, sending an error instead");
                self.state.stats.increment_oversized();
                let reply = Reply::Error {
                    code: errno::EMSGSIZE,
                    message: format!("reply of {size} bytes exceeds the limit of {max} bytes"),
                };
                if !failed {
                    self.state.stats.increment_failed();
                }

                let frame = reply.to_frame(seq);
                let size = frame.size();
                self.conn.send(frame).await?;
                self.state.stats.increment_tx(size);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
