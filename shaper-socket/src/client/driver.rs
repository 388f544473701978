use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{ready, Context, Poll},
    time::Instant,
};

use futures::{SinkExt, StreamExt};
use rustc_hash::FxHashMap;
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
    time::Interval,
};
use tokio_util::codec::Framed;
use tracing::{debug, error, warn};

use shaper_wire::{Codec, Frame, Reply};

use super::{ClientError, ClientOptions, Command};

/// The client driver. Endless future that drives the connection forward.
pub(crate) struct ClientDriver {
    /// Options shared with the client.
    pub(crate) options: Arc<ClientOptions>,
    /// Sequence counter for outgoing requests.
    pub(crate) seq_counter: u32,
    /// Commands from the client handles.
    pub(crate) from_client: mpsc::Receiver<Command>,
    /// The framed connection to the server.
    pub(crate) conn: Framed<TcpStream, Codec>,
    /// The outgoing frame queue.
    pub(crate) egress_queue: VecDeque<Frame>,
    /// The requests awaiting a reply, by sequence number.
    pub(crate) pending_requests: FxHashMap<u32, PendingRequest>,
    /// Interval at which pending requests are checked for timeouts.
    pub(crate) timeout_check_interval: Interval,
}

pub(crate) struct PendingRequest {
    start: Instant,
    sender: oneshot::Sender<Result<Reply, ClientError>>,
}

impl ClientDriver {
    fn on_frame(&mut self, frame: Frame) {
        let Some(pending) = self.pending_requests.remove(&frame.seq()) else {
            debug!(seq = frame.seq(), "reply for unknown or expired request");
            return;
        };

        let _ = pending.sender.send(Reply::from_frame(&frame).map_err(ClientError::from));
    }

    fn on_send(&mut self, command: Command) {
        match command {
            Command::Send { request, response } => {
                let seq = self.seq_counter;
                // Wrap add here to avoid overflow
                self.seq_counter = seq.wrapping_add(1);

                self.egress_queue.push_back(request.to_frame(seq));
                let pending = PendingRequest {
                    start: Instant::now(),
                    sender: response,
                };
                self.pending_requests.insert(seq, pending);
            }
        }
    }

    fn check_timeouts(&mut self) {
        let timeout = self.options.timeout;
        let expired: Vec<u32> = self
            .pending_requests
            .iter()
            .filter(|(_, pending)| pending.start.elapsed() > timeout)
            .map(|(seq, _)| *seq)
            .collect();

        for seq in expired {
            if let Some(pending) = self.pending_requests.remove(&seq) {
                warn!(seq, ?timeout, "request timed out");
                let _ = pending.sender.send(Err(ClientError::Timeout));
            }
        }
    }
}

impl Future for ClientDriver {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        loop {
            let _ = this.conn.poll_flush_unpin(cx);

            if this.timeout_check_interval.poll_tick(cx).is_ready() {
                this.check_timeouts();
            }

            // Check for incoming replies
            match this.conn.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    this.on_frame(frame);
                    continue;
                }
                Poll::Ready(Some(Err(e))) => {
                    // Pending senders are dropped with the driver and report a closed socket.
                    error!(?e, "connection failed, shutting down driver");
                    return Poll::Ready(());
                }
                Poll::Ready(None) => {
                    debug!("connection closed by server, shutting down driver");
                    return Poll::Ready(());
                }
                Poll::Pending => {}
            }

            if this.conn.poll_ready_unpin(cx).is_ready() {
                if let Some(frame) = this.egress_queue.pop_front() {
                    let seq = frame.seq();
                    if let Err(e) = this.conn.start_send_unpin(frame) {
                        error!(?e, seq, "failed to send request");
                        if let Some(pending) = this.pending_requests.remove(&seq) {
                            let _ = pending.sender.send(Err(e.into()));
                        }
                    }
                    continue;
                }
            }

            // Check for outgoing requests from the client handles
            match this.from_client.poll_recv(cx) {
                Poll::Ready(Some(command)) => {
                    this.on_send(command);
                    continue;
                }
                Poll::Ready(None) => {
                    debug!("client dropped, shutting down driver and flushing connection");
                    let _ = ready!(this.conn.poll_close_unpin(cx));
                    return Poll::Ready(());
                }
                Poll::Pending => {}
            }

            return Poll::Pending;
        }
    }
}
