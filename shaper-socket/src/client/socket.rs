use std::{collections::VecDeque, sync::Arc, time::Duration};

use rustc_hash::FxHashMap;
use tokio::{
    net::{TcpStream, ToSocketAddrs},
    sync::{mpsc, oneshot},
};
use tokio_util::codec::Framed;
use tracing::debug;

use shaper_core::{Capabilities, Cursor, Handle, Page, Scope, ShaperInfo, ShaperUpdate};
use shaper_wire::{message::reply, Codec, Reply, Request};

use super::{driver::ClientDriver, ClientError, ClientOptions, Command, DEFAULT_BUFFER_SIZE};

/// A client of a [`ShaperServer`](crate::ShaperServer).
///
/// Cloning the client is cheap: clones share the underlying connection, and requests from any
/// of them may be in flight at the same time.
#[derive(Debug, Clone)]
pub struct ShaperClient {
    /// Command channel to the driver task.
    to_driver: Option<mpsc::Sender<Command>>,
    /// Options for the client. These are shared with the driver task.
    options: Arc<ClientOptions>,
}

impl Default for ShaperClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaperClient {
    pub fn new() -> Self {
        Self::with_options(ClientOptions::default())
    }

    pub fn with_options(options: ClientOptions) -> Self {
        Self { to_driver: None, options: Arc::new(options) }
    }

    /// Connects to the server at `addr` and spawns the driver task.
    pub async fn connect(&mut self, addr: impl ToSocketAddrs) -> Result<(), ClientError> {
        let (to_driver, from_client) = mpsc::channel(DEFAULT_BUFFER_SIZE);

        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(peer = ?stream.peer_addr().ok(), "connected");

        let check_every = (self.options.timeout / 10).max(Duration::from_millis(1));
        let driver = ClientDriver {
            options: Arc::clone(&self.options),
            seq_counter: 0,
            from_client,
            conn: Framed::new(stream, Codec::new(self.options.max_frame_size)),
            egress_queue: VecDeque::new(),
            pending_requests: FxHashMap::default(),
            timeout_check_interval: tokio::time::interval(check_every),
        };

        tokio::spawn(driver);
        self.to_driver = Some(to_driver);

        Ok(())
    }

    /// Sends a raw request and waits for its reply. Error replies are returned as
    /// [`ClientError::Remote`].
    pub async fn request(&self, request: Request) -> Result<Reply, ClientError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.to_driver
            .as_ref()
            .ok_or(ClientError::SocketClosed)?
            .send(Command::Send { request, response: response_tx })
            .await
            .map_err(|_| ClientError::SocketClosed)?;

        match response_rx.await.map_err(|_| ClientError::SocketClosed)?? {
            Reply::Error { code, message } => Err(ClientError::Remote { code, message }),
            reply => Ok(reply),
        }
    }

    /// Reads a single shaper.
    pub async fn get(&self, ifindex: u32, handle: Handle) -> Result<ShaperInfo, ClientError> {
        match self.request(Request::Get { ifindex, handle }).await? {
            Reply::Shaper(info) => Ok(info),
            other => Err(ClientError::UnexpectedReply(other.kind())),
        }
    }

    /// Reads the page of shapers following `cursor`. A `page_size` of `None` lets the server
    /// pick.
    pub async fn dump_page(
        &self,
        ifindex: u32,
        cursor: Cursor,
        page_size: Option<u32>,
    ) -> Result<Page, ClientError> {
        match self.request(Request::Dump { ifindex, cursor: cursor.raw(), page_size }).await? {
            Reply::Shapers { shapers, cursor } => {
                Ok(Page { shapers, next: cursor.map(Cursor::from_raw) })
            }
            other => Err(ClientError::UnexpectedReply(other.kind())),
        }
    }

    /// Reads every shaper of a device, one page at a time.
    pub async fn dump_all(&self, ifindex: u32) -> Result<Vec<ShaperInfo>, ClientError> {
        let mut shapers = Vec::new();
        let mut cursor = Cursor::START;

        loop {
            let page = self.dump_page(ifindex, cursor, None).await?;
            shapers.extend(page.shapers);
            match page.next {
                Some(next) => cursor = next,
                None => return Ok(shapers),
            }
        }
    }

    /// Creates or updates shapers, returning how many the device applied.
    pub async fn set(
        &self,
        ifindex: u32,
        shapers: Vec<ShaperUpdate>,
    ) -> Result<usize, ClientError> {
        self.modify(Request::Set { ifindex, shapers }).await
    }

    /// Removes shapers, returning how many the device removed.
    pub async fn delete(&self, ifindex: u32, handles: Vec<Handle>) -> Result<usize, ClientError> {
        self.modify(Request::Delete { ifindex, handles }).await
    }

    /// Reparents shapers, returning how many moves the device applied.
    pub async fn move_shapers(
        &self,
        ifindex: u32,
        moves: Vec<(Handle, Handle)>,
    ) -> Result<usize, ClientError> {
        self.modify(Request::Move { ifindex, moves }).await
    }

    /// Reads the capabilities of a single scope.
    pub async fn capabilities(
        &self,
        ifindex: u32,
        scope: Scope,
    ) -> Result<Capabilities, ClientError> {
        match self.request(Request::CapGet { ifindex, scope }).await? {
            Reply::Capabilities(caps) => caps
                .into_iter()
                .find(|(s, _)| *s == scope)
                .map(|(_, caps)| caps)
                .ok_or(ClientError::UnexpectedReply(reply::CAPABILITIES)),
            other => Err(ClientError::UnexpectedReply(other.kind())),
        }
    }

    /// Reads the capabilities of every scope the device supports.
    pub async fn capabilities_all(
        &self,
        ifindex: u32,
    ) -> Result<Vec<(Scope, Capabilities)>, ClientError> {
        match self.request(Request::CapDump { ifindex }).await? {
            Reply::Capabilities(caps) => Ok(caps),
            other => Err(ClientError::UnexpectedReply(other.kind())),
        }
    }

    async fn modify(&self, request: Request) -> Result<usize, ClientError> {
        match self.request(request).await? {
            Reply::Modified(count) => Ok(count as usize),
            other => Err(ClientError::UnexpectedReply(other.kind())),
        }
    }
}
