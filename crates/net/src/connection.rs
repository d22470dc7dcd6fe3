use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::runtime::Handle;
use tokio::sync::{Notify, watch};

use crate::error::NetworkError;
use crate::packet::{DEFAULT_MAX_BODY_SIZE, HEADER_SIZE, Opcode, OwnedPacket, Packet, PacketHeader};
use crate::queue::{ThreadsafeQueue, lock};

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 120;
const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOwner {
    Server,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub connect_timeout: Duration,
    /// Bounds every header and body read. `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub write_timeout: Duration,
    pub max_body_size: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Some(Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS)),
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// One TCP link to a remote peer.
///
/// The socket is driven by a reader task and a writer task on the owning
/// execution context. Completed inbound packets land on the owner's queue;
/// outbound packets are written strictly in the order they were sent.
pub struct Connection<T: Opcode> {
    owner: ConnectionOwner,
    id: AtomicU32,
    authorized: AtomicBool,
    state: Mutex<ConnectionState>,
    peer_addr: Mutex<Option<SocketAddr>>,
    socket: Mutex<Option<TcpStream>>,
    runtime: Handle,
    config: ConnectionConfig,
    outgoing: ThreadsafeQueue<Packet<T>>,
    write_ready: Notify,
    closed: watch::Sender<bool>,
    incoming: Weak<ThreadsafeQueue<OwnedPacket<T>>>,
}

impl<T: Opcode> Connection<T> {
    pub fn new(
        owner: ConnectionOwner,
        runtime: Handle,
        socket: Option<TcpStream>,
        incoming: Weak<ThreadsafeQueue<OwnedPacket<T>>>,
        config: ConnectionConfig,
    ) -> Self {
        let peer_addr = socket.as_ref().and_then(|s| s.peer_addr().ok());
        let state = if socket.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        let (closed, _) = watch::channel(false);

        Self {
            owner,
            id: AtomicU32::new(0),
            authorized: AtomicBool::new(false),
            state: Mutex::new(state),
            peer_addr: Mutex::new(peer_addr),
            socket: Mutex::new(socket),
            runtime,
            config,
            outgoing: ThreadsafeQueue::new(),
            write_ready: Notify::new(),
            closed,
            incoming,
        }
    }

    pub fn owner(&self) -> ConnectionOwner {
        self.owner
    }

    /// Assigned by the server at accept time; always 0 on the client side.
    pub fn id(&self) -> u32 {
        self.id.load(Ordering::SeqCst)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *lock(&self.peer_addr)
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_client_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    /// Only meaningful on server-side connections.
    pub fn set_client_auth(&self, authorized: bool) {
        if self.owner == ConnectionOwner::Server {
            self.authorized.store(authorized, Ordering::SeqCst);
        }
    }

    /// Number of packets still waiting to be written.
    pub fn pending_writes(&self) -> usize {
        self.outgoing.len()
    }

    /// Starts the read cycle of an accepted connection and tags it with `client_id`.
    pub fn connect_to_client(self: &Arc<Self>, client_id: u32) {
        if self.owner != ConnectionOwner::Server {
            log::warn!("connect_to_client called on a client-side connection");
            return;
        }

        let Some(stream) = lock(&self.socket).take() else {
            return;
        };

        if !self.is_connected() {
            return;
        }

        self.id.store(client_id, Ordering::SeqCst);
        self.start_io(stream);
    }

    /// Connects to the first reachable endpoint in the background and starts
    /// the read cycle on success.
    pub fn connect_to_server(self: &Arc<Self>, endpoints: Vec<SocketAddr>) {
        if self.owner != ConnectionOwner::Client {
            log::warn!("connect_to_server called on a server-side connection");
            return;
        }

        {
            let mut state = lock(&self.state);
            if *state != ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Connecting;
        }

        let connection = Arc::clone(self);
        self.runtime.spawn(async move {
            let mut closed = connection.closed.subscribe();
            let attempt = tokio::select! {
                result = connection.connect_any(&endpoints) => Some(result),
                _ = wait_closed(&mut closed) => None,
            };

            match attempt {
                Some(Ok(stream)) => {
                    let peer = stream.peer_addr().ok();
                    {
                        let mut state = lock(&connection.state);
                        if *state != ConnectionState::Connecting {
                            return;
                        }
                        *state = ConnectionState::Connected;
                    }
                    *lock(&connection.peer_addr) = peer;
                    if let Some(peer) = peer {
                        log::info!("Connected to {}", peer);
                    }
                    connection.start_io(stream);
                }
                Some(Err(err)) => {
                    log::warn!("Connect failed: {}", err);
                    connection.close();
                }
                None => {}
            }
        });
    }

    /// Schedules the socket to be closed by the execution context that drives it.
    pub fn disconnect(&self) {
        if self.state() != ConnectionState::Closed {
            log::debug!("[{}] Disconnect requested", self.id());
            self.close();
        }
    }

    /// Queues a packet for writing. Safe to call from any thread.
    pub fn send_packet(&self, packet: Packet<T>) {
        if self.state() == ConnectionState::Closed {
            log::debug!("[{}] Dropping {:?}, connection is closed", self.id(), packet.id());
            return;
        }

        if packet.len() > self.config.max_body_size as usize {
            log::warn!(
                "[{}] Dropping {:?}, body of {} bytes exceeds the {} byte limit",
                self.id(),
                packet.id(),
                packet.len(),
                self.config.max_body_size
            );
            return;
        }

        self.outgoing.push_back(packet);
        self.write_ready.notify_one();
    }

    fn close(&self) {
        let previous = std::mem::replace(&mut *lock(&self.state), ConnectionState::Closed);
        self.closed.send_replace(true);
        lock(&self.socket).take();

        if previous != ConnectionState::Closed {
            log::debug!("[{}] Connection closed", self.id());
        }
    }

    fn start_io(self: &Arc<Self>, stream: TcpStream) {
        let (reader, writer) = stream.into_split();
        self.runtime.spawn(Arc::clone(self).read_loop(reader));
        self.runtime.spawn(Arc::clone(self).write_loop(writer));
    }

    async fn connect_any(&self, endpoints: &[SocketAddr]) -> Result<TcpStream, NetworkError> {
        let mut last_error = None;

        for addr in endpoints {
            match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await
            {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(err)) => last_error = Some(NetworkError::Io(err)),
                Err(_) => last_error = Some(NetworkError::Timeout("connect")),
            }
        }

        Err(last_error.unwrap_or_else(|| NetworkError::NoAddress("no endpoints".to_string())))
    }

    async fn read_loop(self: Arc<Self>, mut reader: OwnedReadHalf) {
        let mut closed = self.closed.subscribe();
        let result = tokio::select! {
            result = self.read_packets(&mut reader) => result,
            _ = wait_closed(&mut closed) => Ok(()),
        };

        match result {
            Ok(()) => {}
            Err(NetworkError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                log::info!("[{}] Peer closed the connection", self.id());
            }
            Err(err) => log::warn!("[{}] Read failed: {}", self.id(), err),
        }
        self.close();
    }

    async fn read_packets(
        self: &Arc<Self>,
        reader: &mut OwnedReadHalf,
    ) -> Result<(), NetworkError> {
        let mut header_buf = [0u8; HEADER_SIZE];

        loop {
            self.read_exact_timed(reader, &mut header_buf).await?;
            let header = PacketHeader::<T>::from_bytes(&header_buf)?;

            if header.size > self.config.max_body_size {
                return Err(NetworkError::FrameTooLarge {
                    size: header.size,
                    max: self.config.max_body_size,
                });
            }

            let mut body = vec![0u8; header.size as usize];
            if !body.is_empty() {
                log::trace!(
                    "[{}] Header {:?} announces {} body bytes",
                    self.id(),
                    header.id,
                    header.size
                );
                self.read_exact_timed(reader, &mut body).await?;
            }

            self.add_to_incoming(Packet::from_parts(header.id, body))?;
        }
    }

    fn add_to_incoming(self: &Arc<Self>, packet: Packet<T>) -> Result<(), NetworkError> {
        let incoming = self.incoming.upgrade().ok_or(NetworkError::QueueClosed)?;
        let remote = match self.owner {
            ConnectionOwner::Server => Some(Arc::clone(self)),
            ConnectionOwner::Client => None,
        };

        log::trace!("[{}] Queued {:?} ({} bytes)", self.id(), packet.id(), packet.len());
        incoming.push_back(OwnedPacket { remote, packet });
        Ok(())
    }

    async fn read_exact_timed(
        &self,
        reader: &mut OwnedReadHalf,
        buf: &mut [u8],
    ) -> Result<(), NetworkError> {
        match self.config.read_timeout {
            Some(limit) => {
                tokio::time::timeout(limit, reader.read_exact(buf))
                    .await
                    .map_err(|_| NetworkError::Timeout("read"))??;
            }
            None => {
                reader.read_exact(buf).await?;
            }
        }
        Ok(())
    }

    async fn write_loop(self: Arc<Self>, mut writer: OwnedWriteHalf) {
        let mut closed = self.closed.subscribe();
        let result = tokio::select! {
            result = self.write_packets(&mut writer) => result,
            _ = wait_closed(&mut closed) => Ok(()),
        };

        if let Err(err) = result {
            log::warn!("[{}] Write failed: {}", self.id(), err);
        }
        self.close();
    }

    async fn write_packets(&self, writer: &mut OwnedWriteHalf) -> Result<(), NetworkError> {
        loop {
            while let Some((header, body)) = self
                .outgoing
                .front_map(|packet| (packet.header().to_bytes(), packet.body().to_vec()))
            {
                self.write_all_timed(writer, &header).await?;
                if !body.is_empty() {
                    self.write_all_timed(writer, &body).await?;
                }
                self.outgoing.pop_front();
            }

            self.write_ready.notified().await;
        }
    }

    async fn write_all_timed(
        &self,
        writer: &mut OwnedWriteHalf,
        buf: &[u8],
    ) -> Result<(), NetworkError> {
        tokio::time::timeout(self.config.write_timeout, writer.write_all(buf))
            .await
            .map_err(|_| NetworkError::Timeout("write"))??;
        Ok(())
    }
}

impl<T: Opcode> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("owner", &self.owner)
            .field("state", &self.state())
            .field("peer_addr", &self.peer_addr())
            .finish()
    }
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Ping;

    impl Opcode for Ping {
        fn to_raw(self) -> u16 {
            1
        }

        fn from_raw(raw: u16) -> Option<Self> {
            (raw == 1).then_some(Ping)
        }
    }

    fn unconnected(owner: ConnectionOwner, context: &ExecutionContext) -> Connection<Ping> {
        Connection::new(
            owner,
            context.handle().clone(),
            None,
            Weak::new(),
            ConnectionConfig::default(),
        )
    }

    #[test]
    fn test_auth_flag_only_applies_to_server_side() {
        let context = ExecutionContext::start("test-auth").unwrap();

        let server_side = unconnected(ConnectionOwner::Server, &context);
        server_side.set_client_auth(true);
        assert!(server_side.is_client_authorized());

        let client_side = unconnected(ConnectionOwner::Client, &context);
        client_side.set_client_auth(true);
        assert!(!client_side.is_client_authorized());
    }

    #[test]
    fn test_closed_connection_drops_sends() {
        let context = ExecutionContext::start("test-closed").unwrap();
        let connection = unconnected(ConnectionOwner::Client, &context);
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        connection.disconnect();
        assert_eq!(connection.state(), ConnectionState::Closed);

        connection.send_packet(Packet::new(Ping));
        assert_eq!(connection.pending_writes(), 0);
        assert!(!connection.is_connected());
    }

    #[test]
    fn test_connect_with_no_endpoints_closes() {
        let context = ExecutionContext::start("test-empty").unwrap();
        let connection = Arc::new(unconnected(ConnectionOwner::Client, &context));

        connection.connect_to_server(Vec::new());

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while connection.state() != ConnectionState::Closed && std::time::Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(connection.id(), 0);
    }
}
