use std::collections::VecDeque;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;

use crate::connection::{Connection, ConnectionConfig, ConnectionOwner};
use crate::context::ExecutionContext;
use crate::error::NetworkError;
use crate::packet::{Opcode, OwnedPacket, Packet};
use crate::queue::{ThreadsafeQueue, lock};

pub const DEFAULT_MAX_CONNECTIONS: usize = 32;
pub const DEFAULT_FIRST_CONNECTION_ID: u32 = 1;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Application hooks of a server.
///
/// `on_client_connect` runs on the network thread while accepting, the
/// other two run on whichever thread calls into the interface.
pub trait ServerHandler<T: Opcode>: Send + Sync + 'static {
    /// Admission gate. Rejects by default.
    fn on_client_connect(&self, _client: &Arc<Connection<T>>) -> bool {
        false
    }

    fn on_client_disconnect(&self, _client: &Arc<Connection<T>>) {}

    fn on_message(&self, client: &Arc<Connection<T>>, packet: &mut Packet<T>);
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_connections: usize,
    pub first_connection_id: u32,
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            first_connection_id: DEFAULT_FIRST_CONNECTION_ID,
            connection: ConnectionConfig::default(),
        }
    }
}

type ConnectionSet<T> = Mutex<VecDeque<Arc<Connection<T>>>>;

struct Shared<T: Opcode, H> {
    config: ServerConfig,
    handler: Arc<H>,
    incoming: Arc<ThreadsafeQueue<OwnedPacket<T>>>,
    connections: ConnectionSet<T>,
    /// Closed connections pulled out of the active set while accepting,
    /// waiting for their disconnect hook.
    departed: Mutex<Vec<Arc<Connection<T>>>>,
    next_id: AtomicU32,
}

pub struct ServerInterface<T: Opcode, H: ServerHandler<T>> {
    bind_addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    shared: Arc<Shared<T, H>>,
    context: Option<ExecutionContext>,
}

impl<T: Opcode, H: ServerHandler<T>> ServerInterface<T, H> {
    pub fn new(bind_addr: SocketAddr, handler: H, config: ServerConfig) -> Self {
        let next_id = AtomicU32::new(config.first_connection_id);
        Self {
            bind_addr,
            local_addr: None,
            shared: Arc::new(Shared {
                config,
                handler: Arc::new(handler),
                incoming: Arc::new(ThreadsafeQueue::new()),
                connections: Mutex::new(VecDeque::new()),
                departed: Mutex::new(Vec::new()),
                next_id,
            }),
            context: None,
        }
    }

    /// Binds the listener and starts accepting on a fresh execution context.
    /// Returns the bound address, which resolves an ephemeral port.
    pub fn start(&mut self) -> Result<SocketAddr, NetworkError> {
        if self.context.is_some() {
            return Err(NetworkError::AlreadyRunning);
        }

        let listener = StdTcpListener::bind(self.bind_addr).inspect_err(|err| {
            log::error!("[SERVER] Failed to bind {}: {}", self.bind_addr, err);
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let context = ExecutionContext::start("aenet-server")?;
        let listener = {
            let _guard = context.handle().enter();
            TcpListener::from_std(listener)?
        };
        context
            .handle()
            .spawn(accept_loop(Arc::clone(&self.shared), listener));

        self.context = Some(context);
        self.local_addr = Some(local_addr);
        log::info!("[SERVER] Started! Listening on {}", local_addr);
        Ok(local_addr)
    }

    /// Idempotent. Closes every tracked connection without firing disconnect hooks.
    pub fn stop(&mut self) {
        let Some(mut context) = self.context.take() else {
            return;
        };

        context.stop();
        let drained: Vec<_> = lock(&self.shared.connections).drain(..).collect();
        lock(&self.shared.departed).clear();
        for connection in &drained {
            connection.disconnect();
        }

        self.local_addr = None;
        log::info!("[SERVER] Stopped!");
    }

    pub fn is_running(&self) -> bool {
        self.context.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn handler(&self) -> &H {
        &self.shared.handler
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    pub fn connections(&self) -> Vec<Arc<Connection<T>>> {
        lock(&self.shared.connections).iter().cloned().collect()
    }

    pub fn connection_count(&self) -> usize {
        lock(&self.shared.connections).len()
    }

    /// Inbound packets not yet dispatched. `remote` is always set.
    pub fn incoming_queue(&self) -> &ThreadsafeQueue<OwnedPacket<T>> {
        &self.shared.incoming
    }

    /// Blocks until a packet is queued or `timeout` passes. Lets a host loop
    /// call `update` on a schedule even when nothing arrives.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.shared.incoming.wait_timeout(timeout)
    }

    /// Sends to one client. A client found disconnected is removed and
    /// reported through `on_client_disconnect` instead.
    pub fn send_packet_to_client(&self, client: &Arc<Connection<T>>, packet: &Packet<T>) {
        if client.is_connected() {
            client.send_packet(packet.clone());
        } else {
            self.prune(vec![Arc::clone(client)]);
        }
    }

    /// Sends to every live client except `ignore`. Dead clients found on the
    /// way are pruned once iteration is over.
    pub fn send_packet_to_all_clients(
        &self,
        packet: &Packet<T>,
        ignore: Option<&Arc<Connection<T>>>,
    ) {
        let snapshot = self.connections();
        let mut dead = Vec::new();

        for client in snapshot {
            if !client.is_connected() {
                dead.push(client);
                continue;
            }
            if ignore.is_some_and(|ignored| Arc::ptr_eq(ignored, &client)) {
                continue;
            }
            client.send_packet(packet.clone());
        }

        if !dead.is_empty() {
            self.prune(dead);
        }
    }

    /// Dispatches up to `max_messages` queued packets to the handler, then
    /// prunes dead connections. With `wait` set, blocks until something arrives.
    pub fn update(&self, max_messages: Option<usize>, wait: bool) -> usize {
        if wait {
            self.shared.incoming.wait();
        }

        let limit = max_messages.unwrap_or(usize::MAX);
        let mut processed = 0;

        while processed < limit {
            let Some(OwnedPacket { remote, mut packet }) = self.shared.incoming.pop_front() else {
                break;
            };
            processed += 1;

            match remote {
                Some(client) => self.shared.handler.on_message(&client, &mut packet),
                None => log::warn!("[SERVER] Dropping {:?} without origin", packet.id()),
            }
        }

        self.remove_dead_connections();
        processed
    }

    /// Removes closed connections and fires `on_client_disconnect` for each,
    /// including those already set aside while accepting.
    pub fn remove_dead_connections(&self) -> usize {
        let removed: Vec<_> = {
            let mut connections = lock(&self.shared.connections);
            let (dead, alive): (Vec<_>, Vec<_>) =
                connections.drain(..).partition(|c| !c.is_connected());
            connections.extend(alive);

            let mut removed: Vec<_> = lock(&self.shared.departed).drain(..).collect();
            removed.extend(dead);
            removed
        };

        for client in &removed {
            log::info!("[{}] Removing client", client.id());
            self.shared.handler.on_client_disconnect(client);
        }
        removed.len()
    }

    fn prune(&self, dead: Vec<Arc<Connection<T>>>) {
        let removed: Vec<_> = {
            let mut connections = lock(&self.shared.connections);
            let removed: Vec<_> = dead
                .into_iter()
                .filter(|client| {
                    let before = connections.len();
                    connections.retain(|c| !Arc::ptr_eq(c, client));
                    connections.len() != before
                })
                .collect();
            removed
        };

        for client in &removed {
            log::info!("[{}] Removing client", client.id());
            self.shared.handler.on_client_disconnect(client);
        }
    }
}

impl<T: Opcode, H: ServerHandler<T>> Drop for ServerInterface<T, H> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop<T: Opcode, H: ServerHandler<T>>(
    shared: Arc<Shared<T, H>>,
    listener: TcpListener,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => shared.admit(stream, addr),
            Err(err) => accept_failed(err).await,
        }
    }
}

/// Logs a failed accept and pauses before the next one. Errors like EMFILE
/// persist until resources are freed elsewhere.
async fn accept_failed(err: std::io::Error) {
    log::warn!("[SERVER] New connection error: {}", err);
    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
}

impl<T: Opcode, H: ServerHandler<T>> Shared<T, H> {
    fn admit(&self, stream: TcpStream, addr: SocketAddr) {
        log::info!("[SERVER] New connection: {}", addr);

        let connection = Arc::new(Connection::new(
            ConnectionOwner::Server,
            Handle::current(),
            Some(stream),
            Arc::downgrade(&self.incoming),
            self.config.connection.clone(),
        ));

        let live = {
            let mut connections = lock(&self.connections);
            let mut departed = lock(&self.departed);
            connections.retain(|c| {
                if c.is_connected() {
                    true
                } else {
                    departed.push(Arc::clone(c));
                    false
                }
            });
            connections.len()
        };
        if live >= self.config.max_connections {
            log::warn!(
                "[-----] Connection denied, {} of {} slots in use",
                live,
                self.config.max_connections
            );
            connection.disconnect();
            return;
        }

        if !self.handler.on_client_connect(&connection) {
            log::info!("[-----] Connection denied");
            connection.disconnect();
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.connections).push_back(Arc::clone(&connection));
        connection.connect_to_client(id);
        log::info!("[{}] Connection approved", id);
    }
}
