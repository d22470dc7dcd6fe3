use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::connection::{Connection, ConnectionConfig, ConnectionOwner, ConnectionState};
use crate::context::ExecutionContext;
use crate::error::NetworkError;
use crate::packet::{Opcode, OwnedPacket, Packet};
use crate::queue::ThreadsafeQueue;

const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(5);
const CONNECT_SLACK: Duration = Duration::from_millis(250);

pub trait ClientHandler<T: Opcode> {
    fn on_message(&mut self, packet: &mut Packet<T>);
}

/// Single outbound connection with its own execution context.
pub struct ClientInterface<T: Opcode, H> {
    config: ConnectionConfig,
    handler: H,
    incoming: Arc<ThreadsafeQueue<OwnedPacket<T>>>,
    connection: Option<Arc<Connection<T>>>,
    context: Option<ExecutionContext>,
    connect_budget: Duration,
}

impl<T: Opcode, H: ClientHandler<T>> ClientInterface<T, H> {
    pub fn new(handler: H, config: ConnectionConfig) -> Self {
        Self {
            config,
            handler,
            incoming: Arc::new(ThreadsafeQueue::new()),
            connection: None,
            context: None,
            connect_budget: Duration::ZERO,
        }
    }

    /// Resolves `host:port` and starts connecting in the background.
    ///
    /// `Ok` means resolution succeeded and the attempt is underway; use
    /// [`wait_until_connected`](Self::wait_until_connected) to learn the outcome.
    /// Any previous connection is torn down first.
    pub fn connect_to_server(&mut self, host: &str, port: u16) -> Result<(), NetworkError> {
        self.disconnect();

        let endpoints: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|source| NetworkError::Resolve {
                host: host.to_string(),
                source,
            })?
            .collect();
        if endpoints.is_empty() {
            return Err(NetworkError::NoAddress(format!("{}:{}", host, port)));
        }

        // Endpoints are tried one after another, each with its own timeout.
        let attempts = u32::try_from(endpoints.len()).unwrap_or(u32::MAX);
        let budget = self
            .config
            .connect_timeout
            .saturating_mul(attempts)
            .saturating_add(CONNECT_SLACK);

        let context = ExecutionContext::start("aenet-client")?;
        let connection = Arc::new(Connection::new(
            ConnectionOwner::Client,
            context.handle().clone(),
            None,
            Arc::downgrade(&self.incoming),
            self.config.clone(),
        ));
        connection.connect_to_server(endpoints);

        log::info!("Connecting to {}:{}", host, port);
        self.connection = Some(connection);
        self.context = Some(context);
        self.connect_budget = budget;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.connect_budget = Duration::ZERO;
        if let Some(connection) = self.connection.take() {
            connection.disconnect();
        }
        if let Some(mut context) = self.context.take() {
            context.stop();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.is_connected())
    }

    /// Polls until the pending connect resolves. False on failure or timeout.
    pub fn wait_until_connected(&self, timeout: Duration) -> bool {
        let Some(connection) = &self.connection else {
            return false;
        };

        let deadline = Instant::now() + timeout;
        loop {
            match connection.state() {
                ConnectionState::Connected => return true,
                ConnectionState::Closed => return false,
                ConnectionState::Disconnected | ConnectionState::Connecting => {}
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(CONNECT_POLL_INTERVAL);
        }
    }

    /// Longest a pending connect can take to resolve: the per-endpoint timeout
    /// over every resolved endpoint. Zero when no connect was started.
    pub fn connect_budget(&self) -> Duration {
        self.connect_budget
    }

    pub fn connection(&self) -> Option<&Arc<Connection<T>>> {
        self.connection.as_ref()
    }

    /// Queues a packet. Silently dropped while not connected.
    pub fn send_packet(&self, packet: Packet<T>) {
        match &self.connection {
            Some(connection) if connection.is_connected() => connection.send_packet(packet),
            _ => log::debug!("Not connected, dropping {:?}", packet.id()),
        }
    }

    pub fn incoming_queue(&self) -> &ThreadsafeQueue<OwnedPacket<T>> {
        &self.incoming
    }

    /// Dispatches up to `max_messages` queued packets to the handler.
    /// With `wait` set, blocks until something arrives.
    pub fn update(&mut self, max_messages: Option<usize>, wait: bool) -> usize {
        if wait {
            self.incoming.wait();
        }

        let limit = max_messages.unwrap_or(usize::MAX);
        let mut processed = 0;
        while processed < limit {
            let Some(mut owned) = self.incoming.pop_front() else {
                break;
            };
            self.handler.on_message(&mut owned.packet);
            processed += 1;
        }
        processed
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}

impl<T: Opcode, H> Drop for ClientInterface<T, H> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.disconnect();
        }
        if let Some(mut context) = self.context.take() {
            context.stop();
        }
    }
}
