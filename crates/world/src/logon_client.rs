use std::thread;
use std::time::{Duration, Instant};

use aenet::{
    AuthRequest, AuthResponse, Backoff, ClientHandler, ClientInterface, ConnectionState,
    LogonMessage, LogonOpcode, NetworkError, Packet, PingResult, PingStatus,
};

use crate::config::WorldConfig;

const AUTH_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("logon server rejected realm {realm_id}")]
    Rejected { realm_id: u8 },
    #[error("gave up after {attempts} connection attempts")]
    GaveUp { attempts: u32 },
}

/// Responses from the logon server, applied as they are drained.
#[derive(Debug)]
pub struct LogonResponses {
    epoch: Instant,
    auth_result: Option<bool>,
    latency: Option<Duration>,
}

impl Default for LogonResponses {
    fn default() -> Self {
        Self {
            epoch: Instant::now(),
            auth_result: None,
            latency: None,
        }
    }
}

impl LogonResponses {
    pub fn auth_result(&self) -> Option<bool> {
        self.auth_result
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn reset(&mut self) {
        self.auth_result = None;
    }
}

impl ClientHandler<LogonOpcode> for LogonResponses {
    fn on_message(&mut self, packet: &mut Packet<LogonOpcode>) {
        match packet.id() {
            LogonOpcode::SmsgAuthResponse => match AuthResponse::read(packet) {
                Ok(response) => self.auth_result = Some(response.result),
                Err(err) => log::warn!("Malformed auth response: {}", err),
            },
            LogonOpcode::SmsgLogonPingResult => match PingResult::read(packet) {
                Ok(result) => {
                    let rtt = self.now_ms().saturating_sub(result.timestamp_ms);
                    self.latency = Some(Duration::from_millis(rtt));
                }
                Err(err) => log::warn!("Malformed ping result: {}", err),
            },
            op => log::debug!("Unhandled logon opcode {:?}", op),
        }
    }
}

/// World side of the logon ↔ world link.
pub struct LogonCommClient {
    config: WorldConfig,
    client: ClientInterface<LogonOpcode, LogonResponses>,
    backoff: Backoff,
    last_ping: Option<Instant>,
}

impl LogonCommClient {
    pub fn new(config: WorldConfig) -> Self {
        let client = ClientInterface::new(LogonResponses::default(), config.connection_config());
        let backoff = Backoff::new(config.reconnect_initial, config.reconnect_max);
        Self {
            config,
            client,
            backoff,
            last_ping: None,
        }
    }

    /// Connects and authenticates, retrying with backoff until it succeeds,
    /// the realm is rejected, or the attempt budget runs out.
    pub fn try_to_connect(&mut self) -> Result<(), ConnectError> {
        let mut attempts = 0;

        loop {
            attempts += 1;
            log::info!(
                "Connecting to logon server {}:{} (attempt {})",
                self.config.logon_host,
                self.config.logon_port,
                attempts
            );

            match self.connect_once() {
                Ok(true) => {
                    log::info!("Realm {} authenticated with logon server", self.config.realm_id);
                    self.backoff.reset();
                    self.last_ping = Some(Instant::now());
                    return Ok(());
                }
                Ok(false) => {
                    log::error!("Logon server rejected realm {}", self.config.realm_id);
                    return Err(ConnectError::Rejected {
                        realm_id: self.config.realm_id,
                    });
                }
                Err(err) => log::warn!("Logon connection failed: {}", err),
            }

            if self
                .config
                .max_connect_attempts
                .is_some_and(|max| attempts >= max)
            {
                return Err(ConnectError::GaveUp { attempts });
            }

            let delay = self.backoff.next_delay();
            log::info!("Retrying in {:?}", delay);
            thread::sleep(delay);
        }
    }

    fn connect_once(&mut self) -> Result<bool, NetworkError> {
        self.client.handler_mut().reset();
        self.client.connect_to_server(&self.config.logon_host, self.config.logon_port)?;

        if !self.client.wait_until_connected(self.client.connect_budget()) {
            let refused = self
                .client
                .connection()
                .is_some_and(|c| c.state() == ConnectionState::Closed);
            self.client.disconnect();
            return Err(if refused {
                NetworkError::NotConnected
            } else {
                NetworkError::Timeout("connect")
            });
        }

        self.send_auth();

        let deadline = Instant::now() + self.config.auth_timeout;
        while Instant::now() < deadline {
            let connected = self.client.is_connected();
            self.client.update(None, false);

            if let Some(result) = self.client.handler().auth_result() {
                if !result {
                    self.client.disconnect();
                }
                return Ok(result);
            }
            if !connected {
                self.client.disconnect();
                return Err(NetworkError::NotConnected);
            }
            thread::sleep(AUTH_POLL_INTERVAL);
        }

        self.client.disconnect();
        Err(NetworkError::Timeout("auth"))
    }

    /// Drains responses and keeps the link alive. Reconnects if the link was lost.
    pub fn update(&mut self) -> Result<usize, ConnectError> {
        if !self.client.is_connected() {
            log::warn!("Lost connection to logon server");
            self.try_to_connect()?;
        }

        let processed = self.client.update(None, false);

        let ping_due = self
            .last_ping
            .is_none_or(|sent| sent.elapsed() >= self.config.ping_interval);
        if ping_due {
            self.send_ping();
        }

        Ok(processed)
    }

    pub fn send_auth(&self) {
        log::debug!("Sending auth request for realm {}", self.config.realm_id);
        self.client.send_packet(
            AuthRequest {
                password: self.config.remote_password.clone(),
                realm_id: self.config.realm_id,
            }
            .to_packet(),
        );
    }

    pub fn send_ping(&mut self) {
        let timestamp_ms = self.client.handler().now_ms();
        self.client.send_packet(PingStatus { timestamp_ms }.to_packet());
        self.last_ping = Some(Instant::now());
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.is_connected() && self.client.handler().auth_result() == Some(true)
    }

    /// Round trip of the last answered ping.
    pub fn latency(&self) -> Option<Duration> {
        self.client.handler().latency()
    }
}
