use std::fmt;
use std::time::Duration;

use aenet::ConnectionConfig;

#[derive(Clone)]
pub struct WorldConfig {
    pub logon_host: String,
    pub logon_port: u16,
    pub realm_id: u8,
    pub remote_password: String,
    pub ping_interval: Duration,
    pub auth_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    /// `None` retries forever.
    pub max_connect_attempts: Option<u32>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            logon_host: "127.0.0.1".to_string(),
            logon_port: aenet::DEFAULT_LOGON_PORT,
            realm_id: 1,
            remote_password: String::new(),
            ping_interval: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            reconnect_initial: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
            max_connect_attempts: None,
        }
    }
}

impl WorldConfig {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: self.connect_timeout,
            ..ConnectionConfig::default()
        }
    }
}

impl fmt::Debug for WorldConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldConfig")
            .field("logon_host", &self.logon_host)
            .field("logon_port", &self.logon_port)
            .field("realm_id", &self.realm_id)
            .field("ping_interval", &self.ping_interval)
            .field("auth_timeout", &self.auth_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect_initial", &self.reconnect_initial)
            .field("reconnect_max", &self.reconnect_max)
            .field("max_connect_attempts", &self.max_connect_attempts)
            .finish_non_exhaustive()
    }
}
