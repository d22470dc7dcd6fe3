use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogonConfig {
    pub bind: String,
    pub port: u16,
    pub max_connections: usize,
    pub banned_addresses: Vec<IpAddr>,
    pub realms: Vec<RealmEntry>,
}

impl Default for LogonConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: aenet::DEFAULT_LOGON_PORT,
            max_connections: aenet::DEFAULT_MAX_CONNECTIONS,
            banned_addresses: Vec::new(),
            realms: Vec::new(),
        }
    }
}

impl LogonConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

#[derive(Clone, Deserialize)]
pub struct RealmEntry {
    pub id: u8,
    pub name: String,
    pub password: String,
}

impl fmt::Debug for RealmEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealmEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = LogonConfig::parse("").unwrap();
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 8180);
        assert_eq!(config.max_connections, 32);
        assert!(config.banned_addresses.is_empty());
        assert!(config.realms.is_empty());
    }

    #[test]
    fn test_full_file() {
        let config = LogonConfig::parse(
            r#"
            bind = "127.0.0.1"
            port = 9000
            banned_addresses = ["10.0.0.5", "::1"]

            [[realms]]
            id = 1
            name = "Alpha"
            password = "alpha-pass"

            [[realms]]
            id = 2
            name = "Beta"
            password = "beta-pass"
            "#,
        )
        .unwrap();

        assert_eq!(config.bind, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_connections, 32);
        assert_eq!(config.banned_addresses.len(), 2);
        assert_eq!(config.realms.len(), 2);
        assert_eq!(config.realms[1].name, "Beta");
        assert_eq!(config.realms[1].password, "beta-pass");
    }

    #[test]
    fn test_bad_address_is_rejected() {
        assert!(LogonConfig::parse(r#"banned_addresses = ["not-an-ip"]"#).is_err());
    }

    #[test]
    fn test_realm_debug_hides_password() {
        let entry = RealmEntry {
            id: 1,
            name: "Alpha".to_string(),
            password: "alpha-pass".to_string(),
        };
        assert!(!format!("{:?}", entry).contains("alpha-pass"));
    }

    #[test]
    fn test_sample_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("logon.toml");
        let config = LogonConfig::load(&path).unwrap();
        assert_eq!(config.port, 8180);
        assert_eq!(config.realms.len(), 1);
        assert_eq!(config.realms[0].id, 1);
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let err = LogonConfig::load(Path::new("/nonexistent/logon.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/logon.toml"));
    }
}
