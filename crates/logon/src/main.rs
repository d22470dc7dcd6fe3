mod config;
mod handler;
mod realms;

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use aenet::{LogonOpcode, ServerConfig, ServerInterface};
use config::LogonConfig;
use handler::LogonCommServer;
use realms::RealmRegistry;

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "logon-server")]
#[command(about = "Logon server accepting world server links")]
struct Args {
    #[arg(short, long, help = "Path to a TOML config file")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    bind: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(short, long)]
    max_connections: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => LogonConfig::load(path)?,
        None => LogonConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(max_connections) = args.max_connections {
        config.max_connections = max_connections;
    }

    let bind_addr: SocketAddr = (config.bind.as_str(), config.port)
        .to_socket_addrs()
        .with_context(|| format!("invalid bind address {}:{}", config.bind, config.port))?
        .next()
        .with_context(|| format!("no address for {}:{}", config.bind, config.port))?;

    let realms = RealmRegistry::from_entries(&config.realms);
    if realms.is_empty() {
        log::warn!("No realms configured, every world server will be rejected");
    }
    let handler = LogonCommServer::new(realms, config.banned_addresses.iter().copied().collect());

    let server_config = ServerConfig {
        max_connections: config.max_connections,
        ..Default::default()
    };
    let mut server: ServerInterface<LogonOpcode, LogonCommServer> =
        ServerInterface::new(bind_addr, handler, server_config);
    server.start().context("failed to start logon server")?;
    log::info!(
        "Logon server ready with {} realm(s), {} banned address(es)",
        server.handler().realms().len(),
        config.banned_addresses.len()
    );

    // Bounded wait so closed links are reaped even when nothing arrives.
    loop {
        server.wait_timeout(HOUSEKEEPING_INTERVAL);
        server.update(None, false);
    }
}
