mod config;
mod logon_client;

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use config::WorldConfig;
use logon_client::LogonCommClient;

const UPDATE_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "world-server")]
#[command(about = "World server side of the logon link")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    logon_host: String,

    #[arg(long, default_value_t = aenet::DEFAULT_LOGON_PORT)]
    logon_port: u16,

    #[arg(short, long, default_value_t = 1)]
    realm_id: u8,

    #[arg(long, env = "LOGON_REMOTE_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long, default_value_t = 30, help = "Seconds between logon pings")]
    ping_interval: u64,

    #[arg(long, help = "Give up after this many failed connection attempts")]
    max_connect_attempts: Option<u32>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = WorldConfig {
        logon_host: args.logon_host,
        logon_port: args.logon_port,
        realm_id: args.realm_id,
        remote_password: args.password,
        ping_interval: Duration::from_secs(args.ping_interval),
        max_connect_attempts: args.max_connect_attempts,
        ..Default::default()
    };
    log::debug!("{:?}", config);

    let mut logon = LogonCommClient::new(config);
    logon
        .try_to_connect()
        .context("failed to link with logon server")?;

    let mut last_latency = None;
    loop {
        logon.update().context("lost logon server link")?;

        let latency = logon.latency();
        if latency != last_latency {
            log::debug!("Logon latency {:?}", latency);
            last_latency = latency;
        }
        thread::sleep(UPDATE_INTERVAL);
    }
}
