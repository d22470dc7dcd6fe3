use std::io;

use crate::packet::PacketError;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to resolve {host}: {source}")]
    Resolve { host: String, source: io::Error },
    #[error("no address found for {0}")]
    NoAddress(String),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("frame body of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: u32, max: u32 },
    #[error("protocol violation: {0}")]
    Packet(#[from] PacketError),
    #[error("connection is not established")]
    NotConnected,
    #[error("inbound queue has been dropped")]
    QueueClosed,
    #[error("execution context is already running")]
    AlreadyRunning,
}
