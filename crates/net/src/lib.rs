mod backoff;
mod client;
mod connection;
mod context;
mod error;
mod logon;
mod packet;
mod queue;
mod server;

pub use backoff::Backoff;
pub use client::{ClientHandler, ClientInterface};
pub use connection::{Connection, ConnectionConfig, ConnectionOwner, ConnectionState};
pub use context::ExecutionContext;
pub use error::NetworkError;
pub use logon::{
    AuthRequest, AuthResponse, DEFAULT_LOGON_PORT, LogonMessage, LogonOpcode, PingResult,
    PingStatus,
};
pub use packet::{
    DEFAULT_MAX_BODY_SIZE, HEADER_SIZE, Opcode, OwnedPacket, Packet, PacketError, PacketHeader,
    Scalar,
};
pub use queue::ThreadsafeQueue;
pub use server::{
    DEFAULT_FIRST_CONNECTION_ID, DEFAULT_MAX_CONNECTIONS, ServerConfig, ServerHandler,
    ServerInterface,
};
