#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use aenet::{Connection, Opcode, Packet, ServerConfig, ServerHandler, ServerInterface};

pub const TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOp {
    Data = 1,
    Empty = 2,
    Sequence = 3,
}

impl Opcode for TestOp {
    fn to_raw(self) -> u16 {
        self as u16
    }

    fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(TestOp::Data),
            2 => Some(TestOp::Empty),
            3 => Some(TestOp::Sequence),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub client_id: u32,
    pub op: TestOp,
    pub body: Vec<u8>,
}

/// Accepts (or rejects) everyone and records what it sees.
#[derive(Default)]
pub struct Recorder {
    pub reject: AtomicBool,
    pub messages: Mutex<Vec<Received>>,
    pub disconnects: Mutex<Vec<u32>>,
}

impl Recorder {
    pub fn messages(&self) -> Vec<Received> {
        self.messages.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> Vec<u32> {
        self.disconnects.lock().unwrap().clone()
    }
}

impl ServerHandler<TestOp> for Recorder {
    fn on_client_connect(&self, _client: &Arc<Connection<TestOp>>) -> bool {
        !self.reject.load(Ordering::SeqCst)
    }

    fn on_client_disconnect(&self, client: &Arc<Connection<TestOp>>) {
        self.disconnects.lock().unwrap().push(client.id());
    }

    fn on_message(&self, client: &Arc<Connection<TestOp>>, packet: &mut Packet<TestOp>) {
        self.messages.lock().unwrap().push(Received {
            client_id: client.id(),
            op: packet.id(),
            body: packet.body().to_vec(),
        });
    }
}

pub fn start_server(config: ServerConfig) -> (ServerInterface<TestOp, Recorder>, SocketAddr) {
    let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let mut server = ServerInterface::new(bind, Recorder::default(), config);
    let addr = server.start().unwrap();
    (server, addr)
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Pumps `update` until the handler has seen `count` messages.
pub fn collect_messages(
    server: &ServerInterface<TestOp, Recorder>,
    count: usize,
) -> Vec<Received> {
    wait_until(TIMEOUT, || {
        server.update(None, false);
        server.handler().messages().len() >= count
    });
    server.handler().messages()
}

pub fn raw_connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    stream.set_nodelay(true).unwrap();
    stream
}

pub fn frame(op: u16, body: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(6 + body.len());
    bytes.extend_from_slice(&op.to_le_bytes());
    bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
    bytes.extend_from_slice(body);
    bytes
}

pub fn write_frame(stream: &mut TcpStream, op: u16, body: &[u8]) {
    stream.write_all(&frame(op, body)).unwrap();
}

/// Reads one frame off a raw socket.
pub fn read_frame(stream: &mut TcpStream) -> (u16, Vec<u8>) {
    let mut header = [0u8; 6];
    stream.read_exact(&mut header).unwrap();
    let op = u16::from_le_bytes([header[0], header[1]]);
    let size = u32::from_le_bytes([header[2], header[3], header[4], header[5]]);
    let mut body = vec![0u8; size as usize];
    stream.read_exact(&mut body).unwrap();
    (op, body)
}

/// True once the peer has closed the socket.
pub fn closed_by_peer(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return true,
            Ok(_) => continue,
            Err(err) => {
                return !matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                );
            }
        }
    }
}

/// Server-side connection whose peer is `stream`.
pub fn server_side_of(
    server: &ServerInterface<TestOp, Recorder>,
    stream: &TcpStream,
) -> Option<Arc<Connection<TestOp>>> {
    let local = stream.local_addr().unwrap();
    server
        .connections()
        .into_iter()
        .find(|c| c.peer_addr() == Some(local))
}

pub fn wait_for_server_side(
    server: &ServerInterface<TestOp, Recorder>,
    stream: &TcpStream,
) -> Arc<Connection<TestOp>> {
    let mut found = None;
    wait_until(TIMEOUT, || {
        found = server_side_of(server, stream);
        found.is_some()
    });
    found.expect("connection was never admitted")
}
