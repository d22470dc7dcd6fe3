use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use aenet::{
    AuthRequest, AuthResponse, Connection, LogonMessage, LogonOpcode, Packet, PingResult,
    PingStatus, ServerHandler,
};

use crate::realms::RealmRegistry;

/// Logon side of the logon ↔ world link.
pub struct LogonCommServer {
    realms: RealmRegistry,
    banned: HashSet<IpAddr>,
}

impl LogonCommServer {
    pub fn new(realms: RealmRegistry, banned: HashSet<IpAddr>) -> Self {
        Self { realms, banned }
    }

    pub fn realms(&self) -> &RealmRegistry {
        &self.realms
    }

    fn handle_auth(&self, client: &Arc<Connection<LogonOpcode>>, packet: &mut Packet<LogonOpcode>) {
        let request = match AuthRequest::read(packet) {
            Ok(request) => request,
            Err(err) => {
                log::warn!("[{}] Malformed auth request: {}", client.id(), err);
                client.disconnect();
                return;
            }
        };

        let result = self.realms.check_password(request.realm_id, &request.password);
        client.set_client_auth(result);

        match self.realms.get(request.realm_id) {
            Some(realm) if result => {
                log::info!("[{}] Realm {} ({}) authenticated", client.id(), realm.id, realm.name);
            }
            Some(realm) => {
                log::warn!(
                    "[{}] Realm {} ({}) sent a wrong password",
                    client.id(),
                    realm.id,
                    realm.name
                );
            }
            None => log::warn!("[{}] Unknown realm {}", client.id(), request.realm_id),
        }

        client.send_packet(AuthResponse { result }.to_packet());
    }

    fn handle_ping(&self, client: &Arc<Connection<LogonOpcode>>, packet: &mut Packet<LogonOpcode>) {
        match PingStatus::read(packet) {
            Ok(status) => client.send_packet(
                PingResult {
                    timestamp_ms: status.timestamp_ms,
                }
                .to_packet(),
            ),
            Err(err) => log::warn!("[{}] Malformed ping: {}", client.id(), err),
        }
    }
}

impl ServerHandler<LogonOpcode> for LogonCommServer {
    fn on_client_connect(&self, client: &Arc<Connection<LogonOpcode>>) -> bool {
        match client.peer_addr() {
            Some(addr) if self.banned.contains(&addr.ip()) => {
                log::warn!("Rejecting banned address {}", addr.ip());
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn on_client_disconnect(&self, client: &Arc<Connection<LogonOpcode>>) {
        log::info!("[{}] World server disconnected", client.id());
    }

    fn on_message(&self, client: &Arc<Connection<LogonOpcode>>, packet: &mut Packet<LogonOpcode>) {
        let opcode = packet.id();

        if opcode == LogonOpcode::CmsgAuthRequest {
            self.handle_auth(client, packet);
            return;
        }

        if !client.is_client_authorized() {
            log::warn!("[{}] Dropping {:?} from unauthorized client", client.id(), opcode);
            return;
        }

        match opcode {
            LogonOpcode::CmsgLogonPingStatus => self.handle_ping(client, packet),
            op if !op.is_client_message() => {
                log::warn!("[{}] Client sent server-only opcode {:?}", client.id(), op);
            }
            op => log::debug!("[{}] Unhandled opcode {:?}", client.id(), op),
        }
    }
}
