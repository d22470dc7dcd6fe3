use std::fmt;

use crate::packet::{Opcode, Packet, PacketError};

pub const DEFAULT_LOGON_PORT: u16 = 8180;

/// Opcodes of the logon ↔ world link.
///
/// `Cmsg*` travel from a world server to the logon server, `Smsg*` the other way.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogonOpcode {
    CmsgRealmRegisterRequest = 0x001,
    SmsgRealmRegisterResult = 0x002,
    CmsgAccSessionRequest = 0x003,
    SmsgAccSessionResult = 0x004,
    CmsgLogonPingStatus = 0x005,
    SmsgLogonPingResult = 0x006,
    CmsgFree01 = 0x007,
    SmsgFree02 = 0x008,
    CmsgAuthRequest = 0x009,
    SmsgAuthResponse = 0x00A,
    SmsgAccCharMappingRequest = 0x00B,
    CmsgAccCharMappingResult = 0x00C,
    CmsgAccCharMappingUpdate = 0x00D,
    SmsgSendAccountDisconnect = 0x00E,
    CmsgLoginConsoleRequest = 0x00F,
    SmsgLoginConsoleResult = 0x010,
    CmsgAccountDbModifyRequest = 0x011,
    SmsgAccountDbModifyResult = 0x012,
    SmsgRealmPopulationRequest = 0x013,
    CmsgRealmPopulationResult = 0x014,
    CmsgAccountRequest = 0x015,
    SmsgAccountResult = 0x016,
    CmsgAllAccountRequest = 0x017,
    SmsgAllAccountResult = 0x018,
}

impl LogonOpcode {
    pub const ALL: [LogonOpcode; 24] = [
        LogonOpcode::CmsgRealmRegisterRequest,
        LogonOpcode::SmsgRealmRegisterResult,
        LogonOpcode::CmsgAccSessionRequest,
        LogonOpcode::SmsgAccSessionResult,
        LogonOpcode::CmsgLogonPingStatus,
        LogonOpcode::SmsgLogonPingResult,
        LogonOpcode::CmsgFree01,
        LogonOpcode::SmsgFree02,
        LogonOpcode::CmsgAuthRequest,
        LogonOpcode::SmsgAuthResponse,
        LogonOpcode::SmsgAccCharMappingRequest,
        LogonOpcode::CmsgAccCharMappingResult,
        LogonOpcode::CmsgAccCharMappingUpdate,
        LogonOpcode::SmsgSendAccountDisconnect,
        LogonOpcode::CmsgLoginConsoleRequest,
        LogonOpcode::SmsgLoginConsoleResult,
        LogonOpcode::CmsgAccountDbModifyRequest,
        LogonOpcode::SmsgAccountDbModifyResult,
        LogonOpcode::SmsgRealmPopulationRequest,
        LogonOpcode::CmsgRealmPopulationResult,
        LogonOpcode::CmsgAccountRequest,
        LogonOpcode::SmsgAccountResult,
        LogonOpcode::CmsgAllAccountRequest,
        LogonOpcode::SmsgAllAccountResult,
    ];

    /// True for opcodes sent by world servers.
    pub fn is_client_message(self) -> bool {
        matches!(
            self,
            LogonOpcode::CmsgRealmRegisterRequest
                | LogonOpcode::CmsgAccSessionRequest
                | LogonOpcode::CmsgLogonPingStatus
                | LogonOpcode::CmsgFree01
                | LogonOpcode::CmsgAuthRequest
                | LogonOpcode::CmsgAccCharMappingResult
                | LogonOpcode::CmsgAccCharMappingUpdate
                | LogonOpcode::CmsgLoginConsoleRequest
                | LogonOpcode::CmsgAccountDbModifyRequest
                | LogonOpcode::CmsgRealmPopulationResult
                | LogonOpcode::CmsgAccountRequest
                | LogonOpcode::CmsgAllAccountRequest
        )
    }
}

impl Opcode for LogonOpcode {
    fn to_raw(self) -> u16 {
        self as u16
    }

    fn from_raw(raw: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.to_raw() == raw)
    }
}

/// A typed body for one logon opcode. Fields are written and read in
/// declaration order.
pub trait LogonMessage: Sized {
    const OPCODE: LogonOpcode;

    fn write(&self, packet: &mut Packet<LogonOpcode>);

    fn read(packet: &mut Packet<LogonOpcode>) -> Result<Self, PacketError>;

    fn to_packet(&self) -> Packet<LogonOpcode> {
        let mut packet = Packet::new(Self::OPCODE);
        self.write(&mut packet);
        packet
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub password: String,
    pub realm_id: u8,
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("password", &"<redacted>")
            .field("realm_id", &self.realm_id)
            .finish()
    }
}

impl LogonMessage for AuthRequest {
    const OPCODE: LogonOpcode = LogonOpcode::CmsgAuthRequest;

    fn write(&self, packet: &mut Packet<LogonOpcode>) {
        packet.push_str(&self.password).push(self.realm_id);
    }

    fn read(packet: &mut Packet<LogonOpcode>) -> Result<Self, PacketError> {
        let password = packet.pull_string()?;
        let realm_id = packet.pull::<u8>()?;
        Ok(Self { password, realm_id })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthResponse {
    pub result: bool,
}

impl LogonMessage for AuthResponse {
    const OPCODE: LogonOpcode = LogonOpcode::SmsgAuthResponse;

    fn write(&self, packet: &mut Packet<LogonOpcode>) {
        packet.push(self.result);
    }

    fn read(packet: &mut Packet<LogonOpcode>) -> Result<Self, PacketError> {
        Ok(Self {
            result: packet.pull()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingStatus {
    pub timestamp_ms: u64,
}

impl LogonMessage for PingStatus {
    const OPCODE: LogonOpcode = LogonOpcode::CmsgLogonPingStatus;

    fn write(&self, packet: &mut Packet<LogonOpcode>) {
        packet.push(self.timestamp_ms);
    }

    fn read(packet: &mut Packet<LogonOpcode>) -> Result<Self, PacketError> {
        Ok(Self {
            timestamp_ms: packet.pull()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingResult {
    pub timestamp_ms: u64,
}

impl LogonMessage for PingResult {
    const OPCODE: LogonOpcode = LogonOpcode::SmsgLogonPingResult;

    fn write(&self, packet: &mut Packet<LogonOpcode>) {
        packet.push(self.timestamp_ms);
    }

    fn read(packet: &mut Packet<LogonOpcode>) -> Result<Self, PacketError> {
        Ok(Self {
            timestamp_ms: packet.pull()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_values_are_stable() {
        assert_eq!(LogonOpcode::CmsgRealmRegisterRequest.to_raw(), 0x001);
        assert_eq!(LogonOpcode::CmsgAuthRequest.to_raw(), 0x009);
        assert_eq!(LogonOpcode::SmsgAuthResponse.to_raw(), 0x00A);
        assert_eq!(LogonOpcode::SmsgAllAccountResult.to_raw(), 0x018);

        for (index, op) in LogonOpcode::ALL.iter().enumerate() {
            assert_eq!(op.to_raw() as usize, index + 1);
            assert_eq!(LogonOpcode::from_raw(op.to_raw()), Some(*op));
        }
        assert_eq!(LogonOpcode::from_raw(0), None);
        assert_eq!(LogonOpcode::from_raw(0x019), None);
    }

    #[test]
    fn test_direction_follows_prefix() {
        assert!(LogonOpcode::CmsgAuthRequest.is_client_message());
        assert!(LogonOpcode::CmsgLogonPingStatus.is_client_message());
        assert!(!LogonOpcode::SmsgAuthResponse.is_client_message());
        assert!(!LogonOpcode::SmsgRealmPopulationRequest.is_client_message());

        let cmsg = LogonOpcode::ALL
            .iter()
            .filter(|op| op.is_client_message())
            .count();
        assert_eq!(cmsg, 12);
    }

    #[test]
    fn test_auth_request_layout() {
        let request = AuthRequest {
            password: "secret123".to_string(),
            realm_id: 1,
        };
        let mut packet = request.to_packet();

        assert_eq!(packet.id(), LogonOpcode::CmsgAuthRequest);
        assert_eq!(packet.body(), b"secret123\0\x01");
        assert_eq!(packet.header().size, 11);
        assert_eq!(AuthRequest::read(&mut packet).unwrap(), request);
        assert!(packet.is_empty());
    }

    #[test]
    fn test_auth_request_debug_hides_password() {
        let request = AuthRequest {
            password: "hunter2".to_string(),
            realm_id: 3,
        };
        let printed = format!("{:?}", request);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("realm_id: 3"));
    }

    #[test]
    fn test_truncated_auth_request() {
        let mut packet = Packet::new(LogonOpcode::CmsgAuthRequest);
        packet.push_str("secret123");

        assert!(matches!(
            AuthRequest::read(&mut packet),
            Err(PacketError::Underflow { needed: 1, available: 0 })
        ));
    }

    #[test]
    fn test_ping_echo() {
        let mut packet = PingStatus { timestamp_ms: 1_234_567 }.to_packet();
        let status = PingStatus::read(&mut packet).unwrap();
        let mut reply = PingResult {
            timestamp_ms: status.timestamp_ms,
        }
        .to_packet();

        assert_eq!(reply.id(), LogonOpcode::SmsgLogonPingResult);
        assert_eq!(PingResult::read(&mut reply).unwrap().timestamp_ms, 1_234_567);
    }

    #[test]
    fn test_auth_response_body() {
        let packet = AuthResponse { result: true }.to_packet();
        assert_eq!(packet.body(), &[1]);
    }
}
