//! Wire constants: handshake opcodes, file-server codes, login responses and the game-phase
//! client packet length table.

/// Opcodes accepted while a connection is still negotiating.
pub mod login {
    pub const WORLD_HANDSHAKE: u8 = 14;
    pub const JS5_OPEN: u8 = 15;
    pub const WORLD_CONNECT: u8 = 16;
    pub const WORLD_RECONNECT: u8 = 18;
    pub const CREATE_LOG_PROGRESS: u8 = 20;
    pub const CREATE_CHECK_NAME: u8 = 21;
    pub const CREATE_ACCOUNT: u8 = 22;
    pub const WORLD_LIST_FETCH: u8 = 23;

    /// Magic byte at the start of every decrypted RSA block.
    pub const RSA_MAGIC: u8 = 10;
}

/// File-server request types and reply codes.
pub mod js5 {
    pub const REQUEST: u8 = 0;
    pub const PRIORITY_REQUEST: u8 = 1;
    pub const LOGGED_IN: u8 = 2;
    pub const LOGGED_OUT: u8 = 3;
    pub const ENCRYPTION: u8 = 4;
    pub const INITIATING: u8 = 6;
    pub const TERMINATE: u8 = 7;

    pub const OUT_SUCCESS: u8 = 0;
    pub const OUT_RETRY: u8 = 5;
    pub const OUT_OUT_OF_DATE: u8 = 6;
    pub const OUT_FULL_1: u8 = 7;
    pub const OUT_FULL_2: u8 = 9;
}

/// World-list reply codes.
pub mod worldlist {
    pub const OUT_SUCCESS: u8 = 0;
    pub const OUT_REJECT: u8 = 1;
}

/// Single-byte login response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoginResponse {
    ExchangeKeys = 0,
    Delay = 1,
    Ok = 2,
    InvalidCredentials = 3,
    Banned = 4,
    AlreadyLoggedIn = 5,
    OutOfDate = 6,
    WorldFull = 7,
    LoginServerOffline = 8,
    LoginLimitExceeded = 9,
    BadSessionId = 10,
    WeakPassword = 11,
    MembersWorld = 12,
    CouldNotComplete = 13,
    UpdateInProgress = 14,
    Reconnected = 15,
    TooManyAttempts = 16,
    MembersArea = 17,
    Locked = 18,
    FullscreenMembers = 19,
    InvalidLoginServer = 20,
    Transferring = 21,
    MalformedPacket = 22,
    NoReplyFromLoginServer = 23,
    ErrorLoadingProfile = 24,
    UnexpectedResponse = 25,
    IpBlocked = 26,
    ServiceUnavailable = 27,
}

impl From<LoginResponse> for u8 {
    fn from(code: LoginResponse) -> Self {
        code as u8
    }
}

/// Payload length is carried in the next byte.
pub const VAR_BYTE: u8 = 255;

/// Payload length is carried in the next two bytes, big-endian.
pub const VAR_SHORT: u8 = 254;

/// Game-phase client packets with a fixed meaning to the engine.
pub mod client {
    pub const NO_TIMEOUT: u8 = 93;
    pub const WINDOW_STATUS: u8 = 29;
    pub const CLIENT_CHEAT: u8 = 44;
    pub const EVENT_MOUSE_MOVE: u8 = 60;
    pub const MOVE_GAMECLICK: u8 = 78;
}

/// Server packets sent by the engine itself.
pub mod server {
    /// Player-info bootstrap followed by the initial region rebuild.
    pub const REBUILD_FIRST_LOAD: u8 = 98;
    pub const LOGOUT: u8 = 58;
}

/// Declared payload length per client opcode.
#[rustfmt::skip]
pub const CLIENT_PROT_LENGTHS: [u8; 256] = [
    8, 4, 255, 10, 9, 255, 9, 2, 4, 9, 10, 1, 15, 10, 1, 8, // 0
    0, 7, 255, 16, 2, 10, 9, 254, 2, 0, 15, 8, 0, 6, 6, 14, // 16
    15, 4, 7, 16, 14, 255, 16, 255, 14, 12, 2, 2, 255, 6, 2, 1, // 32
    12, 8, 2, 12, 16, 8, 14, 8, 9, 3, 4, 16, 254, 9, 8, 15, // 48
    9, 6, 10, 3, 255, 11, 4, 15, 2, 15, 16, 16, 4, 1, 5, 16, // 64
    12, 8, 2, 7, 7, 8, 0, 14, 3, 14, 4, 15, 4, 0, 0, 8, // 80
    4, 3, 8, 2, 9, 3, 7, 4, 6, 4, 7, 8, 0, 10, 14, 254, // 96
    7, 255, 7, 6, 6, 8, 4, 6, 2, 8, 9, 7, 9, 7, 1, 0, // 112
    8, 4, 12, 14, 7, 12, 7, 12, 15, 2, 8, 2, 8, 1, 1, 3, // 128
    11, 9, 12, 2, 12, 12, 11, 11, 16, 6, 11, 3, 6, 10, 0, 0, // 144
    16, 10, 9, 255, 8, 255, 11, 0, 8, 255, 4, 4, 10, 16, 6, 6, // 160
    15, 12, 0, 255, 255, 11, 14, 16, 1, 2, 7, 4, 11, 8, 7, 1, // 176
    2, 8, 11, 8, 16, 16, 6, 8, 9, 14, 0, 2, 4, 8, 9, 16, // 192
    8, 8, 7, 8, 14, 16, 4, 4, 7, 2, 6, 10, 16, 4, 2, 8, // 208
    2, 8, 4, 11, 9, 11, 2, 16, 255, 12, 10, 4, 11, 11, 9, 255, // 224
    4, 12, 12, 9, 2, 7, 14, 6, 0, 4, 4, 0, 7, 11, 0, 9, // 240
];

/// How a packet's payload length is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketLength {
    Fixed(u8),
    VarByte,
    VarShort,
}

/// Opcode → length lookup used by both inbound framing and the tick read phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeTable {
    lengths: [u8; 256],
}

impl OpcodeTable {
    pub const fn new(lengths: [u8; 256]) -> Self {
        Self { lengths }
    }

    pub fn length(&self, opcode: u8) -> PacketLength {
        match self.lengths[usize::from(opcode)] {
            VAR_BYTE => PacketLength::VarByte,
            VAR_SHORT => PacketLength::VarShort,
            n => PacketLength::Fixed(n),
        }
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::new(CLIENT_PROT_LENGTHS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_opcodes_have_expected_lengths() {
        let table = OpcodeTable::default();
        assert_eq!(table.length(client::CLIENT_CHEAT), PacketLength::VarByte);
        assert_eq!(table.length(client::EVENT_MOUSE_MOVE), PacketLength::VarShort);
        assert_eq!(table.length(client::MOVE_GAMECLICK), PacketLength::Fixed(5));
        assert_eq!(table.length(client::NO_TIMEOUT), PacketLength::Fixed(0));
        assert_eq!(table.length(client::WINDOW_STATUS), PacketLength::Fixed(6));
    }

    #[test]
    fn response_codes() {
        assert_eq!(u8::from(LoginResponse::Ok), 2);
        assert_eq!(u8::from(LoginResponse::Reconnected), 15);
        assert_eq!(u8::from(LoginResponse::ServiceUnavailable), 27);
    }
}
