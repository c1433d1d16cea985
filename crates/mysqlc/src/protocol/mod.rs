//! MySQL wire protocol: packet framing and packet types.
//!
//! Every MySQL packet starts with a 4-byte header: a 3-byte little-endian
//! payload length followed by a 1-byte sequence number. The maximum payload
//! per packet is 2^24 - 1 bytes; larger payloads are split across packets,
//! with an empty trailing packet when the payload length is an exact
//! multiple of the maximum.

pub mod reader;
pub mod writer;

pub use reader::PacketReader;
pub use writer::{PacketWriter, build_command_packet};

/// Maximum payload size of a single packet (2^24 - 1 bytes).
pub const MAX_PACKET_SIZE: usize = 0xFF_FF_FF;

/// Client/server capability flags exchanged during the handshake.
#[allow(dead_code)]
pub mod capabilities {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_FOUND_ROWS: u32 = 1 << 1;
    pub const CLIENT_LONG_FLAG: u32 = 1 << 2;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_NO_SCHEMA: u32 = 1 << 4;
    pub const CLIENT_COMPRESS: u32 = 1 << 5;
    pub const CLIENT_LOCAL_FILES: u32 = 1 << 7;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_INTERACTIVE: u32 = 1 << 10;
    pub const CLIENT_SSL: u32 = 1 << 11;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_MULTI_STATEMENTS: u32 = 1 << 16;
    pub const CLIENT_MULTI_RESULTS: u32 = 1 << 17;
    pub const CLIENT_PS_MULTI_RESULTS: u32 = 1 << 18;
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;
    pub const CLIENT_CONNECT_ATTRS: u32 = 1 << 20;
    pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 1 << 21;
    pub const CLIENT_SESSION_TRACK: u32 = 1 << 23;
    pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 24;

    /// Capabilities this driver always requests.
    pub const BASE_CLIENT_FLAGS: u32 = CLIENT_LONG_PASSWORD
        | CLIENT_PROTOCOL_41
        | CLIENT_TRANSACTIONS
        | CLIENT_SECURE_CONNECTION
        | CLIENT_MULTI_RESULTS
        | CLIENT_PLUGIN_AUTH
        | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA;
}

/// Server status flags carried in OK and EOF packets.
#[allow(dead_code)]
pub mod server_status {
    pub const SERVER_STATUS_IN_TRANS: u16 = 0x0001;
    pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;
    pub const SERVER_MORE_RESULTS_EXISTS: u16 = 0x0008;
    pub const SERVER_STATUS_CURSOR_EXISTS: u16 = 0x0040;
    pub const SERVER_STATUS_LAST_ROW_SENT: u16 = 0x0080;
    pub const SERVER_STATUS_NO_BACKSLASH_ESCAPES: u16 = 0x0200;
    pub const SERVER_SESSION_STATE_CHANGED: u16 = 0x4000;
}

/// Character set ids for the well-known character sets.
///
/// Full collation tables are out of scope; the driver only needs the ids it
/// can send at connect time and name for diagnostics.
#[allow(dead_code)]
pub mod charset {
    pub const LATIN1_SWEDISH_CI: u8 = 8;
    pub const UTF8_GENERAL_CI: u8 = 33;
    pub const UTF8MB4_GENERAL_CI: u8 = 45;
    pub const BINARY: u8 = 63;
    pub const UTF8MB4_UNICODE_CI: u8 = 224;
    pub const UTF8MB4_0900_AI_CI: u8 = 255;

    /// Default charset for new connections (utf8mb4).
    pub const DEFAULT_CHARSET: u8 = UTF8MB4_0900_AI_CI;

    /// Character set name for a known id.
    pub fn name(id: u8) -> Option<&'static str> {
        match id {
            LATIN1_SWEDISH_CI => Some("latin1"),
            UTF8_GENERAL_CI => Some("utf8"),
            BINARY => Some("binary"),
            UTF8MB4_GENERAL_CI | UTF8MB4_UNICODE_CI | UTF8MB4_0900_AI_CI => Some("utf8mb4"),
            _ => None,
        }
    }
}

/// Command bytes sent as the first payload byte of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Close the connection
    Quit = 0x01,
    /// Switch the default database
    InitDb = 0x02,
    /// Text protocol query
    Query = 0x03,
    /// Ask the server to shut down
    Shutdown = 0x08,
    /// Server statistics string
    Statistics = 0x09,
    /// Kill a server thread
    ProcessKill = 0x0c,
    /// Liveness check
    Ping = 0x0e,
    /// Re-authenticate as a different user
    ChangeUser = 0x11,
    /// Toggle a server option
    SetOption = 0x1b,
}

/// A packet header: payload length plus sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Payload length (fits in 3 bytes)
    pub payload_length: u32,
    /// Sequence number, wrapping at 255
    pub sequence_id: u8,
}

impl PacketHeader {
    /// Header size on the wire.
    pub const SIZE: usize = 4;

    /// Decode a header from its 4 wire bytes.
    pub fn from_bytes(bytes: &[u8; 4]) -> Self {
        Self {
            payload_length: u32::from(bytes[0])
                | (u32::from(bytes[1]) << 8)
                | (u32::from(bytes[2]) << 16),
            sequence_id: bytes[3],
        }
    }

    /// Encode the header to its 4 wire bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_bytes(self) -> [u8; 4] {
        [
            (self.payload_length & 0xFF) as u8,
            ((self.payload_length >> 8) & 0xFF) as u8,
            ((self.payload_length >> 16) & 0xFF) as u8,
            self.sequence_id,
        ]
    }
}

/// Coarse classification of a response packet by its first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// OK packet (0x00)
    Ok,
    /// ERR packet (0xFF)
    Err,
    /// EOF packet (0xFE with payload shorter than 9 bytes)
    Eof,
    /// LOCAL INFILE request (0xFB)
    LocalInfile,
    /// Anything else: result-set column count, column definition, row data
    Data,
}

impl PacketType {
    /// Classify a packet from its first payload byte and payload length.
    pub fn classify(first: u8, payload_len: usize) -> Self {
        match first {
            0x00 => PacketType::Ok,
            0xFF => PacketType::Err,
            0xFE if payload_len < 9 => PacketType::Eof,
            0xFB => PacketType::LocalInfile,
            _ => PacketType::Data,
        }
    }
}

/// Parsed OK packet: the server's success response to a command.
#[derive(Debug, Clone, Default)]
pub struct OkPacket {
    /// Rows affected by the statement
    pub affected_rows: u64,
    /// Auto-increment id assigned by the last INSERT
    pub last_insert_id: u64,
    /// Server status flags
    pub status_flags: u16,
    /// Warning count
    pub warnings: u16,
    /// Human-readable info string, possibly empty
    pub info: String,
}

/// Parsed ERR packet.
#[derive(Debug, Clone)]
pub struct ErrPacket {
    /// Server error number
    pub error_code: u16,
    /// Five-character SQLSTATE, absent on pre-4.1 style errors
    pub sql_state: Option<String>,
    /// Error message text
    pub error_message: String,
}

/// Parsed EOF packet (pre-DEPRECATE_EOF servers).
#[derive(Debug, Clone, Copy)]
pub struct EofPacket {
    /// Warning count
    pub warnings: u16,
    /// Server status flags
    pub status_flags: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = PacketHeader {
            payload_length: 0x00AB_CDEF,
            sequence_id: 42,
        };
        assert_eq!(PacketHeader::from_bytes(&header.to_bytes()), header);
    }

    #[test]
    fn header_wire_layout_is_little_endian() {
        let header = PacketHeader {
            payload_length: 1,
            sequence_id: 0,
        };
        assert_eq!(header.to_bytes(), [0x01, 0x00, 0x00, 0x00]);

        let max = PacketHeader {
            payload_length: MAX_PACKET_SIZE as u32,
            sequence_id: 255,
        };
        assert_eq!(max.to_bytes(), [0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn classify_first_byte() {
        assert_eq!(PacketType::classify(0x00, 7), PacketType::Ok);
        assert_eq!(PacketType::classify(0xFF, 20), PacketType::Err);
        assert_eq!(PacketType::classify(0xFE, 5), PacketType::Eof);
        // A 0xFE byte opening a long payload is data (lenenc-int prefix).
        assert_eq!(PacketType::classify(0xFE, 100), PacketType::Data);
        assert_eq!(PacketType::classify(0xFB, 1), PacketType::LocalInfile);
        assert_eq!(PacketType::classify(0x05, 12), PacketType::Data);
    }

    #[test]
    fn charset_names() {
        assert_eq!(charset::name(charset::UTF8MB4_0900_AI_CI), Some("utf8mb4"));
        assert_eq!(charset::name(charset::BINARY), Some("binary"));
        assert_eq!(charset::name(200), None);
    }
}
