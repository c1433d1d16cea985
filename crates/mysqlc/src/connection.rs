//! The MySQL connection: transport, handshake, state machine and commands.
//!
//! A connection is one blocking request/response session over one socket.
//! The protocol allows no pipelining: `Ready` is the only state that accepts
//! a new command, `AwaitingResult` only accepts `store_result`/`use_result`,
//! and `Streaming` only row fetches. The state is checked explicitly before
//! any bytes are written, so misuse fails client-side with a
//! commands-out-of-sync error.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use mysqlc_core::{DatabaseErrorKind, Error, Result};

use crate::auth;
use crate::bootstrap::Library;
use crate::config::MySqlConfig;
use crate::convert::{ConvertFn, ConverterTable};
use crate::errmap::{client_errors, map_server_error};
use crate::escape;
use crate::field::Field;
use crate::protocol::writer::frame_payload;
use crate::protocol::{
    Command, MAX_PACKET_SIZE, PacketHeader, PacketReader, PacketType, PacketWriter, capabilities,
    charset, server_status,
};
use crate::result::{BufferedResult, RawRow, StreamingResult, parse_text_row};
use crate::stream::Stream;
use crate::tls;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP/socket established, waiting for the server greeting
    Connecting,
    /// Handshake response sent, authentication in progress
    Authenticating,
    /// Idle; the only state that accepts a new command
    Ready,
    /// A query produced a result set that has not been stored or used yet
    AwaitingResult,
    /// A streaming result owns the wire until it is drained
    Streaming,
    /// Closed; every operation except `close` fails immediately
    Closed,
}

/// Parsed server greeting (handshake v10).
#[derive(Debug, Clone)]
pub struct ServerHandshake {
    /// Handshake protocol version, always 10
    pub protocol_version: u8,
    /// Server version string, e.g. "8.0.36"
    pub server_version: String,
    /// Server-side thread (connection) id
    pub thread_id: u32,
    /// Auth plugin seed (scramble), 20 bytes on modern servers
    pub seed: Vec<u8>,
    /// Server capability flags
    pub capabilities: u32,
    /// Server default charset id
    pub charset: u8,
    /// Server status flags
    pub status_flags: u16,
    /// Authentication plugin requested by the server
    pub auth_plugin: String,
}

/// Argument to [`Connection::set_server_option`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOption {
    /// Allow multiple statements per query string
    MultiStatementsOn,
    /// Forbid multiple statements per query string
    MultiStatementsOff,
}

impl ServerOption {
    const fn code(self) -> u16 {
        match self {
            ServerOption::MultiStatementsOn => 0,
            ServerOption::MultiStatementsOff => 1,
        }
    }
}

/// A connection to a MySQL server.
pub struct Connection {
    stream: Stream,
    state: ConnectionState,
    config: MySqlConfig,
    server: Option<ServerHandshake>,
    client_caps: u32,
    thread_id: u32,
    status_flags: u16,
    affected_rows: u64,
    last_insert_id: u64,
    warnings: u16,
    info: String,
    /// Column count of a result set announced but not yet consumed
    pending_fields: Option<usize>,
    last_field_count: usize,
    sequence_id: u8,
    converters: ConverterTable,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Connect and authenticate.
    ///
    /// Requires an initialized [`Library`] handle. On success the connection
    /// is `Ready`; the configured init-command, if any, has already run.
    pub fn connect(library: &Library, config: MySqlConfig) -> Result<Self> {
        let _ = library;
        Self::establish(config)
    }

    fn establish(config: MySqlConfig) -> Result<Self> {
        if config.compression {
            return Err(Error::not_supported(
                "the compressed client/server protocol is not implemented",
            ));
        }

        let stream = open_transport(&config)?;
        let mut conn = Self {
            stream,
            state: ConnectionState::Connecting,
            config,
            server: None,
            client_caps: 0,
            thread_id: 0,
            status_flags: 0,
            affected_rows: 0,
            last_insert_id: 0,
            warnings: 0,
            info: String::new(),
            pending_fields: None,
            last_field_count: 0,
            sequence_id: 0,
            converters: ConverterTable::default(),
        };

        let handshake = conn.read_handshake()?;
        let use_ssl = tls::decide_ssl(conn.config.ssl_mode, handshake.capabilities)?;

        let mut client_caps = conn.config.capability_flags() & handshake.capabilities;
        if !use_ssl {
            client_caps &= !capabilities::CLIENT_SSL;
        }
        conn.client_caps = client_caps;
        conn.thread_id = handshake.thread_id;
        conn.status_flags = handshake.status_flags;

        #[cfg(feature = "tls")]
        if use_ssl {
            let payload = tls::ssl_request_payload(
                client_caps,
                conn.config.max_packet_size,
                conn.config.charset,
            );
            conn.write_packet(&payload)?;
            let tcp = conn.stream.take_tcp().ok_or_else(|| {
                Error::interface("the SSL upgrade requires a TCP transport")
            })?;
            conn.stream = tls::upgrade(tcp, &conn.config)?;
        }
        #[cfg(not(feature = "tls"))]
        let _ = use_ssl;

        conn.state = ConnectionState::Authenticating;
        let plugin = handshake.auth_plugin.clone();
        let seed = handshake.seed.clone();
        conn.server = Some(handshake);

        conn.send_handshake_response(&plugin, &seed)?;
        conn.authenticate(plugin, seed)?;
        conn.state = ConnectionState::Ready;

        tracing::debug!(
            server = conn.server.as_ref().map(|s| s.server_version.as_str()),
            thread_id = conn.thread_id,
            "connection established"
        );

        if let Some(init) = conn.config.init_command.clone() {
            conn.run_init_command(&init)?;
        }

        Ok(conn)
    }

    // ------------------------------------------------------------------
    // Handshake and authentication
    // ------------------------------------------------------------------

    fn read_handshake(&mut self) -> Result<ServerHandshake> {
        let payload = self.read_packet()?;
        let mut r = PacketReader::new(&payload);

        let protocol_version = r
            .read_u8()
            .ok_or_else(|| protocol_err("missing protocol version in greeting"))?;
        if protocol_version == 0xFF {
            // The server may reject the connection before any handshake.
            let err = PacketReader::new(&payload)
                .parse_err_packet()
                .ok_or_else(|| protocol_err("malformed pre-handshake error packet"))?;
            return Err(map_server_error(&err));
        }
        if protocol_version != 10 {
            return Err(protocol_err(format!(
                "unsupported handshake protocol version {protocol_version}"
            )));
        }

        let server_version = r
            .read_null_string()
            .ok_or_else(|| protocol_err("missing server version in greeting"))?;
        let thread_id = r
            .read_u32_le()
            .ok_or_else(|| protocol_err("missing thread id in greeting"))?;
        let mut seed = r
            .read_bytes(8)
            .ok_or_else(|| protocol_err("missing auth seed in greeting"))?
            .to_vec();
        r.skip(1); // filler

        let caps_lower = r
            .read_u16_le()
            .ok_or_else(|| protocol_err("missing capability flags in greeting"))?;
        let server_charset = r.read_u8().unwrap_or(charset::DEFAULT_CHARSET);
        let status_flags = r.read_u16_le().unwrap_or(0);
        let caps_upper = r.read_u16_le().unwrap_or(0);
        let server_caps = u32::from(caps_lower) | (u32::from(caps_upper) << 16);

        let seed_len = if server_caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            usize::from(r.read_u8().unwrap_or(0))
        } else {
            0
        };
        r.skip(10); // reserved

        if server_caps & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            let part2_len = if seed_len > 8 { seed_len - 8 } else { 13 };
            if let Some(part2) = r.read_bytes(part2_len) {
                let part2 = if part2.last() == Some(&0) {
                    &part2[..part2.len() - 1]
                } else {
                    part2
                };
                seed.extend_from_slice(part2);
            }
        }

        let auth_plugin = if server_caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            r.read_null_string()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| auth::plugins::MYSQL_NATIVE_PASSWORD.to_string())
        } else {
            auth::plugins::MYSQL_NATIVE_PASSWORD.to_string()
        };

        Ok(ServerHandshake {
            protocol_version,
            server_version,
            thread_id,
            seed,
            capabilities: server_caps,
            charset: server_charset,
            status_flags,
            auth_plugin,
        })
    }

    fn send_handshake_response(&mut self, plugin: &str, seed: &[u8]) -> Result<()> {
        let auth_response = self.initial_auth_response(plugin, seed);

        let mut w = PacketWriter::new();
        w.write_u32_le(self.client_caps);
        w.write_u32_le(self.config.max_packet_size);
        w.write_u8(self.config.charset);
        w.write_zeros(23);
        w.write_null_string(&self.config.user);

        if self.client_caps & capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
            w.write_lenenc_bytes(&auth_response);
        } else if self.client_caps & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            // Digests are at most 32 bytes.
            #[allow(clippy::cast_possible_truncation)]
            w.write_u8(auth_response.len() as u8);
            w.write_bytes(&auth_response);
        } else {
            w.write_bytes(&auth_response);
            w.write_u8(0);
        }

        if self.client_caps & capabilities::CLIENT_CONNECT_WITH_DB != 0 {
            match &self.config.database {
                Some(db) => w.write_null_string(db),
                None => w.write_u8(0),
            }
        }

        if self.client_caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            w.write_null_string(plugin);
        }

        if self.client_caps & capabilities::CLIENT_CONNECT_ATTRS != 0
            && !self.config.attributes.is_empty()
        {
            let mut attrs = PacketWriter::new();
            for (key, value) in &self.config.attributes {
                attrs.write_lenenc_string(key);
                attrs.write_lenenc_string(value);
            }
            w.write_lenenc_bytes(attrs.as_bytes());
        }

        self.write_packet(w.as_bytes())
    }

    /// The auth data sent inside the handshake response, per plugin.
    fn initial_auth_response(&self, plugin: &str, seed: &[u8]) -> Vec<u8> {
        let password = self.config.password.as_deref().unwrap_or("");
        match plugin {
            auth::plugins::CACHING_SHA2_PASSWORD => auth::caching_sha2_password(password, seed),
            auth::plugins::MYSQL_CLEAR_PASSWORD => {
                let mut out = password.as_bytes().to_vec();
                out.push(0);
                out
            }
            auth::plugins::SHA256_PASSWORD => {
                if password.is_empty() {
                    Vec::new()
                } else if self.stream.is_secure_channel() {
                    let mut out = password.as_bytes().to_vec();
                    out.push(0);
                    out
                } else {
                    // Ask for the server's RSA public key.
                    vec![auth::caching_sha2::REQUEST_PUBLIC_KEY]
                }
            }
            // mysql_native_password, and the fallback for unknown plugins
            _ => auth::mysql_native_password(password, seed),
        }
    }

    /// Drive the authentication exchange to an OK or an error, handling
    /// auth-switch requests and the SHA256 sub-protocols.
    fn authenticate(&mut self, mut plugin: String, mut seed: Vec<u8>) -> Result<()> {
        let password = self.config.password.clone().unwrap_or_default();
        let mut expecting_rsa_key = plugin == auth::plugins::SHA256_PASSWORD
            && !password.is_empty()
            && !self.stream.is_secure_channel();

        loop {
            let payload = self.read_packet()?;
            if payload.is_empty() {
                return Err(protocol_err("empty packet during authentication"));
            }

            // In the authentication phase 0xFE always marks an auth-switch
            // request regardless of payload length, so the generic packet
            // classification does not apply.
            match payload[0] {
                0x00 => {
                    self.apply_ok_payload(&payload)?;
                    return Ok(());
                }
                0xFF => {
                    let err = PacketReader::new(&payload)
                        .parse_err_packet()
                        .ok_or_else(|| protocol_err("malformed authentication error packet"))?;
                    return Err(map_server_error(&err));
                }
                0xFE => {
                    // Auth switch request: 0xFE, plugin name, fresh seed.
                    if payload.len() == 1 {
                        return Err(Error::not_supported(
                            "server requested the legacy pre-4.1 authentication",
                        ));
                    }
                    let mut r = PacketReader::new(&payload[1..]);
                    plugin = r
                        .read_null_string()
                        .ok_or_else(|| protocol_err("malformed auth switch request"))?;
                    seed = r.read_rest().to_vec();
                    if seed.last() == Some(&0) {
                        seed.pop();
                    }
                    tracing::debug!(plugin = %plugin, "switching authentication plugin");
                    expecting_rsa_key = plugin == auth::plugins::SHA256_PASSWORD
                        && !password.is_empty()
                        && !self.stream.is_secure_channel();
                    let response = self.initial_auth_response(&plugin, &seed);
                    self.write_packet(&response)?;
                }
                _ => {
                    // Extra auth data; the SHA256 plugins wrap it in 0x01.
                    let inner = if payload[0] == 0x01 {
                        &payload[1..]
                    } else {
                        &payload[..]
                    };

                    if expecting_rsa_key {
                        let use_oaep = plugin == auth::plugins::CACHING_SHA2_PASSWORD;
                        let encrypted =
                            auth::rsa_encrypted_password(&password, &seed, inner, use_oaep)?;
                        self.write_packet(&encrypted)?;
                        expecting_rsa_key = false;
                        continue;
                    }

                    match inner.first() {
                        Some(&auth::caching_sha2::FAST_AUTH_SUCCESS) => {
                            // An OK packet follows.
                        }
                        Some(&auth::caching_sha2::PERFORM_FULL_AUTH) => {
                            if self.stream.is_secure_channel() {
                                let mut cleartext = password.as_bytes().to_vec();
                                cleartext.push(0);
                                self.write_packet(&cleartext)?;
                            } else {
                                self.write_packet(&[auth::caching_sha2::REQUEST_PUBLIC_KEY])?;
                                expecting_rsa_key = true;
                            }
                        }
                        _ => {
                            return Err(protocol_err(format!(
                                "unexpected authentication packet (first byte 0x{:02X})",
                                payload[0]
                            )));
                        }
                    }
                }
            }
        }
    }

    fn run_init_command(&mut self, sql: &str) -> Result<()> {
        self.query(sql)?;
        loop {
            if self.pending_fields.is_some() {
                let result = self.store_result()?;
                drop(result);
            }
            if !self.next_result()? {
                return Ok(());
            }
        }
    }

    // ------------------------------------------------------------------
    // Packet I/O
    // ------------------------------------------------------------------

    fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        loop {
            let header = self.read_packet_header()?;
            let len = header.payload_length as usize;
            let start = payload.len();
            payload.resize(start + len, 0);
            if len > 0 {
                self.stream
                    .read_exact(&mut payload[start..])
                    .map_err(read_error)?;
            }
            if len < MAX_PACKET_SIZE {
                return Ok(payload);
            }
            // Full-sized packet: the payload continues in the next one.
        }
    }

    fn read_packet_header(&mut self) -> Result<PacketHeader> {
        let mut buf = [0u8; 4];
        self.stream.read_exact(&mut buf).map_err(read_error)?;
        let header = PacketHeader::from_bytes(&buf);
        if header.sequence_id != self.sequence_id {
            return Err(protocol_err(format!(
                "packets out of order (expected sequence {}, got {})",
                self.sequence_id, header.sequence_id
            )));
        }
        self.sequence_id = header.sequence_id.wrapping_add(1);
        Ok(header)
    }

    fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        let framed = frame_payload(payload, self.sequence_id);
        #[allow(clippy::cast_possible_truncation)]
        let npackets = (payload.len() / MAX_PACKET_SIZE + 1) as u8;
        self.sequence_id = self.sequence_id.wrapping_add(npackets);

        self.stream.write_all(&framed).map_err(write_error)?;
        self.stream.flush().map_err(write_error)
    }

    /// Start a fresh command cycle: reset the sequence counter and send the
    /// command byte plus argument.
    fn send_command(&mut self, command: Command, argument: &[u8]) -> Result<()> {
        self.sequence_id = 0;
        let mut w = PacketWriter::with_capacity(1 + argument.len());
        w.write_u8(command as u8);
        w.write_bytes(argument);
        self.write_packet(w.as_bytes())
    }

    fn ensure_ready(&self, operation: &str) -> Result<()> {
        match self.state {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Closed => Err(Error::interface("connection is closed")),
            ConnectionState::AwaitingResult | ConnectionState::Streaming => Err(Error::server(
                DatabaseErrorKind::Programming,
                client_errors::CR_COMMANDS_OUT_OF_SYNC,
                None,
                format!("commands out of sync: {operation} while a result set is pending"),
            )),
            ConnectionState::Connecting | ConnectionState::Authenticating => {
                Err(Error::interface("connection is not ready"))
            }
        }
    }

    fn apply_ok_payload(&mut self, payload: &[u8]) -> Result<()> {
        let ok = PacketReader::new(payload)
            .parse_ok_packet()
            .ok_or_else(|| protocol_err("malformed OK packet"))?;
        self.affected_rows = ok.affected_rows;
        self.last_insert_id = ok.last_insert_id;
        self.status_flags = ok.status_flags;
        self.warnings = ok.warnings;
        self.info = ok.info;
        Ok(())
    }

    /// Read one response packet and require it to be OK (or EOF, which some
    /// commands on older servers answer with).
    fn expect_ok(&mut self) -> Result<()> {
        let payload = self.read_packet()?;
        if payload.is_empty() {
            return Err(protocol_err("empty response packet"));
        }
        match PacketType::classify(payload[0], payload.len()) {
            PacketType::Ok => self.apply_ok_payload(&payload),
            PacketType::Eof => Ok(()),
            PacketType::Err => {
                let err = PacketReader::new(&payload)
                    .parse_err_packet()
                    .ok_or_else(|| protocol_err("malformed error packet"))?;
                Err(map_server_error(&err))
            }
            _ => Err(protocol_err(format!(
                "unexpected response packet (first byte 0x{:02X})",
                payload[0]
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Queries and result sets
    // ------------------------------------------------------------------

    /// Execute a statement.
    ///
    /// If the statement produced a result set, the connection moves to
    /// `AwaitingResult` and the rows must be consumed with
    /// [`store_result`](Self::store_result) or
    /// [`use_result`](Self::use_result) before the next command. Statements
    /// without a result set leave the connection `Ready`; affected rows,
    /// last insert id, warnings and the info string are available from the
    /// accessors.
    pub fn query(&mut self, sql: &str) -> Result<()> {
        self.ensure_ready("query")?;
        self.send_command(Command::Query, sql.as_bytes())?;
        self.read_query_response()
    }

    fn read_query_response(&mut self) -> Result<()> {
        let payload = self.read_packet()?;
        if payload.is_empty() {
            return Err(protocol_err("empty query response"));
        }
        match PacketType::classify(payload[0], payload.len()) {
            PacketType::Ok => {
                self.pending_fields = None;
                self.last_field_count = 0;
                self.apply_ok_payload(&payload)
            }
            PacketType::Err => {
                let err = PacketReader::new(&payload)
                    .parse_err_packet()
                    .ok_or_else(|| protocol_err("malformed error packet"))?;
                Err(map_server_error(&err))
            }
            PacketType::LocalInfile => self.refuse_local_infile(&payload),
            PacketType::Eof => Err(protocol_err("unexpected EOF in query response")),
            PacketType::Data => {
                let count = PacketReader::new(&payload)
                    .read_lenenc_int()
                    .ok_or_else(|| protocol_err("malformed column count packet"))?;
                if count == 0 {
                    return Err(protocol_err("column count of zero in result header"));
                }
                let count = usize::try_from(count)
                    .map_err(|_| protocol_err("column count out of range"))?;
                self.pending_fields = Some(count);
                self.last_field_count = count;
                self.state = ConnectionState::AwaitingResult;
                Ok(())
            }
        }
    }

    /// This client never transfers local files; answer the request with an
    /// empty data packet and surface the outcome as an error.
    fn refuse_local_infile(&mut self, payload: &[u8]) -> Result<()> {
        let filename = String::from_utf8_lossy(&payload[1..]).into_owned();
        tracing::debug!(filename = %filename, "refusing LOCAL INFILE request");
        self.write_packet(&[])?;
        let reply = self.read_packet()?;
        if reply.first() == Some(&0xFF) {
            let err = PacketReader::new(&reply)
                .parse_err_packet()
                .ok_or_else(|| protocol_err("malformed error packet"))?;
            return Err(map_server_error(&err));
        }
        Err(Error::not_supported(
            "LOCAL INFILE transfers are not supported by this client",
        ))
    }

    fn take_pending(&mut self, operation: &str) -> Result<usize> {
        match self.state {
            ConnectionState::AwaitingResult => self
                .pending_fields
                .take()
                .ok_or_else(|| Error::interface("result state lost")),
            ConnectionState::Closed => Err(Error::interface("connection is closed")),
            _ => Err(Error::programming(format!(
                "{operation} called with no result set pending"
            ))),
        }
    }

    fn read_field_packets(&mut self, count: usize) -> Result<Vec<Field>> {
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            let payload = self.read_packet()?;
            if payload.first() == Some(&0xFF) {
                let err = PacketReader::new(&payload)
                    .parse_err_packet()
                    .ok_or_else(|| protocol_err("malformed error packet"))?;
                return Err(map_server_error(&err));
            }
            fields.push(
                Field::parse(&payload)
                    .ok_or_else(|| protocol_err("malformed column definition packet"))?,
            );
        }
        if self.client_caps & capabilities::CLIENT_DEPRECATE_EOF == 0 {
            let payload = self.read_packet()?;
            let eof = PacketReader::new(&payload)
                .parse_eof_packet()
                .filter(|_| payload.first() == Some(&0xFE) && payload.len() < 9)
                .ok_or_else(|| protocol_err("expected EOF after column definitions"))?;
            self.status_flags = eof.status_flags;
            self.warnings = eof.warnings;
        }
        Ok(fields)
    }

    /// Is a row terminator rather than row data? In row context only 0xFF
    /// (error) and a short-enough 0xFE packet are special; a row payload may
    /// legitimately start with 0x00 (empty first cell).
    fn is_row_terminator(payload: &[u8]) -> bool {
        payload.first() == Some(&0xFE) && payload.len() < MAX_PACKET_SIZE
    }

    fn apply_row_terminator(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() < 9 {
            let eof = PacketReader::new(payload)
                .parse_eof_packet()
                .ok_or_else(|| protocol_err("malformed EOF packet"))?;
            self.status_flags = eof.status_flags;
            self.warnings = eof.warnings;
            Ok(())
        } else {
            // DEPRECATE_EOF servers terminate with an OK packet headed 0xFE.
            self.apply_ok_payload(payload)
        }
    }

    /// Buffer the pending result set entirely in memory.
    ///
    /// Records the per-column maximum observed length and reports the total
    /// row count immediately. The returned result is detached from the
    /// connection.
    pub fn store_result(&mut self) -> Result<BufferedResult> {
        let count = self.take_pending("store_result")?;
        let mut fields = self.read_field_packets(count)?;

        let mut rows: Vec<RawRow> = Vec::new();
        loop {
            let payload = self.read_packet()?;
            if payload.is_empty() {
                return Err(protocol_err("empty packet in result set"));
            }
            if payload[0] == 0xFF {
                let err = PacketReader::new(&payload)
                    .parse_err_packet()
                    .ok_or_else(|| protocol_err("malformed error packet"))?;
                self.state = ConnectionState::Ready;
                return Err(map_server_error(&err));
            }
            if Self::is_row_terminator(&payload) {
                self.apply_row_terminator(&payload)?;
                break;
            }
            let row = parse_text_row(&payload, count)
                .ok_or_else(|| protocol_err("malformed row packet"))?;
            for (field, cell) in fields.iter_mut().zip(row.iter()) {
                if let Some(bytes) = cell {
                    #[allow(clippy::cast_possible_truncation)]
                    let len = bytes.len() as u32;
                    if len > field.max_length {
                        field.max_length = len;
                    }
                }
            }
            rows.push(row);
        }

        self.state = ConnectionState::Ready;
        self.affected_rows = rows.len() as u64;

        let converters: Vec<ConvertFn> = fields.iter().map(|f| self.converters.resolve(f)).collect();
        Ok(BufferedResult::new(fields, converters, rows))
    }

    /// Stream the pending result set row by row.
    ///
    /// The returned result borrows the connection until dropped; no other
    /// command can be issued while it is live, and dropping it drains any
    /// unread rows.
    pub fn use_result(&mut self) -> Result<StreamingResult<'_>> {
        let count = self.take_pending("use_result")?;
        let fields = self.read_field_packets(count)?;
        let converters: Vec<ConvertFn> = fields.iter().map(|f| self.converters.resolve(f)).collect();
        self.state = ConnectionState::Streaming;
        Ok(StreamingResult::new(self, fields, converters))
    }

    /// Read one streaming row off the wire. `None` means the result is
    /// exhausted and the connection is `Ready` again.
    pub(crate) fn stream_fetch_raw(&mut self, nfields: usize) -> Result<Option<RawRow>> {
        match self.state {
            ConnectionState::Streaming => {}
            ConnectionState::Closed => return Err(Error::interface("connection is closed")),
            _ => return Err(Error::programming("no streaming result is active")),
        }
        let payload = self.read_packet()?;
        if payload.is_empty() {
            return Err(protocol_err("empty packet in result set"));
        }
        if payload[0] == 0xFF {
            let err = PacketReader::new(&payload)
                .parse_err_packet()
                .ok_or_else(|| protocol_err("malformed error packet"))?;
            self.state = ConnectionState::Ready;
            return Err(map_server_error(&err));
        }
        if Self::is_row_terminator(&payload) {
            self.apply_row_terminator(&payload)?;
            self.state = ConnectionState::Ready;
            return Ok(None);
        }
        let row = parse_text_row(&payload, nfields)
            .ok_or_else(|| protocol_err("malformed row packet"))?;
        Ok(Some(row))
    }

    /// Advance to the next result of a multi-statement or multi-result
    /// response. Returns false when no further result is available.
    pub fn next_result(&mut self) -> Result<bool> {
        self.ensure_ready("next_result")?;
        if self.status_flags & server_status::SERVER_MORE_RESULTS_EXISTS == 0 {
            return Ok(false);
        }
        self.read_query_response()?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Simple commands
    // ------------------------------------------------------------------

    /// Check that the server is alive.
    ///
    /// With the reconnect policy enabled, a failed ping tears the session
    /// down, reopens it and retries once. The reconnect implicitly rolls
    /// back any open transaction and resets all session state.
    pub fn ping(&mut self) -> Result<()> {
        self.ensure_ready("ping")?;
        match self.ping_once() {
            Err(e) if self.config.reconnect && e.is_fatal() => {
                tracing::warn!(error = %e, "ping failed, reconnecting");
                *self = Self::establish(self.config.clone())?;
                self.ping_once()
            }
            other => other,
        }
    }

    fn ping_once(&mut self) -> Result<()> {
        self.send_command(Command::Ping, &[])?;
        self.expect_ok()
    }

    /// Change the reconnect-on-ping policy.
    pub fn set_reconnect(&mut self, enabled: bool) {
        self.config.reconnect = enabled;
    }

    /// Close the connection. Closing an already-closed connection is an
    /// error; everything else on a closed connection fails immediately
    /// without network I/O.
    pub fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(Error::programming("closing a closed connection"));
        }
        let _ = self.send_command(Command::Quit, &[]);
        self.stream.shutdown();
        self.state = ConnectionState::Closed;
        Ok(())
    }

    /// Make `db` the default database.
    pub fn select_db(&mut self, db: &str) -> Result<()> {
        self.ensure_ready("select_db")?;
        self.send_command(Command::InitDb, db.as_bytes())?;
        self.expect_ok()?;
        self.config.database = Some(db.to_string());
        Ok(())
    }

    /// Re-authenticate as a different user, resetting all session state.
    pub fn change_user(
        &mut self,
        user: &str,
        password: Option<&str>,
        database: Option<&str>,
    ) -> Result<()> {
        self.ensure_ready("change_user")?;
        let (plugin, seed) = {
            let server = self
                .server
                .as_ref()
                .ok_or_else(|| Error::interface("no server handshake recorded"))?;
            (server.auth_plugin.clone(), server.seed.clone())
        };

        // The new credentials must be in place before the auth exchange:
        // a possible auth-switch reply is answered from the config.
        let previous = (
            self.config.user.clone(),
            self.config.password.clone(),
            self.config.database.clone(),
        );
        self.config.user = user.to_string();
        self.config.password = password.map(str::to_string);
        self.config.database = database.map(str::to_string);

        let auth_response = self.initial_auth_response(&plugin, &seed);
        let mut w = PacketWriter::new();
        w.write_null_string(user);
        if self.client_caps & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            #[allow(clippy::cast_possible_truncation)]
            w.write_u8(auth_response.len() as u8);
            w.write_bytes(&auth_response);
        } else {
            w.write_bytes(&auth_response);
            w.write_u8(0);
        }
        w.write_null_string(database.unwrap_or(""));
        w.write_u16_le(u16::from(self.config.charset));
        if self.client_caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            w.write_null_string(&plugin);
        }

        let payload = w.into_bytes();
        let result = (|| {
            self.send_command(Command::ChangeUser, &payload)?;
            self.authenticate(plugin, seed)
        })();

        if result.is_err() {
            (self.config.user, self.config.password, self.config.database) = previous;
        }
        result
    }

    /// Kill the server thread with the given id.
    pub fn kill(&mut self, thread_id: u32) -> Result<()> {
        self.ensure_ready("kill")?;
        self.send_command(Command::ProcessKill, &thread_id.to_le_bytes())?;
        self.expect_ok()
    }

    /// Ask the server to shut down. Requires the SHUTDOWN privilege.
    pub fn shutdown(&mut self) -> Result<()> {
        self.ensure_ready("shutdown")?;
        // One argument byte: SHUTDOWN_DEFAULT.
        self.send_command(Command::Shutdown, &[0x00])?;
        self.expect_ok()
    }

    /// The server statistics string (uptime, thread count, ...).
    pub fn stat(&mut self) -> Result<String> {
        self.ensure_ready("stat")?;
        self.send_command(Command::Statistics, &[])?;
        let payload = self.read_packet()?;
        if payload.first() == Some(&0xFF) {
            let err = PacketReader::new(&payload)
                .parse_err_packet()
                .ok_or_else(|| protocol_err("malformed error packet"))?;
            return Err(map_server_error(&err));
        }
        Ok(String::from_utf8_lossy(&payload).into_owned())
    }

    /// Toggle a server option for this session.
    pub fn set_server_option(&mut self, option: ServerOption) -> Result<()> {
        self.ensure_ready("set_server_option")?;
        self.send_command(Command::SetOption, &option.code().to_le_bytes())?;
        self.expect_ok()
    }

    /// Commit the current transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.execute_statement("COMMIT")
    }

    /// Roll back the current transaction.
    pub fn rollback(&mut self) -> Result<()> {
        self.execute_statement("ROLLBACK")
    }

    /// Set the autocommit mode.
    pub fn set_autocommit(&mut self, enabled: bool) -> Result<()> {
        self.execute_statement(if enabled {
            "SET AUTOCOMMIT=1"
        } else {
            "SET AUTOCOMMIT=0"
        })
    }

    /// Run a statement that must not produce a result set.
    fn execute_statement(&mut self, sql: &str) -> Result<()> {
        self.query(sql)?;
        if self.pending_fields.is_some() {
            // Drain it to keep the connection usable before complaining.
            let _ = self.store_result()?;
            return Err(protocol_err("statement unexpectedly returned a result set"));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Escaping helpers
    // ------------------------------------------------------------------

    /// Escape special characters in a byte string. See
    /// [`escape::escape_string`].
    pub fn escape_string(&self, input: &[u8]) -> Vec<u8> {
        escape::escape_string(input)
    }

    /// Produce a quoted SQL string literal. See [`escape::string_literal`].
    pub fn string_literal(&self, input: &[u8]) -> Vec<u8> {
        escape::string_literal(input)
    }

    /// Render a dynamic value as a SQL literal. See [`escape::quote_value`].
    pub fn quote_value(&self, value: &mysqlc_core::Value) -> String {
        escape::quote_value(value)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Replace the converter table used for subsequent result sets.
    pub fn set_converters(&mut self, table: ConverterTable) {
        self.converters = table;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Is the connection usable (not closed)?
    pub fn is_open(&self) -> bool {
        self.state != ConnectionState::Closed
    }

    /// Rows affected by the last statement. After `store_result` this is
    /// the row count of the stored result.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Auto-increment id assigned by the last INSERT.
    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    /// Warning count of the last statement.
    pub fn warning_count(&self) -> u16 {
        self.warnings
    }

    /// Info string of the last statement (e.g. "Rows matched: 3 ...").
    pub fn info(&self) -> &str {
        &self.info
    }

    /// Server-side thread (connection) id of this session.
    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    /// Column count of the last statement; 0 for statements without a
    /// result set.
    pub fn field_count(&self) -> usize {
        self.last_field_count
    }

    /// Server version string from the handshake.
    pub fn server_version(&self) -> Option<&str> {
        self.server.as_ref().map(|s| s.server_version.as_str())
    }

    /// Handshake protocol version (10 on every current server).
    pub fn protocol_version(&self) -> Option<u8> {
        self.server.as_ref().map(|s| s.protocol_version)
    }

    /// Human-readable description of the transport.
    pub fn host_info(&self) -> String {
        if self.config.unix_socket.is_some() {
            "Localhost via UNIX socket".to_string()
        } else {
            format!("{} via TCP/IP", self.config.host)
        }
    }

    /// Name of the connection character set.
    pub fn character_set_name(&self) -> &'static str {
        charset::name(self.config.charset).unwrap_or("unknown")
    }

    #[cfg(test)]
    pub(crate) fn for_testing(state: ConnectionState) -> Self {
        Self {
            stream: Stream::Closed,
            state,
            config: MySqlConfig::default(),
            server: None,
            client_caps: 0,
            thread_id: 0,
            status_flags: 0,
            affected_rows: 0,
            last_insert_id: 0,
            warnings: 0,
            info: String::new(),
            pending_fields: None,
            last_field_count: 0,
            sequence_id: 0,
            converters: ConverterTable::default(),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.state != ConnectionState::Closed {
            let _ = self.send_command(Command::Quit, &[]);
            self.stream.shutdown();
        }
    }
}

fn open_transport(config: &MySqlConfig) -> Result<Stream> {
    if let Some(path) = &config.unix_socket {
        #[cfg(unix)]
        {
            let sock = std::os::unix::net::UnixStream::connect(path).map_err(|e| {
                Error::operational_io(
                    client_errors::CR_CONNECTION_ERROR,
                    format!("cannot connect to local server through socket {}", path.display()),
                    e,
                )
            })?;
            sock.set_read_timeout(Some(config.connect_timeout)).ok();
            sock.set_write_timeout(Some(config.connect_timeout)).ok();
            return Ok(Stream::Unix(sock));
        }
        #[cfg(not(unix))]
        {
            let _ = path;
            return Err(Error::not_supported(
                "unix domain sockets are not available on this platform",
            ));
        }
    }

    let addrs: Vec<_> = config
        .tcp_addr()
        .to_socket_addrs()
        .map_err(|e| {
            Error::operational_io(
                client_errors::CR_UNKNOWN_HOST,
                format!("unknown MySQL server host '{}'", config.host),
                e,
            )
        })?
        .collect();

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, config.connect_timeout) {
            Ok(tcp) => {
                tcp.set_nodelay(true).ok();
                tcp.set_read_timeout(Some(config.connect_timeout)).ok();
                tcp.set_write_timeout(Some(config.connect_timeout)).ok();
                return Ok(Stream::Tcp(tcp));
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(match last_err {
        Some(e) => Error::operational_io(
            client_errors::CR_CONN_HOST_ERROR,
            format!("cannot connect to MySQL server on '{}'", config.tcp_addr()),
            e,
        ),
        None => Error::operational(
            client_errors::CR_UNKNOWN_HOST,
            format!("host '{}' resolved to no addresses", config.host),
        ),
    })
}

fn protocol_err(message: impl Into<String>) -> Error {
    Error::interface(message)
}

fn read_error(e: std::io::Error) -> Error {
    Error::operational_io(
        client_errors::CR_SERVER_LOST,
        "lost connection to MySQL server while reading",
        e,
    )
}

fn write_error(e: std::io::Error) -> Error {
    Error::operational_io(
        client_errors::CR_SERVER_GONE_ERROR,
        "MySQL server has gone away",
        e,
    )
}
