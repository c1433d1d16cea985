//! End-to-end driver tests against a scripted in-process server.
//!
//! Each test binds a listener on a loopback port and runs a server script
//! on a background thread: perform the handshake, then answer the exact
//! command packets the test is expected to produce. Server frames are built
//! with the crate's own wire primitives, and the client's authentication
//! digest is verified against the reference algorithm.

use std::net::{TcpListener, TcpStream};
use std::sync::OnceLock;
use std::thread::JoinHandle;
use std::time::Duration;

use mysqlc::protocol::writer::frame_payload;
use mysqlc::protocol::{PacketHeader, PacketReader, PacketWriter, capabilities};
use mysqlc::{
    Connection, ConnectionState, ConverterTable, DatabaseErrorKind, FieldType, Library,
    MySqlConfig, ResultSet, RowMode, Value, auth, client_errors,
};

const SEED: [u8; 20] = [
    0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f, 0x60, 0x71, 0x82, 0x93, 0xa4, 0xb5, 0xc6, 0xd7, 0xe8,
    0xf9, 0x01, 0x12, 0x23, 0x34,
];
const USER: &str = "app";
const PASSWORD: &str = "secret";

const SERVER_CAPS: u32 = capabilities::CLIENT_LONG_PASSWORD
    | capabilities::CLIENT_PROTOCOL_41
    | capabilities::CLIENT_TRANSACTIONS
    | capabilities::CLIENT_SECURE_CONNECTION
    | capabilities::CLIENT_MULTI_RESULTS
    | capabilities::CLIENT_PLUGIN_AUTH
    | capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
    | capabilities::CLIENT_CONNECT_WITH_DB;

const STATUS_AUTOCOMMIT: u16 = 0x0002;

fn library() -> &'static Library {
    static LIBRARY: OnceLock<Library> = OnceLock::new();
    LIBRARY.get_or_init(|| Library::init().expect("library init"))
}

/// Server side of one scripted connection.
struct ServerConn {
    stream: TcpStream,
    seq: u8,
}

impl ServerConn {
    fn send(&mut self, payload: &[u8]) {
        use std::io::Write;
        let framed = frame_payload(payload, self.seq);
        self.seq = self.seq.wrapping_add(1);
        self.stream.write_all(&framed).expect("server write");
    }

    fn read_packet(&mut self) -> Vec<u8> {
        use std::io::Read;
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header).expect("server read header");
        let header = PacketHeader::from_bytes(&header);
        self.seq = header.sequence_id.wrapping_add(1);
        let mut payload = vec![0u8; header.payload_length as usize];
        self.stream.read_exact(&mut payload).expect("server read payload");
        payload
    }

    fn send_handshake(&mut self) {
        let mut w = PacketWriter::new();
        w.write_u8(10);
        w.write_null_string("8.0.0-scripted");
        w.write_u32_le(42); // thread id
        w.write_bytes(&SEED[..8]);
        w.write_u8(0); // filler
        #[allow(clippy::cast_possible_truncation)]
        w.write_u16_le((SERVER_CAPS & 0xFFFF) as u16);
        w.write_u8(255); // utf8mb4
        w.write_u16_le(STATUS_AUTOCOMMIT);
        #[allow(clippy::cast_possible_truncation)]
        w.write_u16_le((SERVER_CAPS >> 16) as u16);
        w.write_u8(21); // auth data length
        w.write_zeros(10);
        w.write_bytes(&SEED[8..]);
        w.write_u8(0); // part-2 trailing NUL
        w.write_null_string("mysql_native_password");
        self.send(w.as_bytes());
    }

    /// Read the handshake response and verify the credential digest.
    fn verify_handshake_response(&mut self) {
        let payload = self.read_packet();
        let mut r = PacketReader::new(&payload);
        let caps = r.read_u32_le().expect("client caps");
        let _max_packet = r.read_u32_le().expect("max packet");
        let _charset = r.read_u8().expect("charset");
        assert!(r.skip(23));
        assert_eq!(r.read_null_string().as_deref(), Some(USER));

        let digest = if caps & capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
            r.read_lenenc_bytes().expect("auth digest").to_vec()
        } else {
            let len = usize::from(r.read_u8().expect("auth len"));
            r.read_bytes(len).expect("auth digest").to_vec()
        };
        assert_eq!(digest, auth::mysql_native_password(PASSWORD, &SEED));
    }

    fn send_ok(&mut self, affected: u64, insert_id: u64) {
        self.send_ok_with_status(affected, insert_id, STATUS_AUTOCOMMIT);
    }

    fn send_ok_with_status(&mut self, affected: u64, insert_id: u64, status: u16) {
        let mut w = PacketWriter::new();
        w.write_u8(0x00);
        w.write_lenenc_int(affected);
        w.write_lenenc_int(insert_id);
        w.write_u16_le(status);
        w.write_u16_le(0);
        self.send(w.as_bytes());
    }

    fn send_err(&mut self, code: u16, state: &str, message: &str) {
        let mut w = PacketWriter::new();
        w.write_u8(0xFF);
        w.write_u16_le(code);
        w.write_u8(b'#');
        w.write_bytes(state.as_bytes());
        w.write_bytes(message.as_bytes());
        self.send(w.as_bytes());
    }

    fn send_eof(&mut self) {
        let mut w = PacketWriter::new();
        w.write_u8(0xFE);
        w.write_u16_le(0);
        w.write_u16_le(STATUS_AUTOCOMMIT);
        self.send(w.as_bytes());
    }

    fn send_column_count(&mut self, count: u64) {
        let mut w = PacketWriter::new();
        w.write_lenenc_int(count);
        self.send(w.as_bytes());
    }

    fn send_column(&mut self, table: &str, name: &str, ty: FieldType, flags: u16) {
        let mut w = PacketWriter::new();
        w.write_lenenc_string("def");
        w.write_lenenc_string("test");
        w.write_lenenc_string(table);
        w.write_lenenc_string(table);
        w.write_lenenc_string(name);
        w.write_lenenc_string(name);
        w.write_lenenc_int(0x0c);
        w.write_u16_le(255);
        w.write_u32_le(11);
        w.write_u8(ty as u8);
        w.write_u16_le(flags);
        w.write_u8(0);
        w.write_u16_le(0);
        self.send(w.as_bytes());
    }

    fn send_text_row(&mut self, cells: &[Option<&[u8]>]) {
        let mut w = PacketWriter::new();
        for cell in cells {
            match cell {
                Some(bytes) => w.write_lenenc_bytes(bytes),
                None => w.write_u8(0xFB),
            }
        }
        self.send(w.as_bytes());
    }

    /// A one-column result set of BIGINT text values.
    fn send_int_result(&mut self, name: &str, values: &[&[u8]]) {
        self.send_column_count(1);
        self.send_column("", name, FieldType::LongLong, 0);
        self.send_eof();
        for value in values {
            self.send_text_row(&[Some(value)]);
        }
        self.send_eof();
    }

    fn expect_command(&mut self, command: u8, argument: &[u8]) {
        let payload = self.read_packet();
        assert_eq!(payload.first(), Some(&command), "command byte");
        assert_eq!(&payload[1..], argument, "command argument");
    }

    fn expect_query(&mut self, sql: &str) {
        self.expect_command(0x03, sql.as_bytes());
    }
}

fn accept_and_auth(listener: &TcpListener) -> ServerConn {
    let (stream, _) = listener.accept().expect("accept");
    let mut server = ServerConn { stream, seq: 0 };
    server.send_handshake();
    server.verify_handshake_response();
    server.send_ok(0, 0);
    server
}

fn test_config(port: u16) -> MySqlConfig {
    MySqlConfig::new()
        .host("127.0.0.1")
        .port(port)
        .user(USER)
        .password(PASSWORD)
        .database("test")
        .connect_timeout(Duration::from_secs(5))
}

/// Spawn a scripted server and connect to it.
fn with_server<F>(script: F) -> (Connection, JoinHandle<()>)
where
    F: FnOnce(ServerConn) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let handle = std::thread::spawn(move || {
        let server = accept_and_auth(&listener);
        script(server);
    });
    let conn = library().connect(test_config(port)).expect("connect");
    (conn, handle)
}

#[test]
fn connect_reports_server_metadata() {
    let (mut conn, handle) = with_server(|_server| {});
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert_eq!(conn.server_version(), Some("8.0.0-scripted"));
    assert_eq!(conn.protocol_version(), Some(10));
    assert_eq!(conn.thread_id(), 42);
    assert_eq!(conn.character_set_name(), "utf8mb4");
    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn ok_query_then_another_without_storing() {
    let (mut conn, handle) = with_server(|mut server| {
        server.expect_query("UPDATE t SET a = 1");
        server.send_ok(3, 7);
        server.expect_query("DELETE FROM t");
        server.send_ok(2, 0);
    });

    conn.query("UPDATE t SET a = 1").unwrap();
    assert_eq!(conn.affected_rows(), 3);
    assert_eq!(conn.last_insert_id(), 7);
    assert_eq!(conn.field_count(), 0);
    assert_eq!(conn.state(), ConnectionState::Ready);

    conn.query("DELETE FROM t").unwrap();
    assert_eq!(conn.affected_rows(), 2);

    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn select_one_buffered_with_default_converters() {
    let (mut conn, handle) = with_server(|mut server| {
        server.expect_query("SELECT 1");
        server.send_int_result("1", &[b"1"]);
    });

    conn.query("SELECT 1").unwrap();
    assert_eq!(conn.state(), ConnectionState::AwaitingResult);
    assert_eq!(conn.field_count(), 1);

    let mut result = conn.store_result().unwrap();
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert_eq!(result.num_rows(), Some(1));
    assert_eq!(result.fields()[0].name, "1");

    let rows = result.fetch_rows(1, RowMode::Tuple).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Value::BigInt(1));

    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn select_one_without_converters_yields_bytes() {
    let (mut conn, handle) = with_server(|mut server| {
        server.expect_query("SELECT 1");
        server.send_int_result("1", &[b"1"]);
    });

    conn.set_converters(ConverterTable::empty());
    conn.query("SELECT 1").unwrap();
    let mut result = conn.store_result().unwrap();
    let rows = result.fetch_rows(1, RowMode::Tuple).unwrap();
    assert_eq!(rows[0][0], Value::Bytes(b"1".to_vec()));

    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn select_null_yields_null() {
    let (mut conn, handle) = with_server(|mut server| {
        server.expect_query("SELECT NULL");
        server.send_column_count(1);
        server.send_column("", "NULL", FieldType::Null, 0);
        server.send_eof();
        server.send_text_row(&[None]);
        server.send_eof();
    });

    conn.query("SELECT NULL").unwrap();
    let mut result = conn.store_result().unwrap();
    let rows = result.fetch_rows(0, RowMode::Tuple).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Value::Null);

    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn duplicate_columns_in_dict_shapes() {
    let (mut conn, handle) = with_server(|mut server| {
        server.expect_query("SELECT a.id, b.id FROM a JOIN b");
        server.send_column_count(2);
        server.send_column("a", "id", FieldType::Long, 0);
        server.send_column("b", "id", FieldType::Long, 0);
        server.send_eof();
        server.send_text_row(&[Some(b"1"), Some(b"2")]);
        server.send_eof();
    });

    conn.query("SELECT a.id, b.id FROM a JOIN b").unwrap();
    let mut result = conn.store_result().unwrap();

    let dict = &result.fetch_rows(1, RowMode::Dict).unwrap()[0];
    assert_eq!(dict.get("id"), Some(&Value::Int(1)));
    assert_eq!(dict.get("b.id"), Some(&Value::Int(2)));

    result.data_seek(0).unwrap();
    let qualified = &result.fetch_rows(1, RowMode::DictQualified).unwrap()[0];
    assert_eq!(qualified.get("a.id"), Some(&Value::Int(1)));
    assert_eq!(qualified.get("b.id"), Some(&Value::Int(2)));
    assert_eq!(qualified.get("id"), None);

    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn buffered_seeks_match_direct_iteration() {
    let (mut conn, handle) = with_server(|mut server| {
        server.expect_query("SELECT n FROM t");
        server.send_int_result("n", &[b"10", b"20", b"30", b"40"]);
    });

    conn.query("SELECT n FROM t").unwrap();
    let mut result = conn.store_result().unwrap();
    let all = result.fetch_rows(0, RowMode::Tuple).unwrap();
    assert_eq!(all.len(), 4);

    for (k, expected) in all.iter().enumerate() {
        result.data_seek(k as u64).unwrap();
        let row = &result.fetch_rows(1, RowMode::Tuple).unwrap()[0];
        assert_eq!(row.values(), expected.values(), "row {k}");
    }

    // max observed length is recorded during the store.
    assert_eq!(result.fields()[0].max_length, 2);

    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn streaming_result_pulls_rows_lazily() {
    let (mut conn, handle) = with_server(|mut server| {
        server.expect_query("SELECT n FROM t");
        server.send_int_result("n", &[b"10", b"20", b"30"]);
        server.expect_query("SELECT 1");
        server.send_int_result("1", &[b"1"]);
    });

    conn.query("SELECT n FROM t").unwrap();
    {
        let mut result = conn.use_result().unwrap();
        assert_eq!(result.num_rows(), None);

        let first = result.fetch_rows(1, RowMode::Tuple).unwrap();
        assert_eq!(first[0][0], Value::BigInt(10));
        assert_eq!(result.num_rows(), None);

        assert_eq!(
            result.data_seek(0).unwrap_err().kind(),
            Some(DatabaseErrorKind::NotSupported)
        );
        assert_eq!(
            result.row_tell().unwrap_err().kind(),
            Some(DatabaseErrorKind::NotSupported)
        );

        let rest = result.fetch_rows(0, RowMode::Tuple).unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(result.num_rows(), Some(3));
    }

    // The connection is usable again after the stream is exhausted.
    assert_eq!(conn.state(), ConnectionState::Ready);
    conn.query("SELECT 1").unwrap();
    let _ = conn.store_result().unwrap();

    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn dropping_a_streaming_result_drains_the_wire() {
    let (mut conn, handle) = with_server(|mut server| {
        server.expect_query("SELECT n FROM t");
        server.send_int_result("n", &[b"1", b"2", b"3", b"4"]);
        server.expect_query("SELECT 1");
        server.send_int_result("1", &[b"1"]);
    });

    conn.query("SELECT n FROM t").unwrap();
    {
        let mut result = conn.use_result().unwrap();
        let _ = result.fetch_rows(1, RowMode::Tuple).unwrap();
        // Dropped with three rows unread.
    }
    assert_eq!(conn.state(), ConnectionState::Ready);

    conn.query("SELECT 1").unwrap();
    let _ = conn.store_result().unwrap();

    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn second_query_with_pending_result_fails_client_side() {
    let (mut conn, handle) = with_server(|mut server| {
        server.expect_query("SELECT n FROM t");
        server.send_int_result("n", &[b"5"]);
        // The out-of-sync query below must never reach the server; the
        // next packet it sees is the follow-up query after cleanup.
        server.expect_query("SELECT 1");
        server.send_int_result("1", &[b"1"]);
    });

    conn.query("SELECT n FROM t").unwrap();

    let err = conn.query("SELECT broken").unwrap_err();
    assert!(err.is_programming());
    assert_eq!(err.code(), Some(client_errors::CR_COMMANDS_OUT_OF_SYNC));

    // Clean up the pending result and continue normally.
    let _ = conn.store_result().unwrap();
    conn.query("SELECT 1").unwrap();
    let _ = conn.store_result().unwrap();

    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn server_errors_map_through_the_taxonomy() {
    let (mut conn, handle) = with_server(|mut server| {
        server.expect_query("SELEKT 1");
        server.send_err(1064, "42000", "You have an error in your SQL syntax");
        server.expect_query("INSERT INTO u VALUES (1)");
        server.send_err(1062, "23000", "Duplicate entry '1' for key 'PRIMARY'");
    });

    let err = conn.query("SELEKT 1").unwrap_err();
    assert!(err.is_programming());
    assert_eq!(err.code(), Some(1064));
    assert_eq!(err.sqlstate(), Some("42000"));

    let err = conn.query("INSERT INTO u VALUES (1)").unwrap_err();
    assert_eq!(err.kind(), Some(DatabaseErrorKind::Integrity));
    assert_eq!(err.code(), Some(1062));

    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn ping_and_admin_commands() {
    let (mut conn, handle) = with_server(|mut server| {
        server.expect_command(0x0E, b""); // COM_PING
        server.send_ok(0, 0);
        server.expect_command(0x02, b"other"); // COM_INIT_DB
        server.send_ok(0, 0);
        server.expect_command(0x09, b""); // COM_STATISTICS
        server.send(b"Uptime: 5  Threads: 1");
        server.expect_command(0x0C, &7u32.to_le_bytes()); // COM_PROCESS_KILL
        server.send_ok(0, 0);
        server.expect_query("COMMIT");
        server.send_ok(0, 0);
        server.expect_query("SET AUTOCOMMIT=0");
        server.send_ok(0, 0);
    });

    conn.ping().unwrap();
    conn.select_db("other").unwrap();
    assert_eq!(conn.stat().unwrap(), "Uptime: 5  Threads: 1");
    conn.kill(7).unwrap();
    conn.commit().unwrap();
    conn.set_autocommit(false).unwrap();

    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn ping_reconnects_when_the_server_went_away() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();

    let handle = std::thread::spawn(move || {
        let mut server = accept_and_auth(&listener);
        server.expect_command(0x0E, b"");
        drop(server); // hang up instead of answering

        let mut server = accept_and_auth(&listener);
        server.expect_command(0x0E, b"");
        server.send_ok(0, 0);
    });

    let mut conn = library()
        .connect(test_config(port).reconnect(true))
        .expect("connect");
    conn.ping().unwrap();
    assert_eq!(conn.state(), ConnectionState::Ready);

    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn close_twice_and_commands_after_close() {
    let (mut conn, handle) = with_server(|_server| {});

    conn.close().unwrap();
    assert!(!conn.is_open());

    let err = conn.close().unwrap_err();
    assert!(err.is_programming());

    let err = conn.query("SELECT 1").unwrap_err();
    assert!(err.is_interface());

    handle.join().unwrap();
}

#[test]
fn multi_result_statements_advance_with_next_result() {
    const MORE_RESULTS: u16 = 0x0008;
    let (mut conn, handle) = with_server(|mut server| {
        server.expect_query("CALL two_results()");
        server.send_ok_with_status(1, 0, STATUS_AUTOCOMMIT | MORE_RESULTS);
        server.send_ok(2, 0);
    });

    conn.query("CALL two_results()").unwrap();
    assert_eq!(conn.affected_rows(), 1);

    assert!(conn.next_result().unwrap());
    assert_eq!(conn.affected_rows(), 2);

    assert!(!conn.next_result().unwrap());

    conn.close().unwrap();
    handle.join().unwrap();
}
