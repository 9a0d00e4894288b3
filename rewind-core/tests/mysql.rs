//! End-to-end recorder/replayer scenarios for the MySQL engine, driven over
//! in-memory duplex pipes standing in for the two legs of a connection.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

use rewind_core::mock::{Mock, MockKind, WireMessage};
use rewind_core::mysql::context::{DecodeContext, Mode};
use rewind_core::mysql::protocol::connect::Handshake;
use rewind_core::mysql::protocol::response::{EofPacket, OkPacket};
use rewind_core::mysql::protocol::statement::{BinaryValue, ComStmtPrepareOk};
use rewind_core::mysql::protocol::text::TextRow;
use rewind_core::mysql::protocol::{
    write_packet, Capabilities, ColumnDefinition, Encode, FieldFlags, Message, ResultSet,
    ResultSetRow, Status, Terminator, TypeId,
};
use rewind_core::mysql::{mock_outgoing, record_outgoing};
use rewind_core::net::{Shutdown, StreamId};
use rewind_core::options::SessionOptions;
use rewind_core::store::{InMemoryMockStore, MockStore};

struct Epoch;

impl rewind_core::mock::Clock for Epoch {
    fn now(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH
    }
}

const CLIENT_CAPS: Capabilities = Capabilities::from_bits_truncate(
    Capabilities::PROTOCOL_41.bits()
        | Capabilities::PLUGIN_AUTH.bits()
        | Capabilities::PLUGIN_AUTH_LENENC_DATA.bits()
        | Capabilities::SECURE_CONNECTION.bits(),
);

fn greeting(plugin: &str) -> Handshake {
    Handshake {
        protocol_version: 10,
        server_version: "8.0.33".into(),
        connection_id: 25,
        auth_plugin_data_1: Bytes::from_static(b"\x11\x22\x33\x44\x55\x66\x77\x88"),
        capabilities: CLIENT_CAPS | Capabilities::SSL,
        collation: 255,
        status: Status::SERVER_STATUS_AUTOCOMMIT,
        auth_plugin_data_len: 21,
        auth_plugin_data_2: Bytes::from_static(b"\x01\x02\x03\x04\x05\x06\x07\x08\x09\x0a\x0b\x0c\x00"),
        auth_plugin_name: Some(plugin.into()),
    }
}

fn frame<T: Encode>(seq: u8, value: &T, capabilities: Capabilities) -> Vec<u8> {
    let mut payload = Vec::new();
    value.encode_with(&mut payload, capabilities);

    let mut out = Vec::new();
    write_packet(&mut out, seq, &payload);
    out
}

fn frame_raw(seq: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    write_packet(&mut out, seq, payload);
    out
}

/// The 32 + n byte HandshakeResponse41 a real client would send.
fn handshake_response_bytes(seq: u8) -> Vec<u8> {
    use rewind_core::mysql::protocol::connect::HandshakeResponse;

    let response = HandshakeResponse {
        capabilities: CLIENT_CAPS,
        max_packet_size: 16_777_216,
        collation: 45,
        username: "root".into(),
        auth_response: Bytes::from_static(&[0xAB; 20]),
        database: None,
        auth_plugin_name: Some("caching_sha2_password".into()),
        connect_attrs: vec![],
        zstd_compression_level: None,
    };

    frame(seq, &response, CLIENT_CAPS)
}

async fn read_frame(stream: &mut DuplexStream) -> (u8, Vec<u8>) {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.unwrap();

    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.unwrap();

    (header[3], payload)
}

fn spawn_recorder(
    proxy_client: DuplexStream,
    proxy_upstream: DuplexStream,
) -> (
    mpsc::Receiver<Mock>,
    rewind_core::net::ShutdownSignal,
    tokio::task::JoinHandle<rewind_core::error::Result<()>>,
) {
    let (tx, rx) = mpsc::channel(32);
    let (signal, shutdown) = Shutdown::new();

    let handle = tokio::spawn(async move {
        record_outgoing(
            Box::new(proxy_client),
            Box::new(proxy_upstream),
            tx,
            shutdown,
            SessionOptions::new(),
            &Epoch,
        )
        .await
    });

    (rx, signal, handle)
}

#[tokio::test]
async fn records_a_caching_sha2_fast_auth_handshake_as_one_config_mock() {
    let (mut client, proxy_client) = tokio::io::duplex(1 << 16);
    let (proxy_upstream, mut upstream) = tokio::io::duplex(1 << 16);
    let (mut rx, _shutdown, handle) = spawn_recorder(proxy_client, proxy_upstream);

    // server greeting
    upstream
        .write_all(&frame(0, &greeting("caching_sha2_password"), CLIENT_CAPS))
        .await
        .unwrap();
    let _ = read_frame(&mut client).await;

    // client handshake response with a 20-byte auth response
    client
        .write_all(&handshake_response_bytes(1))
        .await
        .unwrap();
    let _ = read_frame(&mut upstream).await;

    // fast auth success, then OK
    upstream
        .write_all(&frame_raw(2, b"\x01\x03"))
        .await
        .unwrap();
    upstream
        .write_all(&frame_raw(3, b"\x00\x00\x00\x02\x00\x00\x00"))
        .await
        .unwrap();
    let _ = read_frame(&mut client).await;
    let _ = read_frame(&mut client).await;

    let mock = rx.recv().await.expect("config mock");
    assert_eq!(mock.kind, MockKind::MySql);
    assert!(mock.is_config());
    assert_eq!(mock.requests.len(), 1);
    assert_eq!(mock.responses.len(), 3);
    assert_eq!(&*mock.responses[0].operation, "HANDSHAKE_V10");
    assert_eq!(&*mock.responses[1].operation, "AUTH_MORE_DATA");
    assert_eq!(&*mock.responses[2].operation, "OK");
    assert_eq!(
        mock.metadata.get("responseOperation").map(String::as_str),
        Some("OK")
    );

    // connection closes cleanly
    drop(client);
    drop(upstream);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn records_prepare_and_execute_with_statement_bookkeeping() {
    let (mut client, proxy_client) = tokio::io::duplex(1 << 16);
    let (proxy_upstream, mut upstream) = tokio::io::duplex(1 << 16);
    let (mut rx, _shutdown, handle) = spawn_recorder(proxy_client, proxy_upstream);

    // native-password handshake: greeting, response, immediate OK
    upstream
        .write_all(&frame(0, &greeting("mysql_native_password"), CLIENT_CAPS))
        .await
        .unwrap();
    let _ = read_frame(&mut client).await;
    client
        .write_all(&handshake_response_bytes(1))
        .await
        .unwrap();
    let _ = read_frame(&mut upstream).await;
    upstream
        .write_all(&frame_raw(2, b"\x00\x00\x00\x02\x00\x00\x00"))
        .await
        .unwrap();
    let _ = read_frame(&mut client).await;
    let _config = rx.recv().await.expect("config mock");

    // COM_STMT_PREPARE
    client
        .write_all(&frame_raw(0, b"\x16SELECT a, b FROM t WHERE id = ?"))
        .await
        .unwrap();
    let _ = read_frame(&mut upstream).await;

    let prepare_ok = ComStmtPrepareOk {
        statement_id: 1,
        num_columns: 2,
        num_params: 1,
        warnings: 0,
    };
    let eof = EofPacket {
        warnings: 0,
        status: Status::SERVER_STATUS_AUTOCOMMIT,
    };

    upstream
        .write_all(&frame(1, &prepare_ok, CLIENT_CAPS))
        .await
        .unwrap();
    upstream
        .write_all(&frame(2, &column("?", TypeId::INT), CLIENT_CAPS))
        .await
        .unwrap();
    upstream.write_all(&frame(3, &eof, CLIENT_CAPS)).await.unwrap();
    upstream
        .write_all(&frame(4, &column("a", TypeId::INT), CLIENT_CAPS))
        .await
        .unwrap();
    upstream
        .write_all(&frame(5, &column("b", TypeId::VAR_STRING), CLIENT_CAPS))
        .await
        .unwrap();
    upstream.write_all(&frame(6, &eof, CLIENT_CAPS)).await.unwrap();

    for _ in 0..6 {
        let _ = read_frame(&mut client).await;
    }

    let prepare_mock = rx.recv().await.expect("prepare mock");
    assert!(!prepare_mock.is_config());
    let WireMessage::MySql(Message::StmtPrepareOk(stored)) =
        &prepare_mock.responses[0].bundle.message
    else {
        panic!("expected a prepare response");
    };
    assert_eq!(stored.ok.statement_id, 1);
    assert_eq!(stored.param_defs.len(), 1);
    assert_eq!(stored.column_defs.len(), 2);
    assert!(stored.eof_after_params.is_some());
    assert!(stored.eof_after_columns.is_some());

    // COM_STMT_EXECUTE with one int32 parameter = 7; decodable only through
    // the statement table filled in by the prepare above
    let execute: &[u8] = b"\x17\x01\x00\x00\x00\x00\x01\x00\x00\x00\x00\x01\x03\x00\x07\x00\x00\x00";
    client.write_all(&frame_raw(0, execute)).await.unwrap();
    let _ = read_frame(&mut upstream).await;

    // binary result set: column count, two defs, EOF, one row, EOF
    upstream.write_all(&frame_raw(1, b"\x02")).await.unwrap();
    upstream
        .write_all(&frame(2, &column("a", TypeId::INT), CLIENT_CAPS))
        .await
        .unwrap();
    upstream
        .write_all(&frame(3, &column("b", TypeId::VAR_STRING), CLIENT_CAPS))
        .await
        .unwrap();
    upstream.write_all(&frame(4, &eof, CLIENT_CAPS)).await.unwrap();
    upstream
        .write_all(&frame_raw(5, b"\x00\x00\x0b\x00\x00\x00\x02ok"))
        .await
        .unwrap();
    upstream.write_all(&frame(6, &eof, CLIENT_CAPS)).await.unwrap();

    for _ in 0..6 {
        let _ = read_frame(&mut client).await;
    }

    let execute_mock = rx.recv().await.expect("execute mock");
    let WireMessage::MySql(Message::StmtExecute(decoded)) =
        &execute_mock.requests[0].bundle.message
    else {
        panic!("expected a decoded execute");
    };
    assert_eq!(decoded.statement_id, 1);
    assert_eq!(decoded.parameter_count, 1);
    assert_eq!(decoded.parameters[0].value, BinaryValue::Long(7));

    let WireMessage::MySql(Message::BinaryResultSet(set)) =
        &execute_mock.responses[0].bundle.message
    else {
        panic!("expected a binary result set");
    };
    assert_eq!(set.column_count, 2);
    assert_eq!(set.rows.len(), 1);

    // COM_STMT_CLOSE drops the table entry; no response crosses the wire
    client
        .write_all(&frame_raw(0, b"\x19\x01\x00\x00\x00"))
        .await
        .unwrap();
    let _ = read_frame(&mut upstream).await;

    let close_mock = rx.recv().await.expect("close mock");
    assert_eq!(&*close_mock.requests[0].operation, "COM_STMT_CLOSE");
    assert!(close_mock.responses.is_empty());

    drop(client);
    drop(upstream);
    handle.await.unwrap().unwrap();
}

fn column(name: &str, type_id: TypeId) -> ColumnDefinition {
    ColumnDefinition {
        schema: "shop".into(),
        table_alias: "t".into(),
        table: "t".into(),
        column_alias: name.into(),
        column: name.into(),
        collation: 63,
        max_size: 11,
        type_id,
        flags: FieldFlags::empty(),
        decimals: 0,
    }
}

/// A store pre-seeded the way a recording session would leave it.
fn seeded_store() -> Arc<InMemoryMockStore> {
    use rewind_core::mock::build_mock;
    use rewind_core::mysql::protocol::connect::HandshakeResponse;

    let store = InMemoryMockStore::new();
    let conn = StreamId::next();

    // config mock: greeting -> handshake response -> OK
    let response = HandshakeResponse {
        capabilities: CLIENT_CAPS,
        max_packet_size: 16_777_216,
        collation: 45,
        username: "root".into(),
        auth_response: Bytes::from_static(&[0xAB; 20]),
        database: None,
        auth_plugin_name: Some("caching_sha2_password".into()),
        connect_attrs: vec![],
        zstd_compression_level: None,
    };

    let header = |len: u32, seq: u8| rewind_core::mysql::protocol::PacketHeader { length: len, seq };

    let config = build_mock(
        MockKind::MySql,
        true,
        vec![request_of(header(32, 1), Message::HandshakeResponse(response), conn)],
        vec![
            response_of(header(78, 0), Message::Handshake(greeting("caching_sha2_password")), conn),
            response_of(header(7, 2), Message::Ok(ok_packet()), conn),
        ],
        &Epoch,
    );
    store.insert(config);

    // data mock: SELECT 1 -> one-column text result set
    let set = ResultSet {
        column_count: 1,
        columns: vec![column("1", TypeId::BIG_INT)],
        eof_after_columns: None,
        rows: vec![ResultSetRow::Text(TextRow {
            raw: Bytes::from_static(b"\x011"),
            values: vec![Some(Bytes::from_static(b"1"))],
        })],
        terminator: Terminator::OkEof(ok_packet()),
    };

    let data = build_mock(
        MockKind::MySql,
        false,
        vec![request_of(
            header(9, 0),
            Message::Query(rewind_core::mysql::protocol::text::ComQuery {
                query: "SELECT 1".into(),
                attributes: vec![],
            }),
            conn,
        )],
        vec![response_of(header(1, 1), Message::TextResultSet(set), conn)],
        &Epoch,
    );
    store.insert(data);

    Arc::new(store)
}

fn ok_packet() -> OkPacket {
    OkPacket {
        affected_rows: 0,
        last_insert_id: 0,
        status: Status::SERVER_STATUS_AUTOCOMMIT,
        warnings: 0,
        info: "".into(),
    }
}

fn request_of(
    header: rewind_core::mysql::protocol::PacketHeader,
    message: Message,
    conn: StreamId,
) -> rewind_core::mock::Request {
    rewind_core::mock::Request {
        operation: message.type_tag().into(),
        bundle: rewind_core::mock::PacketBundle {
            header: rewind_core::mock::WireHeader::MySql(header),
            type_tag: message.type_tag(),
            message: WireMessage::MySql(message),
        },
        connection: conn,
        at: SystemTime::UNIX_EPOCH,
    }
}

fn response_of(
    header: rewind_core::mysql::protocol::PacketHeader,
    message: Message,
    conn: StreamId,
) -> rewind_core::mock::Response {
    rewind_core::mock::Response {
        operation: message.type_tag().into(),
        bundle: rewind_core::mock::PacketBundle {
            header: rewind_core::mock::WireHeader::MySql(header),
            type_tag: message.type_tag(),
            message: WireMessage::MySql(message),
        },
        connection: conn,
        at: SystemTime::UNIX_EPOCH,
    }
}

async fn connect_replayed(client: &mut DuplexStream) {
    // greeting arrives unprompted
    let (seq, payload) = read_frame(client).await;
    assert_eq!(seq, 0);
    assert_eq!(payload[0], 10);

    client.write_all(&handshake_response_bytes(1)).await.unwrap();

    let (_, payload) = read_frame(client).await;
    assert_eq!(payload[0], 0x00);
}

#[tokio::test]
async fn replays_a_synthetic_ok_for_an_unmocked_begin() {
    let (mut client, proxy_client) = tokio::io::duplex(1 << 16);
    let (_signal, shutdown) = Shutdown::new();

    let store = seeded_store();
    let handle = tokio::spawn(mock_outgoing(
        Box::new(proxy_client) as Box<dyn rewind_core::net::ByteStream>,
        store as Arc<dyn rewind_core::store::MockStore>,
        shutdown,
        SessionOptions::new(),
        &Epoch,
    ));

    connect_replayed(&mut client).await;

    client.write_all(&frame_raw(0, b"\x03BEGIN")).await.unwrap();

    let (seq, payload) = read_frame(&mut client).await;
    assert_eq!(seq, 1);
    assert_eq!(payload, b"\x00\x00\x00\x02\x00\x00\x00");

    client.write_all(&frame_raw(0, b"\x01")).await.unwrap();
    drop(client);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn replays_a_recorded_result_set_and_consumes_the_mock() {
    let (mut client, proxy_client) = tokio::io::duplex(1 << 16);
    let (_signal, shutdown) = Shutdown::new();

    let store = seeded_store();
    let observer = Arc::clone(&store);

    let handle = tokio::spawn(mock_outgoing(
        Box::new(proxy_client) as Box<dyn rewind_core::net::ByteStream>,
        store as Arc<dyn rewind_core::store::MockStore>,
        shutdown,
        SessionOptions::new(),
        &Epoch,
    ));

    connect_replayed(&mut client).await;

    client
        .write_all(&frame_raw(0, b"\x03SELECT 1"))
        .await
        .unwrap();

    // column count (seq = request + 1), column def, row, OK-EOF terminator
    let (seq, payload) = read_frame(&mut client).await;
    assert_eq!(seq, 1);
    assert_eq!(payload, b"\x01");

    let (_, _column_def) = read_frame(&mut client).await;
    let (_, row) = read_frame(&mut client).await;
    assert_eq!(row, b"\x011");
    let (seq, terminator) = read_frame(&mut client).await;
    assert_eq!(seq, 4);
    assert_eq!(terminator[0], 0xFE);

    // the data mock is now consumed; only the config mock remains visible
    assert_eq!(observer.get_unfiltered_mocks().len(), 1);

    drop(client);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn decode_context_round_trips_statements_through_replayed_prepares() {
    // unit-style check kept next to the pipeline tests: replay fills the
    // statement table from stored prepare responses
    let ctx = DecodeContext::new(Mode::Replay);

    ctx.store_statement(rewind_core::mysql::PreparedStatement {
        statement_id: 1,
        num_params: 1,
        num_columns: 2,
        param_defs: vec![column("?", TypeId::INT)],
        column_defs: vec![column("a", TypeId::INT), column("b", TypeId::VAR_STRING)],
    });

    assert_eq!(ctx.statement(1).unwrap().num_columns, 2);
    ctx.remove_statement(1);
    assert_eq!(ctx.statement_count(), 0);
}
