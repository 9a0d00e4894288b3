//! End-to-end recorder/replayer scenarios for the MongoDB engine.

use std::sync::Arc;
use std::time::SystemTime;

use bson::spec::BinarySubtype;
use bson::{doc, Binary, Bson};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

use rewind_core::mock::{build_mock, Mock, MockKind, PacketBundle, WireHeader, WireMessage};
use rewind_core::mongo::protocol::{
    write_message, Message, MessageHeader, OpMsg, Section, HEADER_LEN, OP_MSG,
};
use rewind_core::mongo::{mock_outgoing, record_outgoing};
use rewind_core::net::{Shutdown, StreamId};
use rewind_core::options::SessionOptions;
use rewind_core::store::InMemoryMockStore;

struct Epoch;

impl rewind_core::mock::Clock for Epoch {
    fn now(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH
    }
}

fn op_msg(doc: bson::Document) -> Message {
    Message::OpMsg(OpMsg {
        flag_bits: 0,
        sections: vec![Section::Body(doc)],
        checksum: None,
    })
}

fn message_bytes(message: &Message, request_id: i32, response_to: i32) -> Vec<u8> {
    let payload = message.encode().unwrap();
    let mut out = Vec::new();
    write_message(&mut out, request_id, response_to, message.op_code(), &payload);
    out
}

async fn read_message_bytes(stream: &mut DuplexStream) -> (MessageHeader, Vec<u8>) {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await.unwrap();

    let header = MessageHeader::from_bytes(&header).unwrap();
    let mut payload = vec![0u8; header.message_length as usize - HEADER_LEN];
    stream.read_exact(&mut payload).await.unwrap();

    (header, payload)
}

#[tokio::test]
async fn identical_heartbeats_are_recorded_once() {
    let (mut client, proxy_client) = tokio::io::duplex(1 << 16);
    let (proxy_upstream, mut upstream) = tokio::io::duplex(1 << 16);

    let (tx, mut rx) = mpsc::channel(32);
    let (_signal, shutdown) = Shutdown::new();

    let handle = tokio::spawn(record_outgoing(
        Box::new(proxy_client) as Box<dyn rewind_core::net::ByteStream>,
        Box::new(proxy_upstream) as Box<dyn rewind_core::net::ByteStream>,
        tx,
        shutdown,
        SessionOptions::new(),
        &Epoch,
    ));

    let hello = |app: &str| {
        op_msg(doc! {
            "hello": 1,
            "client": { "application": { "name": app } },
            "$db": "admin",
        })
    };
    let reply = op_msg(doc! { "isWritablePrimary": true, "maxWireVersion": 13, "ok": 1.0 });

    // two identical hellos, then a distinct one
    for (id, app) in [(1, "suite-a"), (2, "suite-a"), (3, "suite-b")] {
        client
            .write_all(&message_bytes(&hello(app), id, 0))
            .await
            .unwrap();
        let _ = read_message_bytes(&mut upstream).await;

        upstream
            .write_all(&message_bytes(&reply, 100 + id, id))
            .await
            .unwrap();
        let _ = read_message_bytes(&mut client).await;
    }

    // a data request records unconditionally
    let find = op_msg(doc! { "find": "users", "$db": "shop" });
    client
        .write_all(&message_bytes(&find, 4, 0))
        .await
        .unwrap();
    let _ = read_message_bytes(&mut upstream).await;
    upstream
        .write_all(&message_bytes(
            &op_msg(doc! { "cursor": { "firstBatch": [], "id": 0i64 }, "ok": 1.0 }),
            104,
            4,
        ))
        .await
        .unwrap();
    let _ = read_message_bytes(&mut client).await;

    drop(client);
    drop(upstream);
    handle.await.unwrap().unwrap();

    let mut mocks = Vec::new();
    while let Some(mock) = rx.recv().await {
        mocks.push(mock);
    }

    // dedup dropped the second identical hello
    assert_eq!(mocks.len(), 3);
    assert!(mocks[0].is_config());
    assert!(mocks[1].is_config());
    assert!(!mocks[2].is_config());
    assert_eq!(&*mocks[2].requests[0].operation, "OP_MSG:find");
}

fn bundle_of(message: Message, request_id: i32, response_to: i32) -> PacketBundle {
    let header = MessageHeader {
        message_length: 0,
        request_id,
        response_to,
        op_code: OP_MSG,
    };

    PacketBundle {
        header: WireHeader::Mongo(header),
        type_tag: message.type_tag(),
        message: WireMessage::Mongo(message),
    }
}

fn mongo_mock(config: bool, request: Message, response: Message) -> Mock {
    let conn = StreamId::next();

    let requests = vec![rewind_core::mock::Request {
        operation: request.type_tag().into(),
        bundle: bundle_of(request, 1, 0),
        connection: conn,
        at: SystemTime::UNIX_EPOCH,
    }];
    let responses = vec![rewind_core::mock::Response {
        operation: response.type_tag().into(),
        bundle: bundle_of(response, 2, 1),
        connection: conn,
        at: SystemTime::UNIX_EPOCH,
    }];

    build_mock(MockKind::Mongo, config, requests, responses, &Epoch)
}

fn binary_payload(text: &str) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Generic,
        bytes: text.as_bytes().to_vec(),
    })
}

#[tokio::test]
async fn replay_rewrites_scram_server_first_for_the_live_nonce() {
    let store = InMemoryMockStore::new();

    // recorded hello
    store.insert(mongo_mock(
        true,
        op_msg(doc! { "hello": 1, "$db": "admin" }),
        op_msg(doc! { "isWritablePrimary": true, "maxWireVersion": 13, "ok": 1.0 }),
    ));

    // recorded saslStart exchange: old client nonce OLDNONCE, server
    // extension EXT, salt and iteration count to be preserved
    store.insert(mongo_mock(
        false,
        op_msg(doc! {
            "saslStart": 1,
            "mechanism": "SCRAM-SHA-256",
            "payload": binary_payload("n,,n=admin,r=OLDNONCE"),
            "$db": "admin",
        }),
        op_msg(doc! {
            "conversationId": 99,
            "done": false,
            "payload": binary_payload("r=OLDNONCEEXT,s=c2FsdHNhbHQ=,i=4096"),
            "ok": 1.0,
        }),
    ));

    let (mut client, proxy_client) = tokio::io::duplex(1 << 16);
    let (_signal, shutdown) = Shutdown::new();

    let handle = tokio::spawn(mock_outgoing(
        Box::new(proxy_client) as Box<dyn rewind_core::net::ByteStream>,
        Arc::new(store) as Arc<dyn rewind_core::store::MockStore>,
        shutdown,
        SessionOptions::new().password("hunter2"),
        &Epoch,
    ));

    // heartbeat answered from the config mock
    client
        .write_all(&message_bytes(
            &op_msg(doc! { "hello": 1, "$db": "admin" }),
            1,
            0,
        ))
        .await
        .unwrap();

    let (header, payload) = read_message_bytes(&mut client).await;
    assert_eq!(header.response_to, 1);
    let reply = Message::decode(&header, &payload).unwrap();
    assert_eq!(
        reply.body_doc().unwrap().get_f64("ok").unwrap(),
        1.0
    );

    // saslStart with a fresh nonce
    client
        .write_all(&message_bytes(
            &op_msg(doc! {
                "saslStart": 1,
                "mechanism": "SCRAM-SHA-256",
                "payload": binary_payload("n,,n=admin,r=ABCD"),
                "$db": "admin",
            }),
            2,
            0,
        ))
        .await
        .unwrap();

    let (header, payload) = read_message_bytes(&mut client).await;
    assert_eq!(header.response_to, 2);

    let reply = Message::decode(&header, &payload).unwrap();
    let doc = reply.body_doc().unwrap();

    let server_first = match doc.get("payload") {
        Some(Bson::Binary(binary)) => String::from_utf8(binary.bytes.clone()).unwrap(),
        other => panic!("unexpected payload shape: {other:?}"),
    };

    // live client nonce prefixes the combined nonce; salt and iteration
    // count are untouched; the conversation id is freshly minted
    assert!(server_first.starts_with("r=ABCDEXT,"));
    assert!(server_first.contains("s=c2FsdHNhbHQ="));
    assert!(server_first.ends_with("i=4096"));
    assert_ne!(doc.get_i32("conversationId").unwrap(), 99);

    drop(client);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn replay_misses_close_the_connection() {
    let store = InMemoryMockStore::new();
    store.insert(mongo_mock(
        true,
        op_msg(doc! { "hello": 1, "$db": "admin" }),
        op_msg(doc! { "ok": 1.0 }),
    ));

    let (mut client, proxy_client) = tokio::io::duplex(1 << 16);
    let (_signal, shutdown) = Shutdown::new();

    let handle = tokio::spawn(mock_outgoing(
        Box::new(proxy_client) as Box<dyn rewind_core::net::ByteStream>,
        Arc::new(store) as Arc<dyn rewind_core::store::MockStore>,
        shutdown,
        SessionOptions::new(),
        &Epoch,
    ));

    client
        .write_all(&message_bytes(
            &op_msg(doc! { "find": "users", "$db": "shop" }),
            1,
            0,
        ))
        .await
        .unwrap();

    // the replayer closes without writing anything back
    let mut buf = [0u8; 1];
    assert_eq!(client.read(&mut buf).await.unwrap(), 0);

    handle.await.unwrap().unwrap();
}
