//! The MongoDB replayer: terminates the client leg and answers from the
//! store, regenerating SCRAM packets where a recorded transcript cannot
//! bind the live conversation.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::mock::{Mock, MockKind, WireMessage};
use crate::mongo::protocol::{read_message, write_message, Message};
use crate::mongo::scram;
use crate::net::{write_all, ByteStream, Shutdown, StreamId};
use crate::options::SessionOptions;
use crate::store::MockStore;

static NEXT_REPLY_ID: AtomicI32 = AtomicI32::new(1000);

/// Replay one MongoDB connection from the store until the client closes.
pub async fn mock_outgoing(
    mut client: Box<dyn ByteStream>,
    store: Arc<dyn MockStore>,
    mut shutdown: Shutdown,
    opts: SessionOptions,
    _clock: &dyn crate::mock::Clock,
) -> Result<()> {
    let client_id = StreamId::next();
    let mut minted = Vec::new();

    let result = replay_loop(
        &mut client,
        &store,
        &mut shutdown,
        &opts,
        &mut minted,
        client_id,
    )
    .await;

    // auth-message entries die with the connection
    scram::drop_conversations(&minted);

    result
}

async fn replay_loop(
    client: &mut Box<dyn ByteStream>,
    store: &Arc<dyn MockStore>,
    shutdown: &mut Shutdown,
    opts: &SessionOptions,
    minted: &mut Vec<i32>,
    client_id: StreamId,
) -> Result<()> {
    loop {
        let (header, payload) = match read_message(client, shutdown).await {
            Ok(message) => message,
            Err(Error::Closed) => break,
            Err(err) if err.is_eof() => break,
            Err(err) => return Err(err),
        };

        let live = Message::decode(&header, &payload)?;
        trace!(op = live.type_tag(), command = ?live.command_name(), "request");

        let fire_and_forget = matches!(&live, Message::OpMsg(msg) if msg.more_to_come());

        let responses: Vec<Message> = match live.command_name() {
            Some("saslStart") => {
                vec![rewrite_sasl_start(&live, store, minted)?]
            }

            Some("saslContinue") => {
                vec![rewrite_sasl_continue(&live, store, opts)?]
            }

            _ => {
                let candidates = store.get_unfiltered_mocks();

                match match_message(&live, &candidates) {
                    Some(mock) => {
                        // config mocks answer every connection; data mocks
                        // are consumed
                        if !mock.is_config() {
                            store.update_unfiltered_mock(&mock, (*mock).clone());
                        }

                        mock.responses
                            .iter()
                            .filter_map(|response| match &response.bundle.message {
                                WireMessage::Mongo(message) => Some(message.clone()),
                                #[allow(unreachable_patterns)]
                                _ => None,
                            })
                            .collect()
                    }

                    None if fire_and_forget => Vec::new(),

                    None => {
                        warn!(
                            op = live.type_tag(),
                            command = ?live.command_name(),
                            "no mock matched; closing the connection"
                        );
                        break;
                    }
                }
            }
        };

        if fire_and_forget {
            continue;
        }

        for message in &responses {
            send(client, message, header.request_id, shutdown).await?;
        }
    }

    debug!(id = client_id.as_u64(), "replay finished");

    Ok(())
}

/// Best candidate for one live request: same opcode, heartbeats against
/// config mocks and everything else against data mocks, equal body
/// documents winning outright and equal command names scoring above bare
/// opcode matches. Insertion order breaks ties.
fn match_message(live: &Message, candidates: &[Arc<Mock>]) -> Option<Arc<Mock>> {
    let live_heartbeat = live.is_heartbeat();
    let mut best: Option<(u32, &Arc<Mock>)> = None;

    for mock in candidates {
        if mock.kind != MockKind::Mongo || mock.is_config() != live_heartbeat {
            continue;
        }

        let Some(request) = mock.requests.first() else {
            continue;
        };

        let recorded = match &request.bundle.message {
            WireMessage::Mongo(message) => message,
            #[allow(unreachable_patterns)]
            _ => continue,
        };

        if recorded.op_code() != live.op_code() {
            continue;
        }

        if live.body_doc().is_some() && live.body_doc() == recorded.body_doc() {
            return Some(Arc::clone(mock));
        }

        let mut score = 1;
        if live.command_name().is_some() && live.command_name() == recorded.command_name() {
            score += 2;
        }

        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, mock));
        }
    }

    best.map(|(_, mock)| Arc::clone(mock))
}

fn rewrite_sasl_start(
    live: &Message,
    store: &Arc<dyn MockStore>,
    minted: &mut Vec<i32>,
) -> Result<Message> {
    let live_doc = live
        .body_doc()
        .ok_or_else(|| err_protocol!("saslStart without a body document"))?;

    let mechanism = live_doc
        .get_str("mechanism")
        .map_err(|_| err_protocol!("saslStart without a mechanism"))?
        .to_owned();

    let (mock, recorded_request, recorded_response) =
        find_sasl_exchange(store, "saslStart", Some(&mechanism))?;

    let live_payload = payload_text(live_doc)?;
    let recorded_payload = payload_text(
        recorded_request
            .body_doc()
            .ok_or_else(|| err_protocol!("recorded saslStart without a body"))?,
    )?;

    let response_doc = recorded_response
        .body_doc()
        .ok_or_else(|| err_protocol!("recorded saslStart response without a body"))?;
    let recorded_server_first = payload_text(response_doc)?;

    let rewritten = scram::rewrite_server_first(
        &live_payload,
        &recorded_payload,
        &recorded_server_first,
        &mechanism,
    )?;
    minted.push(rewritten.conversation_id);

    store.update_unfiltered_mock(&mock, (*mock).clone());

    let mut doc = response_doc.clone();
    set_payload_like(&mut doc, response_doc, &rewritten.payload);
    doc.insert("conversationId", Bson::Int32(rewritten.conversation_id));

    Ok(recorded_response.with_body_doc(doc))
}

fn rewrite_sasl_continue(
    live: &Message,
    store: &Arc<dyn MockStore>,
    opts: &SessionOptions,
) -> Result<Message> {
    let live_doc = live
        .body_doc()
        .ok_or_else(|| err_protocol!("saslContinue without a body document"))?;

    let conversation_id = live_doc
        .get_i32("conversationId")
        .map_err(|_| err_protocol!("saslContinue without a conversationId"))?;

    let password = opts.get_password().ok_or_else(|| {
        Error::UnsupportedFeature("SCRAM replay without a configured password".into())
    })?;

    let (mock, _, recorded_response) = find_sasl_exchange(store, "saslContinue", None)?;

    let response_doc = recorded_response
        .body_doc()
        .ok_or_else(|| err_protocol!("recorded saslContinue response without a body"))?;

    // the final server message of the exchange carries the proof; an empty
    // payload (done: true round) passes through untouched
    let recorded_final = payload_text(response_doc).unwrap_or_default();
    let rewritten = if recorded_final.contains("v=") {
        scram::rewrite_server_final(conversation_id, password, &recorded_final)?
    } else {
        recorded_final
    };

    store.update_unfiltered_mock(&mock, (*mock).clone());

    let mut doc = response_doc.clone();
    set_payload_like(&mut doc, response_doc, &rewritten);
    doc.insert("conversationId", Bson::Int32(conversation_id));

    Ok(recorded_response.with_body_doc(doc))
}

/// Locate the recorded exchange for one SASL step, optionally pinned to a
/// mechanism.
fn find_sasl_exchange(
    store: &Arc<dyn MockStore>,
    command: &str,
    mechanism: Option<&str>,
) -> Result<(Arc<Mock>, Message, Message)> {
    for mock in store.get_unfiltered_mocks() {
        if mock.kind != MockKind::Mongo {
            continue;
        }

        let (Some(request), Some(response)) = (mock.requests.first(), mock.responses.first())
        else {
            continue;
        };

        let recorded_request = match &request.bundle.message {
            WireMessage::Mongo(message) => message,
            #[allow(unreachable_patterns)]
            _ => continue,
        };
        let recorded_response = match &response.bundle.message {
            WireMessage::Mongo(message) => message,
            #[allow(unreachable_patterns)]
            _ => continue,
        };

        if recorded_request.command_name() != Some(command) {
            continue;
        }

        if let Some(mechanism) = mechanism {
            let recorded_mechanism = recorded_request
                .body_doc()
                .and_then(|doc| doc.get_str("mechanism").ok());

            if recorded_mechanism != Some(mechanism) {
                continue;
            }
        }

        return Ok((
            Arc::clone(&mock),
            recorded_request.clone(),
            recorded_response.clone(),
        ));
    }

    Err(Error::NoMockMatched(
        format!("no recorded {command} exchange").into(),
    ))
}

/// The SCRAM payload as text, whether it was captured as BinData or string.
fn payload_text(doc: &Document) -> Result<String> {
    match doc.get("payload") {
        Some(Bson::Binary(binary)) => String::from_utf8(binary.bytes.clone())
            .map_err(|_| err_protocol!("SASL payload is not valid UTF-8")),

        Some(Bson::String(payload)) => Ok(payload.clone()),

        _ => Err(err_protocol!("document carries no SASL payload")),
    }
}

/// Write `text` back into `payload`, keeping the BSON type the recording
/// used.
fn set_payload_like(doc: &mut Document, original: &Document, text: &str) {
    let value = match original.get("payload") {
        Some(Bson::String(_)) => Bson::String(text.to_owned()),

        _ => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: text.as_bytes().to_vec(),
        }),
    };

    doc.insert("payload", value);
}

async fn send(
    client: &mut Box<dyn ByteStream>,
    message: &Message,
    response_to: i32,
    shutdown: &mut Shutdown,
) -> Result<()> {
    let payload = message.encode()?;

    let mut out = Vec::with_capacity(16 + payload.len());
    write_message(
        &mut out,
        NEXT_REPLY_ID.fetch_add(1, Ordering::Relaxed),
        response_to,
        message.op_code(),
        &payload,
    );

    write_all(client, &out, shutdown).await
}
