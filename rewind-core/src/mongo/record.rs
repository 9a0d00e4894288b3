//! The MongoDB recorder: a bidirectional pump that decodes both directions
//! and emits one mock per request/response exchange, deduplicating the
//! heartbeat chatter drivers produce every few hundred milliseconds.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::mock::{build_mock, Clock, MockKind, Request, Response};
use crate::mongo::protocol::{read_message, write_message, Message, MessageHeader, HEADER_LEN};
use crate::mongo::scram::sha256;
use crate::mongo::{mongo_request, mongo_response, Mongo};
use crate::net::{write_all, ByteStream, Shutdown, StreamId};
use crate::options::SessionOptions;
use crate::store::MockSink;

/// Heartbeat exchanges already emitted, keyed by serialized request body.
/// Process-wide: every connection of a test run shares one mock set.
static HEARTBEAT_KEYS: Lazy<RwLock<HashSet<String>>> = Lazy::new(|| RwLock::new(HashSet::new()));

/// Dedup key for a heartbeat request: the serialized body document (the
/// OP_QUERY body map or the OP_MSG section-0 payload), with the operation
/// tag as the fallback. Structurally different but semantically equal hellos
/// hash apart and are recorded twice; that is acceptable here.
fn heartbeat_key(message: &Message) -> String {
    match message.body_doc() {
        Some(doc) => {
            let mut bytes = Vec::new();
            if doc.to_writer(&mut bytes).is_ok() {
                hex::encode(sha256(&bytes))
            } else {
                message.type_tag().to_owned()
            }
        }

        None => message.type_tag().to_owned(),
    }
}

/// Record one MongoDB connection until either side closes or the shutdown
/// token fires.
pub async fn record_outgoing(
    mut client: Box<dyn ByteStream>,
    mut upstream: Box<dyn ByteStream>,
    sink: MockSink,
    mut shutdown: Shutdown,
    _opts: SessionOptions,
    clock: &dyn Clock,
) -> Result<()> {
    let client_id = StreamId::next();

    // the initial client packet identifies the protocol: its reassembled
    // frame must satisfy MatchType before anything is interpreted
    let mut pending = match read_message(&mut client, &mut shutdown).await {
        Ok((header, payload)) => {
            let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
            header.write(&mut frame);
            frame.extend_from_slice(&payload);

            if !Mongo::match_type(&frame) {
                return Err(err_protocol!(
                    "initial client packet is not a MongoDB frame"
                ));
            }

            Some((header, payload))
        }
        Err(Error::Closed) => None,
        Err(err) if err.is_eof() => None,
        Err(err) => return Err(err),
    };

    while let Some((header, payload)) = pending.take() {
        forward(&mut upstream, &header, &payload, &mut shutdown).await?;

        let request = Message::decode(&header, &payload)?;
        trace!(op = request.type_tag(), command = ?request.command_name(), "request");

        let fire_and_forget = matches!(&request, Message::OpMsg(msg) if msg.more_to_come());

        let requests = vec![mongo_request(header, request.clone(), client_id, clock)];
        let mut responses: Vec<Response> = Vec::new();

        if !fire_and_forget {
            loop {
                let (reply_header, reply_payload) =
                    match read_message(&mut upstream, &mut shutdown).await {
                        Ok(message) => message,
                        Err(err) if err.is_eof() => {
                            warn!("upstream closed during a response");
                            return Ok(());
                        }
                        Err(err) => return Err(err),
                    };

                forward(&mut client, &reply_header, &reply_payload, &mut shutdown).await?;

                let reply = Message::decode(&reply_header, &reply_payload)?;
                let streaming = matches!(&reply, Message::OpMsg(msg) if msg.more_to_come());

                responses.push(mongo_response(reply_header, reply, client_id, clock));

                // exhaust-style responses keep coming until the flag drops
                if !streaming {
                    break;
                }
            }
        }

        emit(&sink, &request, requests, responses, clock).await?;

        pending = match read_message(&mut client, &mut shutdown).await {
            Ok(message) => Some(message),
            Err(Error::Closed) => None,
            Err(err) if err.is_eof() => None,
            Err(err) => return Err(err),
        };
    }

    debug!(id = client_id.as_u64(), "recording finished");

    Ok(())
}

async fn emit(
    sink: &MockSink,
    request: &Message,
    requests: Vec<Request>,
    responses: Vec<Response>,
    clock: &dyn Clock,
) -> Result<()> {
    let config = request.is_heartbeat();

    if config {
        let key = heartbeat_key(request);

        // first occurrence only; repeats are not emitted
        if !HEARTBEAT_KEYS.write().insert(key) {
            trace!("suppressing duplicate heartbeat");
            return Ok(());
        }
    }

    let mock = build_mock(MockKind::Mongo, config, requests, responses, clock);

    sink.send(mock).await.map_err(|_| Error::Closed)
}

async fn forward<S>(
    dst: &mut S,
    header: &MessageHeader,
    payload: &[u8],
    shutdown: &mut Shutdown,
) -> Result<()>
where
    S: tokio::io::AsyncWrite + Unpin + Send,
{
    let mut out = Vec::with_capacity(16 + payload.len());
    write_message(
        &mut out,
        header.request_id,
        header.response_to,
        header.op_code,
        payload,
    );

    write_all(dst, &out, shutdown).await
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::heartbeat_key;
    use crate::mongo::protocol::{Message, OpMsg, Section};

    #[test]
    fn heartbeat_keys_follow_the_body_document() {
        let hello = |app: &str| {
            Message::OpMsg(OpMsg {
                flag_bits: 0,
                sections: vec![Section::Body(doc! {
                    "hello": 1,
                    "client": { "application": { "name": app } },
                    "$db": "admin",
                })],
                checksum: None,
            })
        };

        assert_eq!(heartbeat_key(&hello("app")), heartbeat_key(&hello("app")));
        assert_ne!(heartbeat_key(&hello("app")), heartbeat_key(&hello("other")));
    }
}
