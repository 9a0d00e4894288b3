//! The MongoDB protocol engine: OP_MSG/OP_QUERY/OP_REPLY codecs, heartbeat
//! deduplication, and the SCRAM auth rewriter.

pub mod protocol;
pub mod scram;

mod record;
mod replay;

pub use record::record_outgoing;
pub use replay::mock_outgoing;

use byteorder::{ByteOrder, LittleEndian};
use futures_core::future::BoxFuture;
use std::sync::Arc;

use crate::error::Result;
use crate::integration::Integration;
use crate::mock::{Clock, PacketBundle, Request, Response, SystemClock, WireHeader, WireMessage};
use crate::mongo::protocol::{Message, MessageHeader, HEADER_LEN};
use crate::net::{ByteStream, Shutdown, StreamId};
use crate::options::SessionOptions;
use crate::store::{MockSink, MockStore};

/// The MongoDB integration, registered under `"mongo"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mongo;

impl Mongo {
    /// Framing-based identification: a buffer is one MongoDB message when
    /// its first four little-endian bytes equal the total length.
    pub fn match_type(buf: &[u8]) -> bool {
        if buf.len() < HEADER_LEN {
            return false;
        }

        LittleEndian::read_i32(buf) as usize == buf.len()
    }
}

impl Integration for Mongo {
    fn name(&self) -> &'static str {
        "mongo"
    }

    fn match_type(&self, buf: &[u8]) -> bool {
        Mongo::match_type(buf)
    }

    fn record_outgoing<'a>(
        &'a self,
        client: Box<dyn ByteStream>,
        upstream: Box<dyn ByteStream>,
        sink: MockSink,
        shutdown: Shutdown,
        opts: SessionOptions,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            record_outgoing(client, upstream, sink, shutdown, opts, &SystemClock).await
        })
    }

    fn mock_outgoing<'a>(
        &'a self,
        client: Box<dyn ByteStream>,
        store: Arc<dyn MockStore>,
        shutdown: Shutdown,
        opts: SessionOptions,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { mock_outgoing(client, store, shutdown, opts, &SystemClock).await })
    }
}

/// Operation label: the command name where one exists, the opcode tag
/// otherwise.
fn operation_of(message: &Message) -> Box<str> {
    match message.command_name() {
        Some(command) => format!("{}:{}", message.type_tag(), command).into(),
        None => message.type_tag().into(),
    }
}

pub(crate) fn mongo_bundle(header: MessageHeader, message: Message) -> PacketBundle {
    PacketBundle {
        header: WireHeader::Mongo(header),
        type_tag: message.type_tag(),
        message: WireMessage::Mongo(message),
    }
}

pub(crate) fn mongo_request(
    header: MessageHeader,
    message: Message,
    connection: StreamId,
    clock: &dyn Clock,
) -> Request {
    let operation = operation_of(&message);
    let bundle = mongo_bundle(header, message);

    Request {
        operation,
        bundle,
        connection,
        at: clock.now(),
    }
}

pub(crate) fn mongo_response(
    header: MessageHeader,
    message: Message,
    connection: StreamId,
    clock: &dyn Clock,
) -> Response {
    let operation = operation_of(&message);
    let bundle = mongo_bundle(header, message);

    Response {
        operation,
        bundle,
        connection,
        at: clock.now(),
    }
}
