//! The MySQL protocol engine: wire codecs, per-connection decode context,
//! and the record/replay pipelines.

pub mod context;
pub mod io;
pub mod protocol;

mod connection;
mod matcher;
mod record;
mod replay;

pub use context::{DecodeContext, Mode, PreparedStatement};
pub use matcher::{match_command, MatchOutcome};
pub use record::record_outgoing;
pub use replay::mock_outgoing;

use byteorder::{ByteOrder, LittleEndian};
use futures_core::future::BoxFuture;
use std::sync::Arc;
use tokio::io::AsyncWrite;

use crate::error::Result;
use crate::integration::Integration;
use crate::mock::{Clock, PacketBundle, Request, Response, SystemClock, WireHeader, WireMessage};
use crate::mysql::protocol::{Message, Packet, PacketHeader};
use crate::net::{ByteStream, Shutdown, StreamId};
use crate::options::SessionOptions;
use crate::store::{MockSink, MockStore};

/// The MySQL integration, registered under `"mysql"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl MySql {
    /// Framing-based identification: a buffer is one MySQL packet when its
    /// 3-byte little-endian length field accounts for exactly the bytes
    /// present. (The server speaks first in this protocol, so the probed
    /// bytes are its greeting.)
    pub fn match_type(buf: &[u8]) -> bool {
        if buf.len() < 5 {
            return false;
        }

        LittleEndian::read_u24(buf) as usize + 4 == buf.len()
    }
}

impl Integration for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn match_type(&self, buf: &[u8]) -> bool {
        MySql::match_type(buf)
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

pub(crate) fn mysql_bundle(header: PacketHeader, message: Message) -> PacketBundle {
    PacketBundle {
        header: WireHeader::MySql(header),
        type_tag: message.type_tag(),
        message: WireMessage::MySql(message),
    }
}

pub(crate) fn mysql_request(
    header: PacketHeader,
    message: Message,
    connection: StreamId,
    clock: &dyn Clock,
) -> Request {
    let bundle = mysql_bundle(header, message);

    Request {
        operation: bundle.type_tag.into(),
        bundle,
        connection,
        at: clock.now(),
    }
}

pub(crate) fn mysql_response(
    header: PacketHeader,
    message: Message,
    connection: StreamId,
    clock: &dyn Clock,
) -> Response {
    let bundle = mysql_bundle(header, message);

    Response {
        operation: bundle.type_tag.into(),
        bundle,
        connection,
        at: clock.now(),
    }
}

/// Pass one packet through to the other leg, byte for byte.
pub(crate) async fn forward<S>(dst: &mut S, packet: &Packet, shutdown: &mut Shutdown) -> Result<()>
where
    S: AsyncWrite + Unpin + Send,
{
    crate::net::write_all(dst, &packet.to_bytes(), shutdown).await
}
