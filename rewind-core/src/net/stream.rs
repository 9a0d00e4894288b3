use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::net::Shutdown;

/// One endpoint of an intercepted connection.
///
/// The core only ever reads, writes, and closes; interception itself (socket
/// redirection, kernel attach) happens outside and hands the two legs in as
/// `Box<dyn ByteStream>`.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {
    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }
}

impl ByteStream for TcpStream {
    fn remote_addr(&self) -> Option<SocketAddr> {
        self.peer_addr().ok()
    }
}

// In-memory pipes stand in for sockets under test.
impl ByteStream for tokio::io::DuplexStream {}

impl ByteStream for Box<dyn ByteStream> {
    fn remote_addr(&self) -> Option<SocketAddr> {
        (**self).remote_addr()
    }
}

/// Opaque identity of one client connection.
///
/// Decode-context maps are keyed by this rather than by the stream object so
/// that an SSL upgrade (which replaces the stream) can re-key entries onto a
/// fresh id without dangling references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

impl StreamId {
    pub fn next() -> Self {
        StreamId(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Write a full buffer, racing the shutdown token. A write that already
/// failed keeps its I/O error; [`Error::Closed`] is reported only when the
/// token won with no prior wire error.
pub(crate) async fn write_all<S>(dst: &mut S, bytes: &[u8], shutdown: &mut Shutdown) -> Result<()>
where
    S: AsyncWrite + Unpin + Send,
{
    tokio::select! {
        biased;

        res = dst.write_all(bytes) => {
            res?;
            Ok(())
        }

        _ = shutdown.recv() => Err(Error::Closed),
    }
}
