use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::net::Shutdown;

/// 3-byte payload length + 1-byte sequence id.
// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_basic_packets.html
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub length: u32,
    pub seq: u8,
}

/// One framed MySQL packet. `payload.len()` always equals `header.length`.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(seq: u8, payload: Bytes) -> Self {
        Packet {
            header: PacketHeader {
                length: payload.len() as u32,
                seq,
            },
            payload,
        }
    }

    /// Pure parse of one framed packet.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(err_protocol!("packet shorter than its 4-byte header"));
        }

        let length = LittleEndian::read_u24(buf) as usize;
        let seq = buf[3];

        if buf.len() - 4 != length {
            return Err(err_protocol!(
                "packet length field says {} but {} payload bytes are present",
                length,
                buf.len() - 4
            ));
        }

        Ok(Packet::new(seq, Bytes::copy_from_slice(&buf[4..])))
    }

    /// Header + payload, ready for the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.payload.len());
        write_packet(&mut buf, self.header.seq, &self.payload);

        buf
    }

    pub fn first_byte(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// OK packets open with 0x00 and carry at least the status/warning words.
    pub fn is_ok_packet(&self) -> bool {
        self.first_byte() == Some(0x00) && self.payload.len() >= 7
    }

    pub fn is_err_packet(&self) -> bool {
        self.first_byte() == Some(0xFF)
    }

    /// Legacy EOF: 0xFE with a 5-byte payload.
    pub fn is_eof_packet(&self) -> bool {
        self.first_byte() == Some(0xFE) && self.payload.len() == 5
    }

    /// OK packet wearing the 0xFE header, used as a result-set terminator
    /// when `CLIENT_DEPRECATE_EOF` is negotiated. The length guard keeps a
    /// row that merely begins with 0xFE from being taken for a terminator.
    pub fn is_ok_eof_packet(&self) -> bool {
        self.first_byte() == Some(0xFE) && self.payload.len() >= 7 && self.payload.len() < 0xFF_FF_FF
    }
}

/// Frame `payload` onto `buf` with the given sequence id.
pub fn write_packet(buf: &mut Vec<u8>, seq: u8, payload: &[u8]) {
    let mut header = [0u8; 4];
    LittleEndian::write_u24(&mut header, payload.len() as u32);
    header[3] = seq;

    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);
}

/// Read exactly one packet, or fail.
///
/// Fails with `UnexpectedEof` when the stream ends mid-frame and never
/// yields a partial packet. The read races the shutdown token; a fired token
/// surfaces as [`Error::Closed`] only when no wire error came first.
pub async fn read_packet<S>(stream: &mut S, shutdown: &mut Shutdown) -> Result<Packet>
where
    S: AsyncRead + Unpin + Send,
{
    let mut header = [0u8; 4];
    read_exact(stream, &mut header, shutdown).await?;

    let length = LittleEndian::read_u24(&header) as usize;
    let seq = header[3];

    let mut payload = vec![0u8; length];
    read_exact(stream, &mut payload, shutdown).await.map_err(|err| {
        if matches!(&err, Error::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof) {
            Error::short_read(length, 0)
        } else {
            err
        }
    })?;

    Ok(Packet::new(seq, Bytes::from(payload)))
}

async fn read_exact<S>(stream: &mut S, buf: &mut [u8], shutdown: &mut Shutdown) -> Result<()>
where
    S: AsyncRead + Unpin + Send,
{
    tokio::select! {
        biased;

        res = stream.read_exact(buf) => {
            res?;
            Ok(())
        }

        _ = shutdown.recv() => Err(Error::Closed),
    }
}
