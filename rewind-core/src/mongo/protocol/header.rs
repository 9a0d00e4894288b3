use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::net::Shutdown;

pub const HEADER_LEN: usize = 16;

/// The 16-byte header every MongoDB message starts with. `message_length`
/// counts itself.
// https://www.mongodb.com/docs/manual/reference/mongodb-wire-protocol/#standard-message-header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: i32,
}

impl MessageHeader {
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(err_protocol!("message shorter than its 16-byte header"));
        }

        Ok(Self {
            message_length: LittleEndian::read_i32(buf),
            request_id: LittleEndian::read_i32(&buf[4..]),
            response_to: LittleEndian::read_i32(&buf[8..]),
            op_code: LittleEndian::read_i32(&buf[12..]),
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        let mut buf = [0u8; HEADER_LEN];
        LittleEndian::write_i32(&mut buf, self.message_length);
        LittleEndian::write_i32(&mut buf[4..], self.request_id);
        LittleEndian::write_i32(&mut buf[8..], self.response_to);
        LittleEndian::write_i32(&mut buf[12..], self.op_code);

        out.extend_from_slice(&buf);
    }
}

/// Read exactly one message, returning its header and body. Fails with
/// `UnexpectedEof` when the stream ends mid-message; never yields a partial
/// message.
pub async fn read_message<S>(
    stream: &mut S,
    shutdown: &mut Shutdown,
) -> Result<(MessageHeader, Bytes)>
where
    S: AsyncRead + Unpin + Send,
{
    let mut raw = [0u8; HEADER_LEN];
    read_exact(stream, &mut raw, shutdown).await?;

    let header = MessageHeader::from_bytes(&raw)?;

    let total = header.message_length as usize;
    if header.message_length < HEADER_LEN as i32 {
        return Err(err_protocol!(
            "message length {} is shorter than the header itself",
            header.message_length
        ));
    }

    let mut payload = vec![0u8; total - HEADER_LEN];
    read_exact(stream, &mut payload, shutdown)
        .await
        .map_err(|err| {
            if matches!(&err, Error::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof) {
                Error::short_read(total - HEADER_LEN, 0)
            } else {
                err
            }
        })?;

    Ok((header, Bytes::from(payload)))
}

/// Frame `payload` with a fresh header.
pub fn write_message(out: &mut Vec<u8>, request_id: i32, response_to: i32, op_code: i32, payload: &[u8]) {
    MessageHeader {
        message_length: (HEADER_LEN + payload.len()) as i32,
        request_id,
        response_to,
        op_code,
    }
    .write(out);

    out.extend_from_slice(payload);
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
