use byteorder::LittleEndian;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::protocol::{Capabilities, Decode, Encode};

/// The 32-byte prefix of a handshake response, sent when the client wants the
/// connection upgraded to TLS before it reveals credentials.
// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_ssl_request.html
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslRequest {
    pub capabilities: Capabilities,
    pub max_packet_size: u32,
    pub collation: u8,
}

impl Decode for SslRequest {
    fn decode_with(mut buf: &[u8], _: Capabilities) -> Result<Self> {
        let capabilities =
            Capabilities::from_bits_truncate(u64::from(buf.get_u32::<LittleEndian>()?));

        if !capabilities.contains(Capabilities::SSL) {
            return Err(err_protocol!(
                "SSLRequest without CLIENT_SSL in capabilities 0x{:X}",
                capabilities.bits()
            ));
        }

        let max_packet_size = buf.get_u32::<LittleEndian>()?;
        let collation = buf.get_u8()?;

        // reserved : string<23>
        buf.advance(23)?;

        Ok(Self {
            capabilities,
            max_packet_size,
            collation,
        })
    }
}

impl Encode for SslRequest {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u32::<LittleEndian>(self.capabilities.bits() as u32);
        buf.put_u32::<LittleEndian>(self.max_packet_size);
        buf.put_u8(self.collation);
        buf.advance(23);
    }
}

#[cfg(test)]
mod tests {
    use super::{Capabilities, Decode, Encode, SslRequest};

    #[test]
    fn it_round_trips() {
        let original = SslRequest {
            capabilities: Capabilities::PROTOCOL_41 | Capabilities::SSL,
            max_packet_size: 16_777_216,
            collation: 45,
        };

        let mut buf = Vec::new();
        original.encode(&mut buf);
        assert_eq!(buf.len(), 32);

        assert_eq!(SslRequest::decode(&buf).unwrap(), original);
    }
}
