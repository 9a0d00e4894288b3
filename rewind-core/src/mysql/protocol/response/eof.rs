use byteorder::LittleEndian;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::protocol::{Capabilities, Decode, Encode, Status};

/// Legacy result-set separator/terminator. Not sent by servers once
/// `CLIENT_DEPRECATE_EOF` is negotiated; an OK packet with the 0xFE header
/// takes its place.
// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_basic_eof_packet.html
// https://mariadb.com/kb/en/eof_packet/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EofPacket {
    pub warnings: u16,
    pub status: Status,
}

impl Decode for EofPacket {
    fn decode_with(mut buf: &[u8], _: Capabilities) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0xFE {
            return Err(err_protocol!(
                "expected EOF (0xFE); received 0x{:02X}",
                header
            ));
        }

        let warnings = buf.get_u16::<LittleEndian>()?;
        let status = Status::from_bits_truncate(buf.get_u16::<LittleEndian>()?);

        Ok(Self { warnings, status })
    }
}

impl Encode for EofPacket {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0xFE);
        buf.put_u16::<LittleEndian>(self.warnings);
        buf.put_u16::<LittleEndian>(self.status.bits());
    }
}
