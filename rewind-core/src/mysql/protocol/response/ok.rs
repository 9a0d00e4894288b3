use byteorder::LittleEndian;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::io::{BufExt, BufMutExt};
use crate::mysql::protocol::{Capabilities, Decode, Encode, Status};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_basic_ok_packet.html
// https://mariadb.com/kb/en/ok_packet/
#[derive(Debug, Clone, PartialEq)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status: Status,
    pub warnings: u16,
    pub info: Box<str>,
}

impl OkPacket {
    /// The minimal OK synthesized for unmocked control/DDL statements in
    /// replay: nothing affected, autocommit status, empty info.
    pub fn synthetic() -> Self {
        OkPacket {
            affected_rows: 0,
            last_insert_id: 0,
            status: Status::SERVER_STATUS_AUTOCOMMIT,
            warnings: 0,
            info: "".into(),
        }
    }
}

impl Decode for OkPacket {
    fn decode_with(mut buf: &[u8], _: Capabilities) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0x00 && header != 0xFE {
            return Err(err_protocol!(
                "expected OK (0x00 or 0xFE); received 0x{:02X}",
                header
            ));
        }

        let affected_rows = buf.get_uint_lenenc()?.unwrap_or(0);
        let last_insert_id = buf.get_uint_lenenc()?.unwrap_or(0);
        let status = Status::from_bits_truncate(buf.get_u16::<LittleEndian>()?);
        let warnings = buf.get_u16::<LittleEndian>()?;
        let info = buf.get_str(buf.len())?.into();

        Ok(Self {
            affected_rows,
            last_insert_id,
            status,
            warnings,
            info,
        })
    }
}

impl Encode for OkPacket {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0x00);
        buf.put_uint_lenenc(self.affected_rows);
        buf.put_uint_lenenc(self.last_insert_id);
        buf.put_u16::<LittleEndian>(self.status.bits());
        buf.put_u16::<LittleEndian>(self.warnings);
        buf.put_str(&self.info);
    }
}

#[cfg(test)]
mod tests {
    use super::{Decode, Encode, OkPacket, Status};

    const OK_HANDSHAKE: &[u8] = b"\x00\x00\x00\x02@\x00\x00";

    #[test]
    fn it_decodes_ok_handshake() {
        let p = OkPacket::decode(OK_HANDSHAKE).unwrap();

        assert_eq!(p.affected_rows, 0);
        assert_eq!(p.last_insert_id, 0);
        assert_eq!(p.warnings, 0);
        assert!(p.status.contains(Status::SERVER_STATUS_AUTOCOMMIT));
        assert!(p.status.contains(Status::SERVER_SESSION_STATE_CHANGED));
        assert!(p.info.is_empty());
    }

    #[test]
    fn it_round_trips() {
        let p = OkPacket::decode(OK_HANDSHAKE).unwrap();

        let mut buf = Vec::new();
        p.encode(&mut buf);

        assert_eq!(&buf[..], OK_HANDSHAKE);
    }

    #[test]
    fn synthetic_ok_is_seven_bytes_with_autocommit() {
        let mut buf = Vec::new();
        OkPacket::synthetic().encode(&mut buf);

        assert_eq!(buf, b"\x00\x00\x00\x02\x00\x00\x00");
    }
}
