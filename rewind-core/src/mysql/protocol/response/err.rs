use byteorder::LittleEndian;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::protocol::{Capabilities, Decode, Encode};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_basic_err_packet.html
// https://mariadb.com/kb/en/err_packet/
#[derive(Debug, Clone, PartialEq)]
pub struct ErrPacket {
    pub error_code: u16,

    /// Five characters after the `#` marker; absent pre-4.1.
    pub sql_state: Option<Box<str>>,

    pub error_message: Box<str>,
}

impl Decode for ErrPacket {
    fn decode_with(mut buf: &[u8], _: Capabilities) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0xFF {
            return Err(err_protocol!(
                "expected ERR (0xFF); received 0x{:02X}",
                header
            ));
        }

        let error_code = buf.get_u16::<LittleEndian>()?;

        let sql_state = if buf.first() == Some(&b'#') {
            buf.advance(1)?;
            Some(buf.get_str(5)?.into())
        } else {
            None
        };

        let error_message = buf.get_str(buf.len())?.into();

        Ok(Self {
            error_code,
            sql_state,
            error_message,
        })
    }
}

impl Encode for ErrPacket {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0xFF);
        buf.put_u16::<LittleEndian>(self.error_code);

        if let Some(state) = &self.sql_state {
            buf.put_u8(b'#');
            buf.put_str(state);
        }

        buf.put_str(&self.error_message);
    }
}
