use byteorder::LittleEndian;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::protocol::{Capabilities, Decode, Encode};

/// Resets a prepared statement's accumulated long data. Answered OK or ERR.
// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_reset.html
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComStmtReset {
    pub statement_id: u32,
}

impl Decode for ComStmtReset {
    fn decode_with(mut buf: &[u8], _: Capabilities) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0x1A {
            return Err(err_protocol!(
                "expected COM_STMT_RESET (0x1A); received 0x{:02X}",
                header
            ));
        }

        Ok(Self {
            statement_id: buf.get_u32::<LittleEndian>()?,
        })
    }
}

impl Encode for ComStmtReset {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0x1A);
        buf.put_u32::<LittleEndian>(self.statement_id);
    }
}
