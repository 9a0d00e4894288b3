use byteorder::LittleEndian;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::protocol::{Capabilities, Decode, Encode};

/// Deallocates a prepared statement. The server sends no response.
// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_close.html
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComStmtClose {
    pub statement_id: u32,
}

impl Decode for ComStmtClose {
    fn decode_with(mut buf: &[u8], _: Capabilities) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0x19 {
            return Err(err_protocol!(
                "expected COM_STMT_CLOSE (0x19); received 0x{:02X}",
                header
            ));
        }

        Ok(Self {
            statement_id: buf.get_u32::<LittleEndian>()?,
        })
    }
}

impl Encode for ComStmtClose {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0x19);
        buf.put_u32::<LittleEndian>(self.statement_id);
    }
}
