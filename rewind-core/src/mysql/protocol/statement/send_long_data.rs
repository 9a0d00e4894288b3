use byteorder::LittleEndian;
use bytes::Bytes;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::protocol::{Capabilities, Decode, Encode};

/// Streams a chunk of one parameter ahead of `COM_STMT_EXECUTE`. The server
/// sends no response.
// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_send_long_data.html
#[derive(Debug, Clone, PartialEq)]
pub struct ComStmtSendLongData {
    pub statement_id: u32,
    pub param_id: u16,
    pub data: Bytes,
}

impl Decode for ComStmtSendLongData {
    fn decode_with(mut buf: &[u8], _: Capabilities) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0x18 {
            return Err(err_protocol!(
                "expected COM_STMT_SEND_LONG_DATA (0x18); received 0x{:02X}",
                header
            ));
        }

        let statement_id = buf.get_u32::<LittleEndian>()?;
        let param_id = buf.get_u16::<LittleEndian>()?;
        let data = Bytes::copy_from_slice(buf);

        Ok(Self {
            statement_id,
            param_id,
            data,
        })
    }
}

impl Encode for ComStmtSendLongData {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0x18);
        buf.put_u32::<LittleEndian>(self.statement_id);
        buf.put_u16::<LittleEndian>(self.param_id);
        buf.put_bytes(&self.data);
    }
}
