use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::protocol::{Capabilities, Decode, Encode};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_prepare.html
#[derive(Debug, Clone, PartialEq)]
pub struct ComStmtPrepare {
    pub query: Box<str>,
}

impl Decode for ComStmtPrepare {
    fn decode_with(mut buf: &[u8], _: Capabilities) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0x16 {
            return Err(err_protocol!(
                "expected COM_STMT_PREPARE (0x16); received 0x{:02X}",
                header
            ));
        }

        Ok(Self {
            query: buf.get_str(buf.len())?.into(),
        })
    }
}

impl Encode for ComStmtPrepare {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0x16);
        buf.put_str(&self.query);
    }
}
