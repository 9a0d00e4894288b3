use bytes::Bytes;

use crate::error::Result;
use crate::io::Buf;
use crate::mysql::io::BufExt;
use crate::mysql::protocol::{Capabilities, Encode};

/// One row of a text result set: a length-encoded string per column, with
/// 0xFB marking NULL. The raw payload is kept so replay is byte-exact.
// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_query_response_text_resultset_row.html
#[derive(Debug, Clone, PartialEq)]
pub struct TextRow {
    pub raw: Bytes,
    pub values: Vec<Option<Bytes>>,
}

impl TextRow {
    pub fn decode(payload: &[u8], columns: usize) -> Result<Self> {
        let mut buf = payload;
        let mut values = Vec::with_capacity(columns);

        for _ in 0..columns {
            if buf.first() == Some(&0xFB) {
                buf.advance(1)?;
                values.push(None);
                continue;
            }

            let len = buf
                .get_uint_lenenc()?
                .ok_or_else(|| err_protocol!("truncated length in text row cell"))?;

            values.push(Some(Bytes::copy_from_slice(buf.get_bytes(len as usize)?)));
        }

        if !buf.is_empty() {
            return Err(err_protocol!(
                "{} trailing bytes after {} text row cells",
                buf.len(),
                columns
            ));
        }

        Ok(Self {
            raw: Bytes::copy_from_slice(payload),
            values,
        })
    }
}

impl Encode for TextRow {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.extend_from_slice(&self.raw);
    }
}
