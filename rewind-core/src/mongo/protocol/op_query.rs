use std::io::Cursor;

use bson::Document;
use byteorder::LittleEndian;

use crate::error::Result;
use crate::io::{Buf, BufMut};

/// The legacy query message, still used by drivers for the very first
/// handshake on a connection.
// https://www.mongodb.com/docs/manual/legacy-opcodes/#op_query
#[derive(Debug, Clone, PartialEq)]
pub struct OpQuery {
    pub flags: i32,
    pub full_collection_name: String,
    pub number_to_skip: i32,
    pub number_to_return: i32,
    pub query: Document,
    pub return_fields_selector: Option<Document>,
}

impl OpQuery {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;

        let flags = buf.get_i32::<LittleEndian>()?;
        let full_collection_name = buf.get_str_nul()?.to_owned();
        let number_to_skip = buf.get_i32::<LittleEndian>()?;
        let number_to_return = buf.get_i32::<LittleEndian>()?;

        let mut cursor = Cursor::new(buf);
        let query = Document::from_reader(&mut cursor)
            .map_err(|err| err_protocol!("malformed OP_QUERY document: {}", err))?;

        let remaining = &buf[cursor.position() as usize..];
        let return_fields_selector = if remaining.is_empty() {
            None
        } else {
            Some(
                Document::from_reader(&mut Cursor::new(remaining))
                    .map_err(|err| err_protocol!("malformed OP_QUERY selector: {}", err))?,
            )
        };

        Ok(Self {
            flags,
            full_collection_name,
            number_to_skip,
            number_to_return,
            query,
            return_fields_selector,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        out.put_i32::<LittleEndian>(self.flags);
        out.put_str_nul(&self.full_collection_name);
        out.put_i32::<LittleEndian>(self.number_to_skip);
        out.put_i32::<LittleEndian>(self.number_to_return);

        self.query
            .to_writer(&mut out)
            .map_err(|err| err_protocol!("cannot serialize OP_QUERY document: {}", err))?;

        if let Some(selector) = &self.return_fields_selector {
            selector
                .to_writer(&mut out)
                .map_err(|err| err_protocol!("cannot serialize OP_QUERY selector: {}", err))?;
        }

        Ok(out)
    }
}
