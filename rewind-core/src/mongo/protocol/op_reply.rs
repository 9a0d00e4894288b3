use bson::Document;
use byteorder::LittleEndian;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mongo::protocol::op_msg::read_document_from;

/// The legacy reply, paired with OP_QUERY.
// https://www.mongodb.com/docs/manual/legacy-opcodes/#op_reply
#[derive(Debug, Clone, PartialEq)]
pub struct OpReply {
    pub response_flags: i32,
    pub cursor_id: i64,
    pub starting_from: i32,
    pub number_returned: i32,
    pub documents: Vec<Document>,
}

impl OpReply {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;

        let response_flags = buf.get_i32::<LittleEndian>()?;
        let cursor_id = buf.get_i64::<LittleEndian>()?;
        let starting_from = buf.get_i32::<LittleEndian>()?;
        let number_returned = buf.get_i32::<LittleEndian>()?;

        let mut documents = Vec::new();
        while !buf.is_empty() {
            documents.push(read_document_from(&mut buf)?);
        }

        Ok(Self {
            response_flags,
            cursor_id,
            starting_from,
            number_returned,
            documents,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        out.put_i32::<LittleEndian>(self.response_flags);
        out.put_u64::<LittleEndian>(self.cursor_id as u64);
        out.put_i32::<LittleEndian>(self.starting_from);
        out.put_i32::<LittleEndian>(self.number_returned);

        for doc in &self.documents {
            doc.to_writer(&mut out)
                .map_err(|err| err_protocol!("cannot serialize OP_REPLY document: {}", err))?;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::OpReply;

    #[test]
    fn it_round_trips() {
        let original = OpReply {
            response_flags: 8,
            cursor_id: 0,
            starting_from: 0,
            number_returned: 1,
            documents: vec![doc! { "ismaster": true, "maxWireVersion": 13, "ok": 1.0 }],
        };

        let bytes = original.encode().unwrap();
        let decoded = OpReply::decode(&bytes).unwrap();

        assert_eq!(decoded, original);
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn truncated_replies_fail_cleanly() {
        let bytes = OpReply {
            response_flags: 0,
            cursor_id: 0,
            starting_from: 0,
            number_returned: 1,
            documents: vec![doc! { "ok": 1.0 }],
        }
        .encode()
        .unwrap();

        assert!(OpReply::decode(&bytes[..10]).is_err());
        assert!(OpReply::decode(&bytes[..bytes.len() - 2]).is_err());
    }
}
