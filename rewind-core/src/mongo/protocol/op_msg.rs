use std::io::Cursor;

use bson::Document;
use byteorder::{ByteOrder, LittleEndian};

use crate::error::Result;
use crate::io::{Buf, BufMut};

/// Checksum present.
pub const FLAG_CHECKSUM_PRESENT: u32 = 1 << 0;

/// Sender will not wait for a reply.
pub const FLAG_MORE_TO_COME: u32 = 1 << 1;

/// Receiver may reply with a moreToCome stream.
pub const FLAG_EXHAUST_ALLOWED: u32 = 1 << 16;

/// One section of an OP_MSG body.
#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    /// Kind 0: a single document.
    Body(Document),

    /// Kind 1: a size-prefixed, identifier-tagged document stream.
    DocumentSequence {
        identifier: String,
        documents: Vec<Document>,
    },
}

/// The modern command message.
// https://www.mongodb.com/docs/manual/reference/mongodb-wire-protocol/#op_msg
#[derive(Debug, Clone, PartialEq)]
pub struct OpMsg {
    pub flag_bits: u32,
    pub sections: Vec<Section>,
    pub checksum: Option<u32>,
}

impl OpMsg {
    /// The kind-0 body document, where the command itself lives.
    pub fn body(&self) -> Option<&Document> {
        self.sections.iter().find_map(|section| match section {
            Section::Body(doc) => Some(doc),
            Section::DocumentSequence { .. } => None,
        })
    }

    /// Replace the kind-0 body document (appending one if none exists).
    pub fn with_body(&self, doc: Document) -> OpMsg {
        let mut msg = self.clone();

        for section in &mut msg.sections {
            if let Section::Body(body) = section {
                *body = doc;
                return msg;
            }
        }

        msg.sections.push(Section::Body(doc));
        msg
    }

    pub fn more_to_come(&self) -> bool {
        self.flag_bits & FLAG_MORE_TO_COME != 0
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;

        let flag_bits = buf.get_u32::<LittleEndian>()?;

        let trailer = if flag_bits & FLAG_CHECKSUM_PRESENT != 0 {
            4
        } else {
            0
        };

        let mut sections = Vec::new();
        while buf.len() > trailer {
            let kind = buf.get_u8()?;

            match kind {
                0 => {
                    let doc = read_document_from(&mut buf)?;
                    sections.push(Section::Body(doc));
                }

                1 => {
                    let size = buf.get_i32::<LittleEndian>()? as usize;
                    if size < 4 {
                        return Err(err_protocol!("OP_MSG section size {} is invalid", size));
                    }

                    let mut section = buf.get_bytes(size - 4)?;
                    let identifier = section.get_str_nul()?.to_owned();

                    let mut documents = Vec::new();
                    while !section.is_empty() {
                        documents.push(read_document_from(&mut section)?);
                    }

                    sections.push(Section::DocumentSequence {
                        identifier,
                        documents,
                    });
                }

                kind => {
                    return Err(err_protocol!("unknown OP_MSG section kind {}", kind));
                }
            }
        }

        let checksum = if trailer > 0 {
            Some(buf.get_u32::<LittleEndian>()?)
        } else {
            None
        };

        Ok(Self {
            flag_bits,
            sections,
            checksum,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.put_u32::<LittleEndian>(self.flag_bits);

        for section in &self.sections {
            match section {
                Section::Body(doc) => {
                    out.put_u8(0);
                    doc.to_writer(&mut out)
                        .map_err(|err| err_protocol!("cannot serialize OP_MSG body: {}", err))?;
                }

                Section::DocumentSequence {
                    identifier,
                    documents,
                } => {
                    out.put_u8(1);

                    let mut section = Vec::new();
                    section.put_str_nul(identifier);
                    for doc in documents {
                        doc.to_writer(&mut section).map_err(|err| {
                            err_protocol!("cannot serialize OP_MSG sequence: {}", err)
                        })?;
                    }

                    out.put_i32::<LittleEndian>(section.len() as i32 + 4);
                    out.extend_from_slice(&section);
                }
            }
        }

        if let Some(checksum) = self.checksum {
            out.put_u32::<LittleEndian>(checksum);
        }

        Ok(out)
    }
}

/// Read one BSON document off the front of `buf`, advancing it.
pub(crate) fn read_document_from(buf: &mut &[u8]) -> Result<Document> {
    if buf.len() < 4 {
        return Err(err_protocol!("truncated BSON document length"));
    }

    let len = LittleEndian::read_i32(buf) as usize;
    if len < 5 || len > buf.len() {
        return Err(err_protocol!(
            "BSON document length {} exceeds the {} remaining bytes",
            len,
            buf.len()
        ));
    }

    let doc = Document::from_reader(&mut Cursor::new(&buf[..len]))
        .map_err(|err| err_protocol!("malformed BSON document: {}", err))?;
    buf.advance(len)?;

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::{OpMsg, Section, FLAG_MORE_TO_COME};

    #[test]
    fn body_round_trips() {
        let original = OpMsg {
            flag_bits: 0,
            sections: vec![Section::Body(doc! { "hello": 1, "$db": "admin" })],
            checksum: None,
        };

        let bytes = original.encode().unwrap();
        let decoded = OpMsg::decode(&bytes).unwrap();

        assert_eq!(decoded, original);
        assert_eq!(decoded.encode().unwrap(), bytes);
        assert_eq!(decoded.body().unwrap().get_str("$db").unwrap(), "admin");
    }

    #[test]
    fn document_sequences_round_trip() {
        let original = OpMsg {
            flag_bits: 0,
            sections: vec![
                Section::Body(doc! { "insert": "users", "$db": "shop" }),
                Section::DocumentSequence {
                    identifier: "documents".to_owned(),
                    documents: vec![doc! { "_id": 1 }, doc! { "_id": 2 }],
                },
            ],
            checksum: None,
        };

        let bytes = original.encode().unwrap();
        assert_eq!(OpMsg::decode(&bytes).unwrap(), original);
    }

    #[test]
    fn checksum_trailer_is_preserved() {
        let original = OpMsg {
            flag_bits: super::FLAG_CHECKSUM_PRESENT,
            sections: vec![Section::Body(doc! { "ping": 1 })],
            checksum: Some(0xDEAD_BEEF),
        };

        let bytes = original.encode().unwrap();
        let decoded = OpMsg::decode(&bytes).unwrap();

        assert_eq!(decoded.checksum, Some(0xDEAD_BEEF));
        assert_eq!(decoded, original);
    }

    #[test]
    fn more_to_come_flag_is_visible() {
        let msg = OpMsg {
            flag_bits: FLAG_MORE_TO_COME,
            sections: vec![Section::Body(doc! { "insert": "log" })],
            checksum: None,
        };

        assert!(msg.more_to_come());
    }

    #[test]
    fn replacing_the_body_keeps_other_sections() {
        let msg = OpMsg {
            flag_bits: 0,
            sections: vec![
                Section::DocumentSequence {
                    identifier: "documents".to_owned(),
                    documents: vec![doc! { "_id": 1 }],
                },
                Section::Body(doc! { "insert": "users" }),
            ],
            checksum: None,
        };

        let swapped = msg.with_body(doc! { "insert": "orders" });
        assert_eq!(
            swapped.body().unwrap().get_str("insert").unwrap(),
            "orders"
        );
        assert_eq!(swapped.sections.len(), 2);
    }

    #[test]
    fn truncated_sections_fail_cleanly() {
        let bytes = OpMsg {
            flag_bits: 0,
            sections: vec![Section::Body(doc! { "ping": 1 })],
            checksum: None,
        }
        .encode()
        .unwrap();

        for len in 5..bytes.len() {
            assert!(OpMsg::decode(&bytes[..len]).is_err());
        }
    }
}
