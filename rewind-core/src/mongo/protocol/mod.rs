mod header;
mod op_msg;
mod op_query;
mod op_reply;

pub use header::{read_message, write_message, MessageHeader, HEADER_LEN};
pub use op_msg::{OpMsg, Section};
pub use op_query::OpQuery;
pub use op_reply::OpReply;

use bson::Document;
use bytes::Bytes;

use crate::error::Result;

pub const OP_REPLY: i32 = 1;
pub const OP_QUERY: i32 = 2004;
pub const OP_MSG: i32 = 2013;

/// Every decoded MongoDB message the engine understands. Opcodes outside the
/// decoded set are framed and carried through as [`Message::Raw`].
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    OpMsg(OpMsg),
    OpQuery(OpQuery),
    OpReply(OpReply),
    Raw { op_code: i32, payload: Bytes },
}

impl Message {
    pub fn decode(header: &MessageHeader, payload: &[u8]) -> Result<Self> {
        Ok(match header.op_code {
            OP_MSG => Message::OpMsg(OpMsg::decode(payload)?),
            OP_QUERY => Message::OpQuery(OpQuery::decode(payload)?),
            OP_REPLY => Message::OpReply(OpReply::decode(payload)?),

            op_code => Message::Raw {
                op_code,
                payload: Bytes::copy_from_slice(payload),
            },
        })
    }

    /// Body payload (without the 16-byte header), the inverse of
    /// [`Message::decode`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(match self {
            Message::OpMsg(msg) => msg.encode()?,
            Message::OpQuery(query) => query.encode()?,
            Message::OpReply(reply) => reply.encode()?,
            Message::Raw { payload, .. } => payload.to_vec(),
        })
    }

    pub fn op_code(&self) -> i32 {
        match self {
            Message::OpMsg(_) => OP_MSG,
            Message::OpQuery(_) => OP_QUERY,
            Message::OpReply(_) => OP_REPLY,
            Message::Raw { op_code, .. } => *op_code,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Message::OpMsg(_) => "OP_MSG",
            Message::OpQuery(_) => "OP_QUERY",
            Message::OpReply(_) => "OP_REPLY",
            Message::Raw { .. } => "RAW",
        }
    }

    /// The command document, if this message carries one: the OP_MSG body
    /// section, the OP_QUERY query, or the first OP_REPLY document.
    pub fn body_doc(&self) -> Option<&Document> {
        match self {
            Message::OpMsg(msg) => msg.body(),
            Message::OpQuery(query) => Some(&query.query),
            Message::OpReply(reply) => reply.documents.first(),
            Message::Raw { .. } => None,
        }
    }

    /// Replace the command document, keeping everything else intact. Used by
    /// the SCRAM rewriter to substitute regenerated auth payloads.
    pub fn with_body_doc(&self, doc: Document) -> Message {
        match self {
            Message::OpMsg(msg) => Message::OpMsg(msg.with_body(doc)),

            Message::OpQuery(query) => {
                let mut query = query.clone();
                query.query = doc;
                Message::OpQuery(query)
            }

            Message::OpReply(reply) => {
                let mut reply = reply.clone();
                if reply.documents.is_empty() {
                    reply.documents.push(doc);
                } else {
                    reply.documents[0] = doc;
                }
                Message::OpReply(reply)
            }

            raw @ Message::Raw { .. } => raw.clone(),
        }
    }

    /// Name of the command this message carries (the first key of its body
    /// document).
    pub fn command_name(&self) -> Option<&str> {
        self.body_doc().and_then(|doc| doc.keys().next()).map(String::as_str)
    }

    /// The isMaster/hello family, which drives topology discovery and is
    /// recorded as `type=config`.
    pub fn is_heartbeat(&self) -> bool {
        let Some(doc) = self.body_doc() else {
            return false;
        };

        let Some(command) = doc.keys().next() else {
            return false;
        };

        match command.as_str() {
            "isMaster" | "ismaster" | "hello" => {}
            _ => return false,
        }

        // OP_MSG hellos carry the database in $db; legacy OP_QUERY targets
        // admin.$cmd instead
        match self {
            Message::OpMsg(_) => doc.get_str("$db").map(|db| db == "admin").unwrap_or(true),
            Message::OpQuery(query) => {
                query.full_collection_name.ends_with(".$cmd")
                    || doc.get_str("$db").map(|db| db == "admin").unwrap_or(true)
            }
            _ => true,
        }
    }
}
