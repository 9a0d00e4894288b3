mod capabilities;
mod command;
mod decode;
mod encode;
mod field;
mod packet;
mod status;
mod r#type;

pub use capabilities::Capabilities;
pub use command::Command;
pub use decode::Decode;
pub use encode::Encode;
pub use field::FieldFlags;
pub use packet::{read_packet, write_packet, Packet, PacketHeader};
pub use status::Status;
pub use r#type::TypeId;

pub mod connect;
pub mod response;
pub mod statement;
pub mod text;

mod column_def;
mod result_set;

pub use column_def::ColumnDefinition;
pub use result_set::{
    classify_first_response, read_prepare_response, read_result_set, FirstResponse, ResultSet,
    ResultSetRow, Terminator,
};

use bytes::Bytes;

use connect::{
    AuthMoreData, AuthSwitchRequest, Handshake, HandshakeResponse, SslRequest,
};
use response::{EofPacket, ErrPacket, OkPacket};
use statement::{
    ComStmtClose, ComStmtExecute, ComStmtPrepare, ComStmtReset, ComStmtSendLongData,
    StmtPrepareResponse,
};
use text::ComQuery;

/// Every decoded MySQL packet (or aggregated multi-packet response) the
/// engine understands, as a tagged union. [`Message::type_tag`] yields the
/// canonical tag so consumers can dispatch without matching the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    // connection phase
    Handshake(Handshake),
    HandshakeResponse(HandshakeResponse),
    SslRequest(SslRequest),
    AuthSwitchRequest(AuthSwitchRequest),
    /// Opaque client reply to an auth switch.
    AuthSwitchResponse(Bytes),
    AuthMoreData(AuthMoreData),
    /// Opaque client-side auth bytes during caching_sha2 full auth: a plain
    /// password over TLS, the 0x02 public-key request, or an RSA-encrypted
    /// password.
    AuthData(Bytes),

    // generic responses
    Ok(OkPacket),
    Err(ErrPacket),
    Eof(EofPacket),

    // commands
    Quit,
    InitDb { schema: Box<str> },
    Ping,
    Statistics,
    Debug,
    ResetConnection,
    Query(ComQuery),
    StmtPrepare(ComStmtPrepare),
    StmtExecute(ComStmtExecute),
    StmtClose(ComStmtClose),
    StmtReset(ComStmtReset),
    StmtSendLongData(ComStmtSendLongData),

    // aggregated responses
    StmtPrepareOk(StmtPrepareResponse),
    TextResultSet(ResultSet),
    BinaryResultSet(ResultSet),

    /// Framed but not semantically interpreted.
    Raw(Bytes),
}

impl Message {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Message::Handshake(_) => "HANDSHAKE_V10",
            Message::HandshakeResponse(_) => "HANDSHAKE_RESPONSE_41",
            Message::SslRequest(_) => "SSL_REQUEST",
            Message::AuthSwitchRequest(_) => "AUTH_SWITCH_REQUEST",
            Message::AuthSwitchResponse(_) => "AUTH_SWITCH_RESPONSE",
            Message::AuthMoreData(_) => "AUTH_MORE_DATA",
            Message::AuthData(_) => "AUTH_DATA",

            Message::Ok(_) => "OK",
            Message::Err(_) => "ERR",
            Message::Eof(_) => "EOF",

            Message::Quit => "COM_QUIT",
            Message::InitDb { .. } => "COM_INIT_DB",
            Message::Ping => "COM_PING",
            Message::Statistics => "COM_STATISTICS",
            Message::Debug => "COM_DEBUG",
            Message::ResetConnection => "COM_RESET_CONNECTION",
            Message::Query(_) => "COM_QUERY",
            Message::StmtPrepare(_) => "COM_STMT_PREPARE",
            Message::StmtExecute(_) => "COM_STMT_EXECUTE",
            Message::StmtClose(_) => "COM_STMT_CLOSE",
            Message::StmtReset(_) => "COM_STMT_RESET",
            Message::StmtSendLongData(_) => "COM_STMT_SEND_LONG_DATA",

            Message::StmtPrepareOk(_) => "COM_STMT_PREPARE_OK",
            Message::TextResultSet(_) => "TEXT_RESULT_SET",
            Message::BinaryResultSet(_) => "BINARY_RESULT_SET",

            Message::Raw(_) => "RAW",
        }
    }
}
