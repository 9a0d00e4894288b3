use byteorder::LittleEndian;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::protocol::response::EofPacket;
use crate::mysql::protocol::{Capabilities, ColumnDefinition, Decode, Encode};

/// First packet of a successful `COM_STMT_PREPARE` response.
// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_prepare.html#sect_protocol_com_stmt_prepare_response_ok
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComStmtPrepareOk {
    pub statement_id: u32,

    /// Number of columns in the result set the statement will produce (0 if
    /// it produces none).
    pub num_columns: u16,

    /// Number of '?' placeholders.
    pub num_params: u16,

    pub warnings: u16,
}

impl Decode for ComStmtPrepareOk {
    fn decode_with(mut buf: &[u8], _: Capabilities) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0x00 {
            return Err(err_protocol!(
                "expected COM_STMT_PREPARE_OK (0x00); received 0x{:02X}",
                header
            ));
        }

        let statement_id = buf.get_u32::<LittleEndian>()?;
        let num_columns = buf.get_u16::<LittleEndian>()?;
        let num_params = buf.get_u16::<LittleEndian>()?;

        // reserved : string<1>
        buf.advance(1)?;

        let warnings = buf.get_u16::<LittleEndian>()?;

        Ok(Self {
            statement_id,
            num_columns,
            num_params,
            warnings,
        })
    }
}

impl Encode for ComStmtPrepareOk {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0x00);
        buf.put_u32::<LittleEndian>(self.statement_id);
        buf.put_u16::<LittleEndian>(self.num_columns);
        buf.put_u16::<LittleEndian>(self.num_params);
        buf.put_u8(0);
        buf.put_u16::<LittleEndian>(self.warnings);
    }
}

/// The whole aggregated prepare response: the OK, `num_params` parameter
/// definitions, `num_columns` column definitions, and whichever intermediate
/// EOFs the server actually sent (both absent under `CLIENT_DEPRECATE_EOF`,
/// and some servers skip the one between the two definition lists anyway).
#[derive(Debug, Clone, PartialEq)]
pub struct StmtPrepareResponse {
    pub ok: ComStmtPrepareOk,
    pub param_defs: Vec<ColumnDefinition>,
    pub eof_after_params: Option<EofPacket>,
    pub column_defs: Vec<ColumnDefinition>,
    pub eof_after_columns: Option<EofPacket>,
}
