use byteorder::LittleEndian;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::io::{BufExt, BufMutExt};
use crate::mysql::protocol::{Capabilities, Decode, Encode, FieldFlags, TypeId};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_query_response_text_resultset_column_definition.html
// https://mariadb.com/kb/en/resultset/#column-definition-packet
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub schema: Box<str>,
    pub table_alias: Box<str>,
    pub table: Box<str>,
    pub column_alias: Box<str>,
    pub column: Box<str>,
    pub collation: u16,
    pub max_size: u32,
    pub type_id: TypeId,
    pub flags: FieldFlags,
    pub decimals: u8,
}

impl ColumnDefinition {
    pub fn name(&self) -> &str {
        if self.column_alias.is_empty() {
            &self.column
        } else {
            &self.column_alias
        }
    }
}

impl Decode for ColumnDefinition {
    fn decode_with(mut buf: &[u8], _: Capabilities) -> Result<Self> {
        // catalog : string<lenenc>
        let catalog = buf.get_str_lenenc()?;
        if catalog != Some("def") {
            return Err(err_protocol!(
                "expected column definition catalog \"def\"; received {:?}",
                catalog
            ));
        }

        let schema = buf.get_str_lenenc()?.unwrap_or_default().into();
        let table_alias = buf.get_str_lenenc()?.unwrap_or_default().into();
        let table = buf.get_str_lenenc()?.unwrap_or_default().into();
        let column_alias = buf.get_str_lenenc()?.unwrap_or_default().into();
        let column = buf.get_str_lenenc()?.unwrap_or_default().into();

        // length of fixed fields, always 0x0C : int<lenenc>
        let fixed_len = buf.get_uint_lenenc()?.unwrap_or(0);
        if fixed_len != 0x0C {
            return Err(err_protocol!(
                "expected column definition fixed-field length 0x0C; received 0x{:02X}",
                fixed_len
            ));
        }

        let collation = buf.get_u16::<LittleEndian>()?;
        let max_size = buf.get_u32::<LittleEndian>()?;
        let type_id = TypeId(buf.get_u8()?);
        let flags = FieldFlags::from_bits_truncate(buf.get_u16::<LittleEndian>()?);
        let decimals = buf.get_u8()?;

        Ok(Self {
            schema,
            table_alias,
            table,
            column_alias,
            column,
            collation,
            max_size,
            type_id,
            flags,
            decimals,
        })
    }
}

impl Encode for ColumnDefinition {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_str_lenenc("def");
        buf.put_str_lenenc(&self.schema);
        buf.put_str_lenenc(&self.table_alias);
        buf.put_str_lenenc(&self.table);
        buf.put_str_lenenc(&self.column_alias);
        buf.put_str_lenenc(&self.column);
        buf.put_uint_lenenc(0x0C);
        buf.put_u16::<LittleEndian>(self.collation);
        buf.put_u32::<LittleEndian>(self.max_size);
        buf.put_u8(self.type_id.0);
        buf.put_u16::<LittleEndian>(self.flags.bits());
        buf.put_u8(self.decimals);

        // filler : string<2>
        buf.put_u8(0);
        buf.put_u8(0);
    }
}
