use bytes::Bytes;

use crate::error::Result;
use crate::io::Buf;
use crate::mysql::protocol::statement::BinaryValue;
use crate::mysql::protocol::{Capabilities, ColumnDefinition, Encode, FieldFlags};

/// One row of a binary result set: a 0x00 header, a NULL bitmap with a
/// 2-bit offset, then per-type encoded values. The raw payload is kept so
/// replay is byte-exact.
// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_binary_resultset.html
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryRow {
    pub raw: Bytes,
    pub values: Vec<BinaryValue>,
}

impl BinaryRow {
    pub fn decode(payload: &[u8], columns: &[ColumnDefinition]) -> Result<Self> {
        let mut buf = payload;

        let header = buf.get_u8()?;
        if header != 0x00 {
            return Err(err_protocol!(
                "expected binary row (0x00); received 0x{:02X}",
                header
            ));
        }

        // NULL bitmap : byte<(column_count + 7 + 2) / 8>, offset 2
        let bitmap = buf.get_bytes((columns.len() + 9) / 8)?.to_vec();

        let mut values = Vec::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            let bit = idx + 2;
            if bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
                values.push(BinaryValue::Null);
                continue;
            }

            values.push(BinaryValue::decode(
                &mut buf,
                column.type_id,
                column.flags.contains(FieldFlags::UNSIGNED),
            )?);
        }

        Ok(Self {
            raw: Bytes::copy_from_slice(payload),
            values,
        })
    }
}

impl Encode for BinaryRow {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.extend_from_slice(&self.raw);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::{BinaryRow, BinaryValue};
    use crate::mysql::protocol::{ColumnDefinition, FieldFlags, TypeId};

    fn column(type_id: TypeId) -> ColumnDefinition {
        ColumnDefinition {
            schema: "".into(),
            table_alias: "".into(),
            table: "t".into(),
            column_alias: "".into(),
            column: "c".into(),
            collation: 63,
            max_size: 0,
            type_id,
            flags: FieldFlags::empty(),
            decimals: 0,
        }
    }

    #[test]
    fn it_decodes_int_and_string_cells() {
        // header 0x00, bitmap 0x00, int32 11, "ok"
        let payload = b"\x00\x00\x0b\x00\x00\x00\x02ok";
        let columns = [column(TypeId::INT), column(TypeId::VAR_STRING)];

        let row = BinaryRow::decode(payload, &columns).unwrap();

        assert_eq!(row.values[0], BinaryValue::Long(11));
        assert_eq!(
            row.values[1],
            BinaryValue::Bytes(Bytes::from_static(b"ok"))
        );
        assert_eq!(&row.raw[..], payload);
    }

    #[test]
    fn null_bits_skip_their_values() {
        // bitmap 0b0000_0100 marks the first column (offset 2) NULL
        let payload = b"\x00\x04\x02ok";
        let columns = [column(TypeId::INT), column(TypeId::VAR_STRING)];

        let row = BinaryRow::decode(payload, &columns).unwrap();

        assert_eq!(row.values[0], BinaryValue::Null);
        assert_eq!(
            row.values[1],
            BinaryValue::Bytes(Bytes::from_static(b"ok"))
        );
    }

    #[test]
    fn truncated_rows_fail_cleanly() {
        let columns = [column(TypeId::INT)];
        assert!(BinaryRow::decode(b"\x00\x00\x0b\x00", &columns).is_err());
        assert!(BinaryRow::decode(b"", &columns).is_err());
    }
}
