use byteorder::LittleEndian;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::io::{BufExt, BufMutExt};
use crate::mysql::protocol::statement::BinaryValue;
use crate::mysql::protocol::{Capabilities, Encode, TypeId};

/// Set in `flags` when the packet itself carries a parameter count
/// (`CLIENT_QUERY_ATTRIBUTES` connections).
const PARAMETER_COUNT_AVAILABLE: u8 = 0x08;

#[derive(Debug, Clone, PartialEq)]
pub struct StmtParameter {
    pub type_id: TypeId,
    pub unsigned: bool,

    /// Attribute name; empty for ordinary '?' placeholders.
    pub name: Box<str>,

    pub value: BinaryValue,
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_execute.html
#[derive(Debug, Clone, PartialEq)]
pub struct ComStmtExecute {
    pub statement_id: u32,
    pub flags: u8,
    pub iteration_count: u32,
    pub parameter_count: u16,
    pub new_params_bind_flag: u8,
    pub parameters: Vec<StmtParameter>,
}

impl ComStmtExecute {
    /// Decode, given the '?' count recorded at prepare time. The NULL bitmap
    /// and the typed values cannot be parsed without it.
    pub fn decode_with_params(
        mut buf: &[u8],
        num_params: u16,
        capabilities: Capabilities,
    ) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0x17 {
            return Err(err_protocol!(
                "expected COM_STMT_EXECUTE (0x17); received 0x{:02X}",
                header
            ));
        }

        let statement_id = buf.get_u32::<LittleEndian>()?;
        let flags = buf.get_u8()?;
        let iteration_count = buf.get_u32::<LittleEndian>()?;

        let with_attrs = capabilities.contains(Capabilities::QUERY_ATTRIBUTES)
            && flags & PARAMETER_COUNT_AVAILABLE != 0;

        let parameter_count = if with_attrs {
            buf.get_uint_lenenc()?.unwrap_or(0) as u16
        } else {
            num_params
        };

        let mut new_params_bind_flag = 0;
        let mut parameters = Vec::with_capacity(parameter_count as usize);

        if parameter_count > 0 {
            let bitmap = buf
                .get_bytes((parameter_count as usize + 7) / 8)?
                .to_vec();

            new_params_bind_flag = buf.get_u8()?;
            if new_params_bind_flag != 1 {
                // Types were bound by an earlier execute on the same
                // statement; nothing on the wire says what they are.
                return Err(err_protocol!(
                    "COM_STMT_EXECUTE without rebound parameter types (flag {})",
                    new_params_bind_flag
                ));
            }

            let mut metas = Vec::with_capacity(parameter_count as usize);
            for _ in 0..parameter_count {
                let type_id = TypeId(buf.get_u8()?);
                let param_flags = buf.get_u8()?;
                let name: Box<str> = if with_attrs {
                    buf.get_str_lenenc()?.unwrap_or_default().into()
                } else {
                    "".into()
                };

                metas.push((type_id, param_flags & 0x80 != 0, name));
            }

            for (idx, (type_id, unsigned, name)) in metas.into_iter().enumerate() {
                let is_null = bitmap[idx / 8] & (1 << (idx % 8)) != 0;
                let value = if is_null {
                    BinaryValue::Null
                } else {
                    BinaryValue::decode(&mut buf, type_id, unsigned)?
                };

                parameters.push(StmtParameter {
                    type_id,
                    unsigned,
                    name,
                    value,
                });
            }
        }

        Ok(Self {
            statement_id,
            flags,
            iteration_count,
            parameter_count,
            new_params_bind_flag,
            parameters,
        })
    }
}

impl Encode for ComStmtExecute {
    fn encode_with(&self, buf: &mut Vec<u8>, capabilities: Capabilities) {
        buf.put_u8(0x17);
        buf.put_u32::<LittleEndian>(self.statement_id);
        buf.put_u8(self.flags);
        buf.put_u32::<LittleEndian>(self.iteration_count);

        let with_attrs = capabilities.contains(Capabilities::QUERY_ATTRIBUTES)
            && self.flags & PARAMETER_COUNT_AVAILABLE != 0;

        if with_attrs {
            buf.put_uint_lenenc(u64::from(self.parameter_count));
        }

        if self.parameter_count > 0 {
            let mut bitmap = vec![0u8; (self.parameter_count as usize + 7) / 8];
            for (idx, param) in self.parameters.iter().enumerate() {
                if matches!(param.value, BinaryValue::Null) {
                    bitmap[idx / 8] |= 1 << (idx % 8);
                }
            }
            buf.put_bytes(&bitmap);

            buf.put_u8(self.new_params_bind_flag);

            for param in &self.parameters {
                buf.put_u8(param.type_id.0);
                buf.put_u8(if param.unsigned { 0x80 } else { 0 });

                if with_attrs {
                    buf.put_str_lenenc(&param.name);
                }
            }

            for param in &self.parameters {
                param.value.encode(buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BinaryValue, Capabilities, ComStmtExecute, Encode, StmtParameter, TypeId};

    fn sample() -> ComStmtExecute {
        ComStmtExecute {
            statement_id: 1,
            flags: 0,
            iteration_count: 1,
            parameter_count: 2,
            new_params_bind_flag: 1,
            parameters: vec![
                StmtParameter {
                    type_id: TypeId::INT,
                    unsigned: false,
                    name: "".into(),
                    value: BinaryValue::Long(7),
                },
                StmtParameter {
                    type_id: TypeId::VAR_STRING,
                    unsigned: false,
                    name: "".into(),
                    value: BinaryValue::Null,
                },
            ],
        }
    }

    #[test]
    fn it_round_trips() {
        let original = sample();

        let mut buf = Vec::new();
        original.encode(&mut buf);

        let decoded =
            ComStmtExecute::decode_with_params(&buf, 2, Capabilities::empty()).unwrap();
        assert_eq!(decoded, original);

        let mut again = Vec::new();
        decoded.encode(&mut again);
        assert_eq!(again, buf);
    }

    #[test]
    fn the_null_bitmap_governs_values() {
        let mut buf = Vec::new();
        sample().encode(&mut buf);

        let decoded =
            ComStmtExecute::decode_with_params(&buf, 2, Capabilities::empty()).unwrap();

        assert_eq!(decoded.parameters[0].value, BinaryValue::Long(7));
        assert_eq!(decoded.parameters[1].value, BinaryValue::Null);
    }

    #[test]
    fn stale_parameter_types_are_rejected() {
        let mut exec = sample();
        exec.new_params_bind_flag = 0;

        // encode writes the flag verbatim; decode then refuses it
        let mut buf = Vec::new();
        exec.encode(&mut buf);

        // flag byte sits after the bitmap; the encoded metas make the packet
        // undecodable without rebound types
        assert!(ComStmtExecute::decode_with_params(&buf, 2, Capabilities::empty()).is_err());
    }
}
