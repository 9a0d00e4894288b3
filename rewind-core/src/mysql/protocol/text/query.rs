use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::io::{BufExt, BufMutExt};
use crate::mysql::protocol::statement::BinaryValue;
use crate::mysql::protocol::{Capabilities, Decode, Encode, TypeId};

/// A named parameter attached to a `COM_QUERY` when the connection
/// negotiated `CLIENT_QUERY_ATTRIBUTES`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAttribute {
    pub type_id: TypeId,
    pub unsigned: bool,
    pub name: Box<str>,
    pub value: BinaryValue,
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_query.html
#[derive(Debug, Clone, PartialEq)]
pub struct ComQuery {
    pub query: Box<str>,
    pub attributes: Vec<QueryAttribute>,
}

impl Decode for ComQuery {
    fn decode_with(mut buf: &[u8], capabilities: Capabilities) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0x03 {
            return Err(err_protocol!(
                "expected COM_QUERY (0x03); received 0x{:02X}",
                header
            ));
        }

        let mut attributes = Vec::new();

        if capabilities.contains(Capabilities::QUERY_ATTRIBUTES) {
            // parameter_count : int<lenenc>
            let parameter_count = buf.get_uint_lenenc()?.unwrap_or(0) as usize;

            // parameter_set_count : int<lenenc>, currently always 1
            let _parameter_set_count = buf.get_uint_lenenc()?.unwrap_or(1);

            if parameter_count > 0 {
                // null_bitmap : byte<(parameter_count + 7) / 8>
                let bitmap = buf.get_bytes((parameter_count + 7) / 8)?.to_vec();

                // new_params_bind_flag : int<1>, always 1 for COM_QUERY
                let _new_params_bind_flag = buf.get_u8()?;

                let mut metas = Vec::with_capacity(parameter_count);
                for _ in 0..parameter_count {
                    let type_id = TypeId(buf.get_u8()?);
                    let flags = buf.get_u8()?;
                    let name: Box<str> = buf.get_str_lenenc()?.unwrap_or_default().into();

                    metas.push((type_id, flags & 0x80 != 0, name));
                }

                for (idx, (type_id, unsigned, name)) in metas.into_iter().enumerate() {
                    let is_null = bitmap[idx / 8] & (1 << (idx % 8)) != 0;
                    let value = if is_null {
                        BinaryValue::Null
                    } else {
                        BinaryValue::decode(&mut buf, type_id, unsigned)?
                    };

                    attributes.push(QueryAttribute {
                        type_id,
                        unsigned,
                        name,
                        value,
                    });
                }
            }
        }

        let query: Box<str> = buf.get_str(buf.len())?.into();

        Ok(Self { query, attributes })
    }
}

impl Encode for ComQuery {
    fn encode_with(&self, buf: &mut Vec<u8>, capabilities: Capabilities) {
        buf.put_u8(0x03);

        if capabilities.contains(Capabilities::QUERY_ATTRIBUTES) {
            buf.put_uint_lenenc(self.attributes.len() as u64);
            buf.put_uint_lenenc(1);

            if !self.attributes.is_empty() {
                let mut bitmap = vec![0u8; (self.attributes.len() + 7) / 8];
                for (idx, attr) in self.attributes.iter().enumerate() {
                    if matches!(attr.value, BinaryValue::Null) {
                        bitmap[idx / 8] |= 1 << (idx % 8);
                    }
                }
                buf.put_bytes(&bitmap);

                // new_params_bind_flag
                buf.put_u8(1);

                for attr in &self.attributes {
                    buf.put_u8(attr.type_id.0);
                    buf.put_u8(if attr.unsigned { 0x80 } else { 0 });
                    buf.put_str_lenenc(&attr.name);
                }

                for attr in &self.attributes {
                    attr.value.encode(buf);
                }
            }
        }

        buf.put_str(&self.query);
    }
}
