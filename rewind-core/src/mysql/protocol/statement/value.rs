use byteorder::LittleEndian;
use bytes::Bytes;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::io::{BufExt, BufMutExt};
use crate::mysql::protocol::TypeId;

/// One value in the binary protocol: a statement parameter, a query
/// attribute, or a binary result-set cell.
///
/// Integer variants keep their wire width and signedness so re-encoding is
/// byte-exact; cross-width numeric comparison is done through [`Self::as_int`]
/// and friends.
// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_binary_resultset.html#sect_protocol_binary_resultset_row_value
#[derive(Debug, Clone, PartialEq)]
pub enum BinaryValue {
    Null,

    Tiny(i8),
    UnsignedTiny(u8),
    Short(i16),
    UnsignedShort(u16),
    Long(i32),
    UnsignedLong(u32),
    LongLong(i64),
    UnsignedLongLong(u64),

    Float(f32),
    Double(f64),

    /// Length-encoded payload of any string/blob/decimal/json/bit type.
    Bytes(Bytes),

    Date {
        length: u8,
        year: u16,
        month: u8,
        day: u8,
    },

    DateTime {
        length: u8,
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        micros: u32,
    },

    Time {
        length: u8,
        negative: bool,
        days: u32,
        hour: u8,
        minute: u8,
        second: u8,
        micros: u32,
    },
}

impl BinaryValue {
    /// Decode one value of `type_id` from the buffer.
    pub fn decode(buf: &mut &[u8], type_id: TypeId, unsigned: bool) -> Result<Self> {
        Ok(match type_id {
            TypeId::NULL => BinaryValue::Null,

            TypeId::TINY_INT => {
                if unsigned {
                    BinaryValue::UnsignedTiny(buf.get_u8()?)
                } else {
                    BinaryValue::Tiny(buf.get_i8()?)
                }
            }

            TypeId::SMALL_INT | TypeId::YEAR => {
                if unsigned {
                    BinaryValue::UnsignedShort(buf.get_u16::<LittleEndian>()?)
                } else {
                    BinaryValue::Short(buf.get_i16::<LittleEndian>()?)
                }
            }

            TypeId::INT | TypeId::MEDIUM_INT => {
                if unsigned {
                    BinaryValue::UnsignedLong(buf.get_u32::<LittleEndian>()?)
                } else {
                    BinaryValue::Long(buf.get_i32::<LittleEndian>()?)
                }
            }

            TypeId::BIG_INT => {
                if unsigned {
                    BinaryValue::UnsignedLongLong(buf.get_u64::<LittleEndian>()?)
                } else {
                    BinaryValue::LongLong(buf.get_i64::<LittleEndian>()?)
                }
            }

            TypeId::FLOAT => BinaryValue::Float(buf.get_f32::<LittleEndian>()?),
            TypeId::DOUBLE => BinaryValue::Double(buf.get_f64::<LittleEndian>()?),

            TypeId::DATE | TypeId::DATETIME | TypeId::TIMESTAMP => {
                let length = buf.get_u8()?;
                let (mut year, mut month, mut day) = (0, 0, 0);
                let (mut hour, mut minute, mut second) = (0, 0, 0);
                let mut micros = 0;

                if length >= 4 {
                    year = buf.get_u16::<LittleEndian>()?;
                    month = buf.get_u8()?;
                    day = buf.get_u8()?;
                }

                if length >= 7 {
                    hour = buf.get_u8()?;
                    minute = buf.get_u8()?;
                    second = buf.get_u8()?;
                }

                if length >= 11 {
                    micros = buf.get_u32::<LittleEndian>()?;
                }

                if type_id == TypeId::DATE {
                    BinaryValue::Date {
                        length,
                        year,
                        month,
                        day,
                    }
                } else {
                    BinaryValue::DateTime {
                        length,
                        year,
                        month,
                        day,
                        hour,
                        minute,
                        second,
                        micros,
                    }
                }
            }

            TypeId::TIME => {
                let length = buf.get_u8()?;
                let (mut negative, mut days) = (false, 0);
                let (mut hour, mut minute, mut second) = (0, 0, 0);
                let mut micros = 0;

                if length >= 8 {
                    negative = buf.get_u8()? == 1;
                    days = buf.get_u32::<LittleEndian>()?;
                    hour = buf.get_u8()?;
                    minute = buf.get_u8()?;
                    second = buf.get_u8()?;
                }

                if length >= 12 {
                    micros = buf.get_u32::<LittleEndian>()?;
                }

                BinaryValue::Time {
                    length,
                    negative,
                    days,
                    hour,
                    minute,
                    second,
                    micros,
                }
            }

            TypeId::DECIMAL
            | TypeId::NEW_DECIMAL
            | TypeId::VAR_CHAR
            | TypeId::VAR_STRING
            | TypeId::CHAR
            | TypeId::ENUM
            | TypeId::SET
            | TypeId::BIT
            | TypeId::JSON
            | TypeId::TINY_BLOB
            | TypeId::MEDIUM_BLOB
            | TypeId::LONG_BLOB
            | TypeId::BLOB
            | TypeId::GEOMETRY => match buf.get_bytes_lenenc()? {
                Some(bytes) => BinaryValue::Bytes(Bytes::copy_from_slice(bytes)),
                None => BinaryValue::Null,
            },

            id => {
                return Err(err_protocol!(
                    "unknown binary value type id {:?}",
                    id
                ));
            }
        })
    }

    /// Exact inverse of [`Self::decode`].
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            BinaryValue::Null => {}

            BinaryValue::Tiny(v) => buf.put_u8(*v as u8),
            BinaryValue::UnsignedTiny(v) => buf.put_u8(*v),
            BinaryValue::Short(v) => buf.put_u16::<LittleEndian>(*v as u16),
            BinaryValue::UnsignedShort(v) => buf.put_u16::<LittleEndian>(*v),
            BinaryValue::Long(v) => buf.put_u32::<LittleEndian>(*v as u32),
            BinaryValue::UnsignedLong(v) => buf.put_u32::<LittleEndian>(*v),
            BinaryValue::LongLong(v) => buf.put_u64::<LittleEndian>(*v as u64),
            BinaryValue::UnsignedLongLong(v) => buf.put_u64::<LittleEndian>(*v),

            BinaryValue::Float(v) => buf.put_f32::<LittleEndian>(*v),
            BinaryValue::Double(v) => buf.put_f64::<LittleEndian>(*v),

            BinaryValue::Bytes(bytes) => buf.put_bytes_lenenc(bytes),

            BinaryValue::Date {
                length,
                year,
                month,
                day,
            } => {
                buf.put_u8(*length);
                if *length >= 4 {
                    buf.put_u16::<LittleEndian>(*year);
                    buf.put_u8(*month);
                    buf.put_u8(*day);
                }
            }

            BinaryValue::DateTime {
                length,
                year,
                month,
                day,
                hour,
                minute,
                second,
                micros,
            } => {
                buf.put_u8(*length);
                if *length >= 4 {
                    buf.put_u16::<LittleEndian>(*year);
                    buf.put_u8(*month);
                    buf.put_u8(*day);
                }
                if *length >= 7 {
                    buf.put_u8(*hour);
                    buf.put_u8(*minute);
                    buf.put_u8(*second);
                }
                if *length >= 11 {
                    buf.put_u32::<LittleEndian>(*micros);
                }
            }

            BinaryValue::Time {
                length,
                negative,
                days,
                hour,
                minute,
                second,
                micros,
            } => {
                buf.put_u8(*length);
                if *length >= 8 {
                    buf.put_u8(u8::from(*negative));
                    buf.put_u32::<LittleEndian>(*days);
                    buf.put_u8(*hour);
                    buf.put_u8(*minute);
                    buf.put_u8(*second);
                }
                if *length >= 12 {
                    buf.put_u32::<LittleEndian>(*micros);
                }
            }
        }
    }

    /// Signed view of any integer variant, for cross-width comparison.
    pub fn as_int(&self) -> Option<i128> {
        Some(match self {
            BinaryValue::Tiny(v) => i128::from(*v),
            BinaryValue::UnsignedTiny(v) => i128::from(*v),
            BinaryValue::Short(v) => i128::from(*v),
            BinaryValue::UnsignedShort(v) => i128::from(*v),
            BinaryValue::Long(v) => i128::from(*v),
            BinaryValue::UnsignedLong(v) => i128::from(*v),
            BinaryValue::LongLong(v) => i128::from(*v),
            BinaryValue::UnsignedLongLong(v) => i128::from(*v),

            _ => return None,
        })
    }

    pub fn as_float(&self) -> Option<f64> {
        Some(match self {
            BinaryValue::Float(v) => f64::from(*v),
            BinaryValue::Double(v) => *v,

            _ => return None,
        })
    }

    /// Text form used in captured mocks: UTF-8 payloads verbatim, anything
    /// else base64.
    pub fn captured_text(&self) -> Option<String> {
        match self {
            BinaryValue::Bytes(bytes) => Some(match std::str::from_utf8(bytes) {
                Ok(text) if text.is_ascii() => text.to_owned(),
                _ => base64::encode(bytes),
            }),

            _ => None,
        }
    }

    /// Type-aware equality: byte payloads by content, integers by value
    /// across widths, floats by value across widths, everything else
    /// structurally.
    pub fn loosely_equals(&self, other: &BinaryValue) -> bool {
        if let (Some(a), Some(b)) = (self.as_int(), other.as_int()) {
            return a == b;
        }

        if let (Some(a), Some(b)) = (self.as_float(), other.as_float()) {
            return a == b;
        }

        self == other
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::{BinaryValue, TypeId};

    fn round_trip(value: &BinaryValue, type_id: TypeId, unsigned: bool) {
        let mut buf = Vec::new();
        value.encode(&mut buf);

        let mut slice = &buf[..];
        let decoded = BinaryValue::decode(&mut slice, type_id, unsigned).unwrap();

        assert_eq!(&decoded, value);
        assert!(slice.is_empty());
    }

    #[test]
    fn integers_round_trip_with_width_and_sign() {
        round_trip(&BinaryValue::Tiny(-5), TypeId::TINY_INT, false);
        round_trip(&BinaryValue::UnsignedTiny(200), TypeId::TINY_INT, true);
        round_trip(&BinaryValue::Short(-300), TypeId::SMALL_INT, false);
        round_trip(&BinaryValue::Long(7), TypeId::INT, false);
        round_trip(&BinaryValue::UnsignedLongLong(u64::MAX), TypeId::BIG_INT, true);
    }

    #[test]
    fn floats_and_strings_round_trip() {
        round_trip(&BinaryValue::Float(1.5), TypeId::FLOAT, false);
        round_trip(&BinaryValue::Double(-2.25), TypeId::DOUBLE, false);
        round_trip(
            &BinaryValue::Bytes(Bytes::from_static(b"ok")),
            TypeId::VAR_STRING,
            false,
        );
    }

    #[test]
    fn temporal_values_keep_their_wire_length() {
        round_trip(
            &BinaryValue::Date {
                length: 4,
                year: 2024,
                month: 2,
                day: 29,
            },
            TypeId::DATE,
            false,
        );
        round_trip(
            &BinaryValue::DateTime {
                length: 11,
                year: 2024,
                month: 2,
                day: 29,
                hour: 13,
                minute: 5,
                second: 59,
                micros: 123_456,
            },
            TypeId::DATETIME,
            false,
        );
        round_trip(
            &BinaryValue::Time {
                length: 12,
                negative: true,
                days: 1,
                hour: 2,
                minute: 3,
                second: 4,
                micros: 5,
            },
            TypeId::TIME,
            false,
        );
    }

    #[test]
    fn numeric_equality_crosses_widths() {
        assert!(BinaryValue::Tiny(7).loosely_equals(&BinaryValue::LongLong(7)));
        assert!(BinaryValue::UnsignedShort(7).loosely_equals(&BinaryValue::Long(7)));
        assert!(!BinaryValue::Tiny(7).loosely_equals(&BinaryValue::Long(8)));
        assert!(BinaryValue::Float(1.5).loosely_equals(&BinaryValue::Double(1.5)));
        assert!(
            BinaryValue::Bytes(Bytes::from_static(b"a"))
                .loosely_equals(&BinaryValue::Bytes(Bytes::from_static(b"a")))
        );
    }

    #[test]
    fn non_ascii_payloads_are_captured_as_base64() {
        let plain = BinaryValue::Bytes(Bytes::from_static(b"hello"));
        assert_eq!(plain.captured_text().as_deref(), Some("hello"));

        let binary = BinaryValue::Bytes(Bytes::from_static(&[0xFF, 0x00, 0x7F]));
        assert_eq!(binary.captured_text().as_deref(), Some("/wB/"));
    }

    #[test]
    fn truncated_values_fail_cleanly() {
        let mut buf: &[u8] = &[0x01];
        assert!(BinaryValue::decode(&mut buf, TypeId::INT, false).is_err());

        let mut buf: &[u8] = &[0x0B, 0xE8];
        assert!(BinaryValue::decode(&mut buf, TypeId::DATETIME, false).is_err());
    }
}
