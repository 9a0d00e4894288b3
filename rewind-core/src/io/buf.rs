use byteorder::ByteOrder;
use memchr::memchr;
use std::str;

use crate::error::{Error, Result};

/// Checked, advancing reads over a borrowed byte slice.
///
/// Every getter verifies the remaining length first; a truncated buffer
/// produces [`Error::Protocol`], never a panic. Decoders built on this trait
/// are total functions on arbitrary input.
pub trait Buf<'a> {
    fn advance(&mut self, cnt: usize) -> Result<()>;

    fn get_u8(&mut self) -> Result<u8>;

    fn get_i8(&mut self) -> Result<i8>;

    fn get_u16<T: ByteOrder>(&mut self) -> Result<u16>;

    fn get_i16<T: ByteOrder>(&mut self) -> Result<i16>;

    fn get_u24<T: ByteOrder>(&mut self) -> Result<u32>;

    fn get_u32<T: ByteOrder>(&mut self) -> Result<u32>;

    fn get_i32<T: ByteOrder>(&mut self) -> Result<i32>;

    fn get_u64<T: ByteOrder>(&mut self) -> Result<u64>;

    fn get_i64<T: ByteOrder>(&mut self) -> Result<i64>;

    fn get_f32<T: ByteOrder>(&mut self) -> Result<f32>;

    fn get_f64<T: ByteOrder>(&mut self) -> Result<f64>;

    fn get_bytes(&mut self, len: usize) -> Result<&'a [u8]>;

    fn get_str(&mut self, len: usize) -> Result<&'a str>;

    fn get_str_nul(&mut self) -> Result<&'a str>;

    fn get_bytes_nul(&mut self) -> Result<&'a [u8]>;
}

macro_rules! check_len {
    ($buf:expr, $n:expr) => {
        if $buf.len() < $n {
            return Err(err_protocol!(
                "unexpected end of packet: wanted {} bytes, {} remain",
                $n,
                $buf.len()
            ));
        }
    };
}

impl<'a> Buf<'a> for &'a [u8] {
    fn advance(&mut self, cnt: usize) -> Result<()> {
        check_len!(self, cnt);
        *self = &self[cnt..];

        Ok(())
    }

    fn get_u8(&mut self) -> Result<u8> {
        check_len!(self, 1);
        let val = self[0];
        *self = &self[1..];

        Ok(val)
    }

    fn get_i8(&mut self) -> Result<i8> {
        Ok(self.get_u8()? as i8)
    }

    fn get_u16<T: ByteOrder>(&mut self) -> Result<u16> {
        check_len!(self, 2);
        let val = T::read_u16(*self);
        *self = &self[2..];

        Ok(val)
    }

    fn get_i16<T: ByteOrder>(&mut self) -> Result<i16> {
        Ok(self.get_u16::<T>()? as i16)
    }

    fn get_u24<T: ByteOrder>(&mut self) -> Result<u32> {
        check_len!(self, 3);
        let val = T::read_u24(*self);
        *self = &self[3..];

        Ok(val)
    }

    fn get_u32<T: ByteOrder>(&mut self) -> Result<u32> {
        check_len!(self, 4);
        let val = T::read_u32(*self);
        *self = &self[4..];

        Ok(val)
    }

    fn get_i32<T: ByteOrder>(&mut self) -> Result<i32> {
        Ok(self.get_u32::<T>()? as i32)
    }

    fn get_u64<T: ByteOrder>(&mut self) -> Result<u64> {
        check_len!(self, 8);
        let val = T::read_u64(*self);
        *self = &self[8..];

        Ok(val)
    }

    fn get_i64<T: ByteOrder>(&mut self) -> Result<i64> {
        Ok(self.get_u64::<T>()? as i64)
    }

    fn get_f32<T: ByteOrder>(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.get_u32::<T>()?))
    }

    fn get_f64<T: ByteOrder>(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.get_u64::<T>()?))
    }

    fn get_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        check_len!(self, len);
        let val = &self[..len];
        *self = &self[len..];

        Ok(val)
    }

    fn get_str(&mut self, len: usize) -> Result<&'a str> {
        str::from_utf8(self.get_bytes(len)?)
            .map_err(|err| err_protocol!("invalid utf-8 in packet string: {}", err))
    }

    fn get_str_nul(&mut self) -> Result<&'a str> {
        let len = memchr(b'\0', *self)
            .ok_or_else(|| err_protocol!("expected NUL-terminated string in packet"))?;
        let s = &self.get_str(len + 1)?[..len];

        Ok(s)
    }

    fn get_bytes_nul(&mut self) -> Result<&'a [u8]> {
        let len = memchr(b'\0', *self)
            .ok_or_else(|| err_protocol!("expected NUL-terminated bytes in packet"))?;
        let s = &self.get_bytes(len + 1)?[..len];

        Ok(s)
    }
}
