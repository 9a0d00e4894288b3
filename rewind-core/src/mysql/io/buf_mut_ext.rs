use byteorder::LittleEndian;

use crate::io::BufMut;

pub trait BufMutExt: BufMut {
    fn put_uint_lenenc(&mut self, val: u64);

    fn put_bytes_lenenc(&mut self, val: &[u8]);

    fn put_str_lenenc(&mut self, val: &str);
}

impl BufMutExt for Vec<u8> {
    fn put_uint_lenenc(&mut self, val: u64) {
        if val < 0xFB {
            self.put_u8(val as u8);
        } else if val <= 0xFF_FF {
            self.put_u8(0xFC);
            self.put_u16::<LittleEndian>(val as u16);
        } else if val <= 0xFF_FF_FF {
            self.put_u8(0xFD);
            self.put_u24::<LittleEndian>(val as u32);
        } else {
            self.put_u8(0xFE);
            self.put_u64::<LittleEndian>(val);
        }
    }

    fn put_bytes_lenenc(&mut self, val: &[u8]) {
        self.put_uint_lenenc(val.len() as u64);
        self.put_bytes(val);
    }

    fn put_str_lenenc(&mut self, val: &str) {
        self.put_bytes_lenenc(val.as_bytes());
    }
}
