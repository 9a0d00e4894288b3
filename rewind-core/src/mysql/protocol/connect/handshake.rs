use byteorder::LittleEndian;
use bytes::Bytes;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::protocol::{Capabilities, Decode, Encode, Status};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_handshake_v10.html
// https://mariadb.com/kb/en/connection/#initial-handshake-packet
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    pub protocol_version: u8,
    pub server_version: Box<str>,
    pub connection_id: u32,

    /// First 8 bytes of the auth challenge.
    pub auth_plugin_data_1: Bytes,

    pub capabilities: Capabilities,
    pub collation: u8,
    pub status: Status,

    /// Value of the plugin-data length byte (0 without `PLUGIN_AUTH`).
    pub auth_plugin_data_len: u8,

    /// Trailing `max(13, auth_plugin_data_len - 8)` challenge bytes, present
    /// only with `PLUGIN_AUTH`; usually NUL-padded.
    pub auth_plugin_data_2: Bytes,

    pub auth_plugin_name: Option<Box<str>>,
}

impl Handshake {
    /// Challenge bytes handed to the auth plugin: both parts, minus the
    /// customary trailing NUL.
    pub fn scramble(&self) -> Vec<u8> {
        let mut out = self.auth_plugin_data_1.to_vec();
        let part_2 = match self.auth_plugin_data_2.split_last() {
            Some((0, rest)) => rest,
            _ => &self.auth_plugin_data_2[..],
        };
        out.extend_from_slice(part_2);

        out
    }
}

impl Decode for Handshake {
    fn decode_with(mut buf: &[u8], _: Capabilities) -> Result<Self> {
        let protocol_version = buf.get_u8()?;
        let server_version: Box<str> = buf.get_str_nul()?.into();
        let connection_id = buf.get_u32::<LittleEndian>()?;

        // auth-plugin-data part 1 : string<8>
        let auth_plugin_data_1 = Bytes::copy_from_slice(buf.get_bytes(8)?);

        // filler : int<1>
        buf.advance(1)?;

        // capability_flags_1 : int<2>
        let capabilities_1 = buf.get_u16::<LittleEndian>()?;
        let mut capabilities = Capabilities::from_bits_truncate(capabilities_1.into());

        // character_set : int<1>
        let collation = buf.get_u8()?;

        // status_flags : int<2>
        let status = Status::from_bits_truncate(buf.get_u16::<LittleEndian>()?);

        // capability_flags_2 : int<2>
        let capabilities_2 = buf.get_u16::<LittleEndian>()?;
        capabilities |= Capabilities::from_bits_truncate(u64::from(capabilities_2) << 16);

        let auth_plugin_data_len = if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            // length of auth-plugin-data : int<1>
            buf.get_u8()?
        } else {
            // 0x00 : int<1>
            buf.advance(1)?;
            0
        };

        // reserved : string<10>
        buf.advance(10)?;

        let (auth_plugin_data_2, auth_plugin_name) =
            if capabilities.contains(Capabilities::PLUGIN_AUTH) {
                let len = ((auth_plugin_data_len as isize) - 8).max(13) as usize;
                let data_2 = Bytes::copy_from_slice(buf.get_bytes(len)?);
                let name: Box<str> = buf.get_str_nul()?.into();

                (data_2, Some(name))
            } else {
                (Bytes::new(), None)
            };

        Ok(Self {
            protocol_version,
            server_version,
            connection_id,
            auth_plugin_data_1,
            capabilities,
            collation,
            status,
            auth_plugin_data_len,
            auth_plugin_data_2,
            auth_plugin_name,
        })
    }
}

impl Encode for Handshake {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(self.protocol_version);
        buf.put_str_nul(&self.server_version);
        buf.put_u32::<LittleEndian>(self.connection_id);

        buf.put_bytes(&self.auth_plugin_data_1);

        // filler : int<1>
        buf.put_u8(0);

        buf.put_u16::<LittleEndian>(self.capabilities.bits() as u16);
        buf.put_u8(self.collation);
        buf.put_u16::<LittleEndian>(self.status.bits());
        buf.put_u16::<LittleEndian>((self.capabilities.bits() >> 16) as u16);

        if self.capabilities.contains(Capabilities::PLUGIN_AUTH) {
            buf.put_u8(self.auth_plugin_data_len);
        } else {
            buf.put_u8(0);
        }

        // reserved : string<10>
        buf.advance(10);

        if self.capabilities.contains(Capabilities::PLUGIN_AUTH) {
            buf.put_bytes(&self.auth_plugin_data_2);

            if let Some(name) = &self.auth_plugin_name {
                buf.put_str_nul(name);
            }
        }
    }
}
