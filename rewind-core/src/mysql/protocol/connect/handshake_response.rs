use byteorder::LittleEndian;
use bytes::Bytes;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::io::{BufExt, BufMutExt};
use crate::mysql::protocol::{Capabilities, Decode, Encode};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_handshake_response.html
// https://mariadb.com/kb/en/connection/#handshake-response-packet
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeResponse {
    /// The client's announced capabilities; these gate every optional tail
    /// field below and all later response parsing on this connection.
    pub capabilities: Capabilities,
    pub max_packet_size: u32,
    pub collation: u8,
    pub username: Box<str>,
    pub auth_response: Bytes,
    pub database: Option<Box<str>>,
    pub auth_plugin_name: Option<Box<str>>,
    pub connect_attrs: Vec<(Box<str>, Box<str>)>,
    pub zstd_compression_level: Option<u8>,
}

impl HandshakeResponse {
    /// An `SSLRequest` is the 32-byte prefix of a handshake response
    /// (4 + 4 + 1 + 23) with `CLIENT_SSL` set; size is the discriminator.
    pub fn is_ssl_request(payload: &[u8]) -> bool {
        if payload.len() != 32 {
            return false;
        }

        let mut buf = payload;
        match buf.get_u32::<LittleEndian>() {
            Ok(bits) => Capabilities::from_bits_truncate(bits.into()).contains(Capabilities::SSL),
            Err(_) => false,
        }
    }
}

impl Decode for HandshakeResponse {
    fn decode_with(mut buf: &[u8], _: Capabilities) -> Result<Self> {
        // client capabilities : int<4>
        let capabilities =
            Capabilities::from_bits_truncate(u64::from(buf.get_u32::<LittleEndian>()?));

        // max packet size : int<4>
        let max_packet_size = buf.get_u32::<LittleEndian>()?;

        // character collation : int<1>
        let collation = buf.get_u8()?;

        // reserved : string<23>
        buf.advance(23)?;

        // username : string<NUL>
        let username: Box<str> = buf.get_str_nul()?.into();

        let auth_response = if capabilities.contains(Capabilities::PLUGIN_AUTH_LENENC_DATA) {
            // auth_response : string<lenenc>
            Bytes::copy_from_slice(buf.get_bytes_lenenc()?.unwrap_or_default())
        } else {
            // auth_response_length : int<1>
            let len = buf.get_u8()?;

            // auth_response : string<{auth_response_length}>
            Bytes::copy_from_slice(buf.get_bytes(len as usize)?)
        };

        let database = if capabilities.contains(Capabilities::CONNECT_WITH_DB) {
            // database : string<NUL>
            Some(buf.get_str_nul()?.into())
        } else {
            None
        };

        let auth_plugin_name = if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            // client_plugin_name : string<NUL>
            Some(buf.get_str_nul()?.into())
        } else {
            None
        };

        let mut connect_attrs = Vec::new();
        if capabilities.contains(Capabilities::CONNECT_ATTRS) {
            // length of all key/value pairs : int<lenenc>
            let total = buf.get_uint_lenenc()?.unwrap_or(0) as usize;
            let mut attrs = buf.get_bytes(total)?;

            while !attrs.is_empty() {
                let key: Box<str> = attrs.get_str_lenenc()?.unwrap_or_default().into();
                let value: Box<str> = attrs.get_str_lenenc()?.unwrap_or_default().into();
                connect_attrs.push((key, value));
            }
        }

        let zstd_compression_level =
            if capabilities.contains(Capabilities::ZSTD_COMPRESSION_ALGORITHM) {
                Some(buf.get_u8()?)
            } else {
                None
            };

        Ok(Self {
            capabilities,
            max_packet_size,
            collation,
            username,
            auth_response,
            database,
            auth_plugin_name,
            connect_attrs,
            zstd_compression_level,
        })
    }
}

impl Encode for HandshakeResponse {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        let capabilities = self.capabilities;

        buf.put_u32::<LittleEndian>(capabilities.bits() as u32);
        buf.put_u32::<LittleEndian>(self.max_packet_size);
        buf.put_u8(self.collation);

        // reserved : string<23>
        buf.advance(23);

        buf.put_str_nul(&self.username);

        if capabilities.contains(Capabilities::PLUGIN_AUTH_LENENC_DATA) {
            buf.put_bytes_lenenc(&self.auth_response);
        } else {
            buf.put_u8(self.auth_response.len() as u8);
            buf.put_bytes(&self.auth_response);
        }

        if capabilities.contains(Capabilities::CONNECT_WITH_DB) {
            buf.put_str_nul(self.database.as_deref().unwrap_or(""));
        }

        if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            buf.put_str_nul(self.auth_plugin_name.as_deref().unwrap_or(""));
        }

        if capabilities.contains(Capabilities::CONNECT_ATTRS) {
            let mut attrs = Vec::new();
            for (key, value) in &self.connect_attrs {
                attrs.put_str_lenenc(key);
                attrs.put_str_lenenc(value);
            }

            buf.put_uint_lenenc(attrs.len() as u64);
            buf.put_bytes(&attrs);
        }

        if capabilities.contains(Capabilities::ZSTD_COMPRESSION_ALGORITHM) {
            buf.put_u8(self.zstd_compression_level.unwrap_or(0));
        }
    }
}
