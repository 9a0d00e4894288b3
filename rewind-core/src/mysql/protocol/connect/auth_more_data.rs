use bytes::Bytes;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::protocol::{Capabilities, Decode, Encode};

/// Extra authentication data (0x01-framed). For `caching_sha2_password` the
/// one-byte payloads 0x03/0x04 select the fast and full sub-states; a longer
/// payload carries the server's PEM public key during full auth.
// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_auth_more_data.html
#[derive(Debug, Clone, PartialEq)]
pub struct AuthMoreData {
    pub data: Bytes,
}

impl AuthMoreData {
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    pub const PERFORM_FULL_AUTHENTICATION: u8 = 0x04;

    pub fn is_fast_auth_success(&self) -> bool {
        self.data.as_ref() == [Self::FAST_AUTH_SUCCESS]
    }

    pub fn is_full_authentication(&self) -> bool {
        self.data.as_ref() == [Self::PERFORM_FULL_AUTHENTICATION]
    }
}

impl Decode for AuthMoreData {
    fn decode_with(mut buf: &[u8], _: Capabilities) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0x01 {
            return Err(err_protocol!(
                "expected AuthMoreData (0x01); received 0x{:02X}",
                header
            ));
        }

        Ok(Self {
            data: Bytes::copy_from_slice(buf),
        })
    }
}

impl Encode for AuthMoreData {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0x01);
        buf.put_bytes(&self.data);
    }
}
