use bytes::Bytes;

use crate::error::Result;
use crate::io::{Buf, BufMut};
use crate::mysql::protocol::{Capabilities, Decode, Encode};

/// Server demand to restart authentication with a different plugin. The
/// client answers with an opaque `AuthSwitchResponse` payload.
// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_auth_switch_request.html
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSwitchRequest {
    pub plugin_name: Box<str>,
    pub data: Bytes,
}

impl Decode for AuthSwitchRequest {
    fn decode_with(mut buf: &[u8], _: Capabilities) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0xFE {
            return Err(err_protocol!(
                "expected AuthSwitchRequest (0xFE); received 0x{:02X}",
                header
            ));
        }

        let plugin_name: Box<str> = buf.get_str_nul()?.into();
        let data = Bytes::copy_from_slice(buf);

        Ok(Self { plugin_name, data })
    }
}

impl Encode for AuthSwitchRequest {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0xFE);
        buf.put_str_nul(&self.plugin_name);
        buf.put_bytes(&self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthSwitchRequest, Decode, Encode};

    const AUTH_SWITCH_NATIVE: &[u8] = b"\xfemysql_native_password\x00abcdefgh12345678abcd\x00";

    #[test]
    fn it_decodes_and_round_trips() {
        let p = AuthSwitchRequest::decode(AUTH_SWITCH_NATIVE).unwrap();

        assert_eq!(&*p.plugin_name, "mysql_native_password");
        assert_eq!(&p.data[..], b"abcdefgh12345678abcd\x00");

        let mut buf = Vec::new();
        p.encode(&mut buf);
        assert_eq!(&buf[..], AUTH_SWITCH_NATIVE);
    }
}
