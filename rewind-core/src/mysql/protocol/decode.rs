use crate::error::Result;
use crate::mysql::protocol::Capabilities;

/// Structural decode of one packet payload, under the connection's
/// negotiated capabilities.
pub trait Decode: Sized {
    fn decode_with(buf: &[u8], capabilities: Capabilities) -> Result<Self>;

    fn decode(buf: &[u8]) -> Result<Self> {
        Self::decode_with(buf, Capabilities::empty())
    }
}
