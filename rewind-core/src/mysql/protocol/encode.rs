use crate::mysql::protocol::Capabilities;

/// Exact inverse of [`super::Decode`]: re-encode a payload (unframed) under
/// the same capabilities it was decoded with.
pub trait Encode {
    fn encode_with(&self, buf: &mut Vec<u8>, capabilities: Capabilities);

    fn encode(&self, buf: &mut Vec<u8>) {
        self.encode_with(buf, Capabilities::empty());
    }
}

impl Encode for &'_ [u8] {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.extend_from_slice(self);
    }
}
