mod buf_ext;
mod buf_mut_ext;

pub use buf_ext::{length_encoded_int, BufExt};
pub use buf_mut_ext::BufMutExt;
