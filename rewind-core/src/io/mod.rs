mod buf;
mod buf_mut;

pub use buf::Buf;
pub use buf_mut::BufMut;
