mod shutdown;
mod stream;
mod tls;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use stream::{ByteStream, StreamId};
pub use tls::TlsProvider;

pub(crate) use stream::write_all;
