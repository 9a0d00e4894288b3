//! `rewind` sits between an application under test and its databases. In
//! record mode it observes client/server traffic and emits durable mocks; in
//! replay mode it terminates the client side and answers from the mock
//! store.
//!
//! This crate is a facade over `rewind-core`; see that crate for the
//! protocol engines.

pub use rewind_core::error::{Error, Result};
pub use rewind_core::integration::{self, Integration};
pub use rewind_core::mock::{Clock, Mock, MockKind, PacketBundle, Request, Response, SystemClock};
pub use rewind_core::net::{ByteStream, Shutdown, ShutdownSignal, StreamId, TlsProvider};
pub use rewind_core::options::{DstAddr, SessionOptions};
pub use rewind_core::store::{InMemoryMockStore, MockSink, MockStore};

#[cfg(feature = "mongo")]
pub use rewind_core::mongo;

#[cfg(feature = "mysql")]
pub use rewind_core::mysql;
