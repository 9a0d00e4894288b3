use std::time::SystemTime;

use futures_core::future::BoxFuture;

use crate::error::Result;
use crate::net::ByteStream;

/// Collaborator that performs TLS handshakes when a MySQL client sends
/// `SSLRequest`. The core is TLS-agnostic: it hands over the raw stream and
/// continues on whatever comes back.
pub trait TlsProvider: Send + Sync {
    /// Server-side upgrade of the client leg. `backdate` is forwarded for
    /// certificate generation.
    fn upgrade_accept<'a>(
        &'a self,
        stream: Box<dyn ByteStream>,
        backdate: Option<SystemTime>,
    ) -> BoxFuture<'a, Result<Box<dyn ByteStream>>>;

    /// Client-side upgrade of the upstream leg. `sni` carries the replay-mode
    /// destination identity.
    fn upgrade_connect<'a>(
        &'a self,
        stream: Box<dyn ByteStream>,
        sni: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn ByteStream>>>;
}
