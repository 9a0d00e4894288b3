//! Protocol engines self-register here under a short tag so the interceptor
//! can probe an unknown byte stream against every known protocol.

use std::collections::HashMap;
use std::sync::Arc;

use futures_core::future::BoxFuture;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::Result;
use crate::net::{ByteStream, Shutdown};
use crate::options::SessionOptions;
use crate::store::{MockSink, MockStore};

/// One protocol engine: identification, recording, and replay.
pub trait Integration: Send + Sync {
    fn name(&self) -> &'static str;

    /// Framing-based identification of the initial client bytes. Never a
    /// content heuristic.
    fn match_type(&self, buf: &[u8]) -> bool;

    /// Record mode: pump bytes between `client` and `upstream` unchanged,
    /// decode both directions, and emit one [`crate::mock::Mock`] per
    /// completed semantic exchange.
    fn record_outgoing<'a>(
        &'a self,
        client: Box<dyn ByteStream>,
        upstream: Box<dyn ByteStream>,
        sink: MockSink,
        shutdown: Shutdown,
        opts: SessionOptions,
    ) -> BoxFuture<'a, Result<()>>;

    /// Replay mode: terminate the client leg and synthesize responses from
    /// the store. There is no upstream.
    fn mock_outgoing<'a>(
        &'a self,
        client: Box<dyn ByteStream>,
        store: Arc<dyn MockStore>,
        shutdown: Shutdown,
        opts: SessionOptions,
    ) -> BoxFuture<'a, Result<()>>;
}

type Factory = fn() -> Arc<dyn Integration>;

static REGISTRY: Lazy<RwLock<HashMap<&'static str, Factory>>> = Lazy::new(|| {
    let mut map = HashMap::<&'static str, Factory>::new();

    #[cfg(feature = "mysql")]
    map.insert("mysql", || Arc::new(crate::mysql::MySql));

    #[cfg(feature = "mongo")]
    map.insert("mongo", || Arc::new(crate::mongo::Mongo));

    RwLock::new(map)
});

/// Look up an engine by its registered tag (`"mysql"`, `"mongo"`).
pub fn get(name: &str) -> Option<Arc<dyn Integration>> {
    REGISTRY.read().get(name).map(|factory| factory())
}

/// Register an out-of-tree engine. Last registration for a tag wins.
pub fn register(name: &'static str, factory: Factory) {
    REGISTRY.write().insert(name, factory);
}

/// Every registered engine, for protocol probing.
pub fn all() -> Vec<Arc<dyn Integration>> {
    REGISTRY.read().values().map(|factory| factory()).collect()
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(all(feature = "mysql", feature = "mongo"))]
    fn built_in_engines_are_registered() {
        assert!(super::get("mysql").is_some());
        assert!(super::get("mongo").is_some());
        assert!(super::get("postgres").is_none());
        assert_eq!(super::all().len(), 2);
    }
}
