//! The in-memory shape of a recorded exchange.
//!
//! One [`Mock`] is one semantic request/response pair (or the whole
//! connection handshake, for `type=config` mocks). How mocks are persisted is
//! the store collaborator's concern; the engine only produces and consumes
//! this form.

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::net::StreamId;

/// Version tag stamped on every emitted mock.
pub const MOCK_VERSION: &str = "api.rewind.io/v1";

/// Metadata key distinguishing handshake/heartbeat traffic from data traffic.
pub const META_TYPE: &str = "type";
pub const META_TYPE_CONFIG: &str = "config";
pub const META_TYPE_MOCKS: &str = "mocks";

/// Metadata keys carrying the operation labels of the first request/response.
pub const META_REQUEST_OPERATION: &str = "requestOperation";
pub const META_RESPONSE_OPERATION: &str = "responseOperation";

/// Protocol family of a mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MockKind {
    MySql,
    Mongo,
}

impl MockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MockKind::MySql => "mysql",
            MockKind::Mongo => "mongo",
        }
    }
}

impl fmt::Display for MockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire header of a decoded packet, by protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum WireHeader {
    #[cfg(feature = "mysql")]
    MySql(crate::mysql::protocol::PacketHeader),

    #[cfg(feature = "mongo")]
    Mongo(crate::mongo::protocol::MessageHeader),
}

/// Decoded packet body, by protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    #[cfg(feature = "mysql")]
    MySql(crate::mysql::protocol::Message),

    #[cfg(feature = "mongo")]
    Mongo(crate::mongo::protocol::Message),
}

/// A decoded packet: header, canonical type tag, and the typed message.
///
/// The tag is drawn from a closed per-protocol set so consumers can dispatch
/// without inspecting the message variant.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketBundle {
    pub header: WireHeader,
    pub type_tag: &'static str,
    pub message: WireMessage,
}

/// A request-side packet plus per-exchange metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub bundle: PacketBundle,
    pub connection: StreamId,
    pub at: SystemTime,
    pub operation: Box<str>,
}

/// A response-side packet plus per-exchange metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub bundle: PacketBundle,
    pub connection: StreamId,
    pub at: SystemTime,
    pub operation: Box<str>,
}

/// A durable record of one semantic exchange.
#[derive(Debug, Clone)]
pub struct Mock {
    pub version: Box<str>,
    pub kind: MockKind,

    /// Unique within a test-set; assigned by the recorder ("mock-<n>").
    pub name: String,

    pub metadata: HashMap<String, String>,

    pub requests: Vec<Request>,
    pub responses: Vec<Response>,

    pub created: SystemTime,

    /// Timestamps of the first request/last response, used for temporal
    /// filtering by replay-side stores.
    pub req_timestamp: SystemTime,
    pub res_timestamp: SystemTime,
}

impl Mock {
    pub fn new(kind: MockKind, name: String, now: SystemTime) -> Self {
        Mock {
            version: MOCK_VERSION.into(),
            kind,
            name,
            metadata: HashMap::new(),
            requests: Vec::new(),
            responses: Vec::new(),
            created: now,
            req_timestamp: now,
            res_timestamp: now,
        }
    }

    /// Handshake/heartbeat traffic; replayed once per connection rather than
    /// consumed in request order.
    pub fn is_config(&self) -> bool {
        self.metadata.get(META_TYPE).map(String::as_str) == Some(META_TYPE_CONFIG)
    }

    pub fn set_kind_meta(&mut self, config: bool) {
        self.metadata.insert(
            META_TYPE.to_owned(),
            if config { META_TYPE_CONFIG } else { META_TYPE_MOCKS }.to_owned(),
        );
    }
}

/// Assemble one mock from a completed exchange, stamping metadata and the
/// request/response timestamps used for temporal filtering in replay.
pub fn build_mock(
    kind: MockKind,
    config: bool,
    requests: Vec<Request>,
    responses: Vec<Response>,
    clock: &dyn Clock,
) -> Mock {
    let mut mock = Mock::new(kind, next_mock_name(), clock.now());
    mock.set_kind_meta(config);

    if let Some(request) = requests.first() {
        mock.metadata
            .insert(META_REQUEST_OPERATION.to_owned(), request.operation.to_string());
        mock.req_timestamp = request.at;
    }

    if let Some(response) = responses.last() {
        mock.metadata.insert(
            META_RESPONSE_OPERATION.to_owned(),
            response.operation.to_string(),
        );
        mock.res_timestamp = response.at;
    }

    mock.requests = requests;
    mock.responses = responses;

    mock
}

/// Mock names are unique within a test-set; one process records one set.
pub fn next_mock_name() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT: AtomicU64 = AtomicU64::new(0);

    format!("mock-{}", NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Injectable time source so recorder output is deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
