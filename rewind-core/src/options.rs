use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::net::TlsProvider;

/// Replay-mode upstream identity, used for SNI when the client upgrades to
/// TLS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DstAddr {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for DstAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Per-session knobs recognized by both engines. Builder-style setters; the
/// zero value is valid for plain-TCP, auth-less traffic.
#[derive(Clone, Default)]
pub struct SessionOptions {
    pub(crate) backdate: Option<SystemTime>,
    pub(crate) dst: Option<DstAddr>,
    pub(crate) password: Option<String>,
    pub(crate) tls: Option<Arc<dyn TlsProvider>>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point in time certificates should be generated at, forwarded to the
    /// TLS provider.
    pub fn backdate(mut self, at: SystemTime) -> Self {
        self.backdate = Some(at);
        self
    }

    pub fn dst(mut self, dst: DstAddr) -> Self {
        self.dst = Some(dst);
        self
    }

    /// Database user password; required by the MongoDB SCRAM rewriter in
    /// replay mode.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn tls(mut self, tls: Arc<dyn TlsProvider>) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn get_backdate(&self) -> Option<SystemTime> {
        self.backdate
    }

    pub fn get_dst(&self) -> Option<&DstAddr> {
        self.dst.as_ref()
    }

    pub fn get_password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn get_tls(&self) -> Option<&Arc<dyn TlsProvider>> {
        self.tls.as_ref()
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("backdate", &self.backdate)
            .field("dst", &self.dst)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tls", &self.tls.is_some())
            .finish()
    }
}
