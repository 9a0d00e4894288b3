//! Core of `rewind`, the record/replay proxy for stateful database wire
//! protocols.
//!
//! The crate is organized per protocol, the way `sqlx-core` is organized per
//! database: [`mysql`] and [`mongo`] each carry their wire codecs, a
//! per-connection decode context, and the recorder/replayer pipelines. The
//! shared spine is the checked [`io`] primitives, the [`net`] stream seam,
//! and the [`mock`] data model handed to the store collaborator.

#[macro_use]
pub mod error;

pub mod integration;
pub mod io;
pub mod mock;
pub mod net;
pub mod options;
pub mod store;

#[cfg(feature = "mysql")]
pub mod sql;

#[cfg(feature = "mongo")]
pub mod mongo;

#[cfg(feature = "mysql")]
pub mod mysql;
