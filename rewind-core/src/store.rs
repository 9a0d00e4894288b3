//! The seam between the engine and mock persistence.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::mock::Mock;

/// Recorder output channel. The far end is owned by whatever persists mocks.
pub type MockSink = tokio::sync::mpsc::Sender<Mock>;

/// Replay-side source of recorded mocks.
///
/// `get_unfiltered_mocks` yields the candidates the matcher may consider, in
/// insertion order, excluding mocks already marked consumed.
/// `update_unfiltered_mock` marks a matched mock consumed so a repeated
/// request prefers fresh recordings; marking is idempotent and must not race
/// across connections.
pub trait MockStore: Send + Sync {
    fn get_unfiltered_mocks(&self) -> Vec<Arc<Mock>>;

    /// Returns `false` when `old` is unknown or already consumed.
    fn update_unfiltered_mock(&self, old: &Arc<Mock>, new: Mock) -> bool;
}

struct Entry {
    mock: Arc<Mock>,
    consumed: bool,
}

/// Insertion-ordered store backed by process memory. The reference
/// implementation used by the replayer tests; production stores live outside
/// the core.
#[derive(Default)]
pub struct InMemoryMockStore {
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryMockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, mock: Mock) {
        self.entries.write().push(Entry {
            mock: Arc::new(mock),
            consumed: false,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl MockStore for InMemoryMockStore {
    fn get_unfiltered_mocks(&self) -> Vec<Arc<Mock>> {
        self.entries
            .read()
            .iter()
            .filter(|entry| !entry.consumed)
            .map(|entry| Arc::clone(&entry.mock))
            .collect()
    }

    fn update_unfiltered_mock(&self, old: &Arc<Mock>, new: Mock) -> bool {
        let mut entries = self.entries.write();

        for entry in entries.iter_mut() {
            if Arc::ptr_eq(&entry.mock, old) {
                if entry.consumed {
                    return false;
                }

                entry.mock = Arc::new(new);
                entry.consumed = true;
                return true;
            }
        }

        false
    }
}
