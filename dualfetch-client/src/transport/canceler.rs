//! Tracking of in-flight requests for cancellation.
//!
//! Every request a backend sends is registered with a [`PendingRegistry`]
//! for as long as it is in flight. A request carrying a dedupe key cancels
//! any in-flight request with the same key when it registers, and
//! [`PendingRegistry::cancel_all`] aborts everything at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

struct Entry {
    key: Option<String>,
    token: CancellationToken,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<u64, Entry>>,
    next_id: AtomicU64,
}

/// Registry of in-flight requests.
#[derive(Clone, Default)]
pub struct PendingRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PendingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRegistry")
            .field("pending", &self.len())
            .finish()
    }
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an in-flight request.
    ///
    /// If `key` is set, in-flight requests with the same key are cancelled
    /// first. The entry is removed when the returned guard drops.
    pub fn register(&self, key: Option<String>, token: CancellationToken) -> PendingGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries();

        if let Some(key) = &key {
            let superseded: Vec<u64> = entries
                .iter()
                .filter(|(_, entry)| entry.key.as_ref() == Some(key))
                .map(|(id, _)| *id)
                .collect();
            for old in superseded {
                if let Some(entry) = entries.remove(&old) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(key = %key, "cancelling superseded request");
                    entry.token.cancel();
                }
            }
        }

        entries.insert(id, Entry { key, token });
        PendingGuard {
            registry: self.clone(),
            id,
        }
    }

    /// Cancel every in-flight request, returning how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Entry> = self.entries().drain().map(|(_, entry)| entry).collect();
        for entry in &drained {
            entry.token.cancel();
        }
        drained.len()
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its registry entry on drop.
pub struct PendingGuard {
    registry: PendingRegistry,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.registry.entries().remove(&self.id);
    }
}
