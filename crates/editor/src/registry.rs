use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::document::NodeId;

/// The process-wide set of in-flight edit sessions, keyed by target node.
///
/// Injected into the coordinator rather than ambient: whoever owns the
/// editor owns the registry. Commands consult it to disable themselves for
/// nodes currently being processed. The map never holds two sessions for
/// the same node.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    inner: Arc<Mutex<HashMap<NodeId, Uuid>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a node for a session. Returns false when another session
    /// already holds it.
    pub fn try_insert(&self, node: NodeId, session: Uuid) -> bool {
        match self.inner.lock().entry(node) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(session);
                true
            }
        }
    }

    /// Release a node, but only for the session that claimed it.
    pub fn remove(&self, node: NodeId, session: Uuid) {
        let mut map = self.inner.lock();
        if map.get(&node) == Some(&session) {
            map.remove(&node);
        }
    }

    pub fn is_processing(&self, node: NodeId) -> bool {
        self.inner.lock().contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
