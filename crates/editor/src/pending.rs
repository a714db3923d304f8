use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

/// A user-visible "operation in progress" marker.
///
/// One exists for every edit session in its saving/polling phase; the list
/// length always equals the count of such sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub id: Uuid,
    pub message: String,
}

/// Shared, observable list of pending actions.
#[derive(Debug, Clone)]
pub struct PendingActions {
    tx: Arc<watch::Sender<Vec<PendingAction>>>,
}

impl PendingActions {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx: Arc::new(tx) }
    }

    pub fn add(&self, message: impl Into<String>) -> Uuid {
        let action = PendingAction {
            id: Uuid::new_v4(),
            message: message.into(),
        };
        let id = action.id;
        self.tx.send_modify(|list| list.push(action));
        id
    }

    pub fn remove(&self, id: Uuid) {
        self.tx.send_modify(|list| list.retain(|a| a.id != id));
    }

    pub fn clear(&self) {
        self.tx.send_modify(|list| list.clear());
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Watch the list; the receiver sees every mutation.
    pub fn watch(&self) -> watch::Receiver<Vec<PendingAction>> {
        self.tx.subscribe()
    }
}

impl Default for PendingActions {
    fn default() -> Self {
        Self::new()
    }
}
