use crate::document::NodeId;

/// Session lifecycle events exposed to the host editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Server-side processing finished and the target node was replaced.
    Processed {
        node: NodeId,
        new_node: NodeId,
        asset_id: String,
    },
    /// The session failed terminally; the user was warned at most once.
    Failed { node: NodeId },
    /// The session was cancelled, by an explicit close, by deletion of the
    /// target node, or by teardown. Never reported as an error.
    Aborted { node: NodeId },
}

impl SessionEvent {
    pub fn node(&self) -> NodeId {
        match self {
            SessionEvent::Processed { node, .. }
            | SessionEvent::Failed { node }
            | SessionEvent::Aborted { node } => *node,
        }
    }
}
