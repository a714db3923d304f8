use tokio::sync::broadcast;
use uuid::Uuid;

/// Attribute names the edit session reads and writes on content nodes.
pub const ATTR_SRC: &str = "src";
pub const ATTR_SRCSET: &str = "srcset";
pub const ATTR_SIZES: &str = "sizes";
pub const ATTR_WIDTH: &str = "width";
pub const ATTR_HEIGHT: &str = "height";
pub const ATTR_ALT: &str = "alt";
pub const ATTR_ASSET_ID: &str = "assetId";

/// Stable identity of a content node.
///
/// Sessions hold these instead of node references: the document owns node
/// lifecycles, and a deleted node simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Changes the coordinator observes on the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentChange {
    NodeRemoved(NodeId),
    NodeReplaced { old: NodeId, new: NodeId },
}

/// What `replace_node` builds the replacement from.
///
/// The replace is a single transaction on the document side: either the new
/// node lands with the preserved children and selection, or nothing changes.
#[derive(Debug, Clone)]
pub struct ReplaceSpec {
    pub attributes: Vec<(String, String)>,
    pub preserve_children: bool,
    pub preserve_selection: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("node no longer exists in the document")]
    NodeGone,
}

/// The host editor's document model, as the edit session sees it.
///
/// Implementations are external collaborators; this crate only ships an
/// in-memory one for tests (see `testkit`).
pub trait DocumentModel: Send + Sync + 'static {
    /// The node the user currently has selected, if any.
    fn selected_node(&self) -> Option<NodeId>;

    /// Whether a node still exists.
    fn contains(&self, node: NodeId) -> bool;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// Set (`Some`) or clear (`None`) an attribute. A vanished node is a
    /// silent no-op; attribute writes are best-effort optimistic UI.
    fn set_attribute(&self, node: NodeId, name: &str, value: Option<String>);

    /// Atomically replace a node with a new one carrying `spec.attributes`.
    fn replace_node(&self, old: NodeId, spec: ReplaceSpec) -> Result<NodeId, DocumentError>;

    /// Subscribe to document changes (used for deletion detection).
    fn subscribe(&self) -> broadcast::Receiver<DocumentChange>;
}
