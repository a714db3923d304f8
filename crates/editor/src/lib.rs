/**
 * The seam to the asset service: what the edit
 *  session needs from a backend, implemented for
 *  the service client.
 */
pub mod backend;
/**
 * The seam to the host editor's document model.
 * Nodes are addressed by stable ids, never owned:
 *  deletion detection is a lookup miss, not a
 *  dangling reference.
 */
pub mod document;
/**
 * Session lifecycle events exposed to the host.
 */
pub mod events;
/**
 * User-facing notification seam.
 */
pub mod notify;
/**
 * Observable "operation in progress" markers.
 */
pub mod pending;
/**
 * The process-wide registry of in-flight edit
 *  sessions, used for command gating.
 */
pub mod registry;
/**
 * The edit-session coordinator and state machine:
 *  open, external edit, save, poll, apply.
 */
pub mod session;
/**
 * The seam to the external editing surface (the
 *  dialog the user edits the image in).
 */
pub mod surface;
/**
 * In-memory fakes for tests: a document model, a
 *  scripted backend, a counting surface, and a
 *  recording notifier.
 */
pub mod testkit;

pub mod prelude {
    pub use crate::backend::{AssetBackend, AssetPoll, BackendError, EditTarget, ProcessedAsset, SavedAsset};
    pub use crate::document::{DocumentChange, DocumentError, DocumentModel, NodeId, ReplaceSpec};
    pub use crate::events::SessionEvent;
    pub use crate::notify::Notifier;
    pub use crate::pending::{PendingAction, PendingActions};
    pub use crate::registry::InFlightRegistry;
    pub use crate::session::{EditConfig, EditCoordinator};
    pub use crate::surface::{EditOptions, EditorSurface};
}
