use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::{AssetBackend, AssetPoll, BackendError, EditTarget, ProcessedAsset, SavedAsset};
use crate::document::{
    DocumentChange, DocumentError, DocumentModel, NodeId, ReplaceSpec, ATTR_ALT, ATTR_ASSET_ID,
    ATTR_HEIGHT, ATTR_SIZES, ATTR_SRC, ATTR_SRCSET, ATTR_WIDTH,
};
use crate::events::SessionEvent;
use crate::notify::Notifier;
use crate::pending::PendingActions;
use crate::registry::InFlightRegistry;
use crate::surface::EditorSurface;

const PROCESSING_MESSAGE: &str = "Processing the edited image.";
const PREPARE_FAILED_MESSAGE: &str = "Failed to open the image editor. Please try again later.";
const PROCESSING_FAILED_MESSAGE: &str =
    "Server failed to process the image. Please try again later.";

#[derive(Debug, Clone)]
pub struct EditConfig {
    /// Maximum processing-status poll attempts per session.
    pub max_poll_attempts: u32,
    /// Base delay between poll attempts; the n-th wait is `base * n`.
    pub poll_backoff: Duration,
    /// Settle delay before the post-close UI refresh.
    pub refresh_delay: Duration,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: 5,
            poll_backoff: Duration::from_millis(500),
            refresh_delay: Duration::from_millis(100),
        }
    }
}

impl EditConfig {
    /// Adopt the poll policy the service client was configured with.
    pub fn from_service(config: &client::config::ServiceConfig) -> Self {
        Self {
            max_poll_attempts: config.poll_attempts,
            poll_backoff: config.poll_backoff,
            ..Self::default()
        }
    }
}

/// The edit dialog currently owned by the coordinator. At most one exists.
struct Dialog {
    node: NodeId,
    generation: u64,
    cancel: CancellationToken,
    /// True once preparation settled and the surface was mounted, i.e. the
    /// session is waiting for the external editor.
    mounted: bool,
}

/// Bookkeeping for a session in its saving/polling phase.
struct ActiveSession {
    id: Uuid,
    cancel: CancellationToken,
}

/// Width/height attributes as they were before the optimistic update, so a
/// failed or aborted session can restore the pre-edit rendering.
#[derive(Debug, Clone)]
struct PriorSize {
    width: Option<String>,
    height: Option<String>,
}

/// Coordinates external-edit-and-reprocess cycles for content nodes.
///
/// One open dialog at a time; any number of sessions may be processing
/// concurrently, at most one per target node. All asynchronous work runs on
/// cooperative tasks carrying child tokens of the coordinator's shutdown
/// token, so disposal cancels everything outstanding.
pub struct EditCoordinator {
    document: Arc<dyn DocumentModel>,
    backend: Arc<dyn AssetBackend>,
    surface: Arc<dyn EditorSurface>,
    notifier: Arc<dyn Notifier>,
    registry: InFlightRegistry,
    pending: PendingActions,
    events: broadcast::Sender<SessionEvent>,
    config: EditConfig,
    shutdown: CancellationToken,
    dialog: Mutex<Option<Dialog>>,
    active: Mutex<HashMap<NodeId, ActiveSession>>,
    generation: AtomicU64,
}

impl EditCoordinator {
    pub fn new(
        document: Arc<dyn DocumentModel>,
        backend: Arc<dyn AssetBackend>,
        surface: Arc<dyn EditorSurface>,
        notifier: Arc<dyn Notifier>,
        registry: InFlightRegistry,
        config: EditConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        let coordinator = Arc::new(Self {
            document,
            backend,
            surface,
            notifier,
            registry,
            pending: PendingActions::new(),
            events,
            config,
            shutdown: CancellationToken::new(),
            dialog: Mutex::new(None),
            active: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        });
        coordinator.clone().spawn_document_watcher();
        coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn pending_actions(&self) -> &PendingActions {
        &self.pending
    }

    pub fn registry(&self) -> &InFlightRegistry {
        &self.registry
    }

    /// Whether a session is currently processing this node. Commands that
    /// would re-trigger editing must report themselves disabled when true.
    pub fn is_processing(&self, node: NodeId) -> bool {
        self.registry.is_processing(node)
    }

    /// Request an edit for a node.
    ///
    /// Re-opening the node already waiting on the external editor is a
    /// no-op. Opening while an older preparation is still in flight abandons
    /// it: only the latest open proceeds.
    pub fn open(self: &Arc<Self>, node: NodeId) {
        if self.shutdown.is_cancelled() {
            return;
        }
        if self.registry.is_processing(node) {
            tracing::debug!(%node, "node already has a session in flight; open ignored");
            return;
        }
        if !self.document.contains(node) {
            return;
        }

        let (cancel, generation) = {
            let mut dialog = self.dialog.lock();
            if let Some(current) = dialog.as_ref() {
                if current.node == node && current.mounted {
                    // Already waiting for the external editor.
                    return;
                }
            }
            if let Some(previous) = dialog.take() {
                previous.cancel.cancel();
                if previous.mounted {
                    self.surface.unmount();
                }
            }

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let cancel = self.shutdown.child_token();
            *dialog = Some(Dialog {
                node,
                generation,
                cancel: cancel.clone(),
                mounted: false,
            });
            (cancel, generation)
        };

        let this = self.clone();
        tokio::spawn(async move {
            this.prepare(node, generation, cancel).await;
        });
    }

    /// Request an edit for the node the user currently has selected, if any.
    pub fn open_selected(self: &Arc<Self>) {
        if let Some(node) = self.document.selected_node() {
            self.open(node);
        }
    }

    /// Close the edit dialog, if one is open. Silent: closing is a user
    /// action, not an error.
    pub fn close(self: &Arc<Self>) {
        let node = {
            let mut dialog = self.dialog.lock();
            match dialog.take() {
                Some(d) => {
                    d.cancel.cancel();
                    if d.mounted {
                        self.surface.unmount();
                    }
                    Some(d.node)
                }
                None => None,
            }
        };

        let Some(node) = node else { return };
        let _ = self.events.send(SessionEvent::Aborted { node });
        self.schedule_refresh();
    }

    /// Abort the processing session for a node, if one is in flight.
    pub fn abort(&self, node: NodeId) {
        if let Some(active) = self.active.lock().get(&node) {
            active.cancel.cancel();
        }
    }

    /// The external editor saved an edited asset. The dialog's target node
    /// enters the saving/polling phase.
    pub fn saved(self: &Arc<Self>, asset: SavedAsset) {
        let node = {
            let mut dialog = self.dialog.lock();
            match dialog.take() {
                Some(d) if d.mounted => {
                    self.surface.unmount();
                    d.node
                }
                Some(d) => {
                    tracing::warn!("save callback before preparation settled; ignored");
                    *dialog = Some(d);
                    return;
                }
                None => {
                    tracing::warn!("save callback without an open edit dialog; ignored");
                    return;
                }
            }
        };

        self.begin_processing(node, asset);
    }

    /// Tear the coordinator down: cancel every in-flight session and timer,
    /// drop every pending action. Nothing fires after disposal.
    pub fn dispose(&self) {
        tracing::debug!("edit coordinator disposed");
        self.shutdown.cancel();

        let dialog = self.dialog.lock().take();
        if let Some(d) = dialog {
            d.cancel.cancel();
            if d.mounted {
                self.surface.unmount();
            }
        }

        for (_, active) in self.active.lock().drain() {
            active.cancel.cancel();
        }
        self.registry.clear();
        self.pending.clear();
    }

    fn spawn_document_watcher(self: Arc<Self>) {
        let mut changes = self.document.subscribe();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let change = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    change = changes.recv() => change,
                };
                match change {
                    Ok(DocumentChange::NodeRemoved(node)) => self.handle_node_removed(node),
                    Ok(DocumentChange::NodeReplaced { .. }) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "document change stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
    }

    /// Deleting the target node is expected, not exceptional: the session
    /// is cancelled without any user-facing error.
    fn handle_node_removed(&self, node: NodeId) {
        let dialog_closed = {
            let mut dialog = self.dialog.lock();
            if dialog.as_ref().map(|d| d.node == node).unwrap_or(false) {
                let d = dialog.take();
                if let Some(d) = d {
                    d.cancel.cancel();
                    if d.mounted {
                        self.surface.unmount();
                    }
                }
                true
            } else {
                false
            }
        };
        if dialog_closed {
            tracing::debug!(%node, "edit target removed while dialog open");
            let _ = self.events.send(SessionEvent::Aborted { node });
        }

        if let Some(active) = self.active.lock().get(&node) {
            tracing::debug!(%node, "edit target removed while processing; aborting session");
            active.cancel.cancel();
        }
    }

    async fn prepare(self: Arc<Self>, node: NodeId, generation: u64, cancel: CancellationToken) {
        let target = EditTarget {
            asset_id: self.document.attribute(node, ATTR_ASSET_ID),
            src: self.document.attribute(node, ATTR_SRC),
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = self.backend.prepare(&target, &cancel) => result,
        };

        let mut dialog = self.dialog.lock();
        let current = dialog
            .as_ref()
            .map(|d| d.generation == generation)
            .unwrap_or(false);
        if !current || cancel.is_cancelled() {
            // A newer open superseded this preparation; discard its result.
            return;
        }

        match result {
            Ok(options) => {
                if let Some(d) = dialog.as_mut() {
                    d.mounted = true;
                }
                drop(dialog);
                self.surface.mount(options);
            }
            Err(BackendError::Aborted) => {
                *dialog = None;
            }
            Err(err) => {
                *dialog = None;
                drop(dialog);
                tracing::error!(%node, error = %err, "edit preparation failed");
                self.notifier.warn(PREPARE_FAILED_MESSAGE);
                let _ = self.events.send(SessionEvent::Failed { node });
            }
        }
    }

    fn begin_processing(self: &Arc<Self>, node: NodeId, asset: SavedAsset) {
        if self.shutdown.is_cancelled() {
            return;
        }
        if !self.document.contains(node) {
            let _ = self.events.send(SessionEvent::Aborted { node });
            return;
        }

        let session_id = Uuid::new_v4();
        if !self.registry.try_insert(node, session_id) {
            tracing::warn!(%node, "a session is already processing this node; save ignored");
            return;
        }

        let cancel = self.shutdown.child_token();
        self.active.lock().insert(
            node,
            ActiveSession {
                id: session_id,
                cancel: cancel.clone(),
            },
        );
        let pending_id = self.pending.add(PROCESSING_MESSAGE);

        // Optimistic UI: show the edited asset's final dimensions while the
        // server is still processing.
        let prior = PriorSize {
            width: self.document.attribute(node, ATTR_WIDTH),
            height: self.document.attribute(node, ATTR_HEIGHT),
        };
        if let Some(width) = asset.width {
            self.document
                .set_attribute(node, ATTR_WIDTH, Some(width.to_string()));
        }
        if let Some(height) = asset.height {
            self.document
                .set_attribute(node, ATTR_HEIGHT, Some(height.to_string()));
        }

        let this = self.clone();
        tokio::spawn(async move {
            this.run_processing(node, asset, prior, session_id, pending_id, cancel)
                .await;
        });
    }

    async fn run_processing(
        self: Arc<Self>,
        node: NodeId,
        asset: SavedAsset,
        prior: PriorSize,
        session_id: Uuid,
        pending_id: Uuid,
        cancel: CancellationToken,
    ) {
        // The poll loop runs on its own task so an unexpected panic inside
        // it is contained, logged, and settled like any other terminal
        // failure instead of tearing the coordinator down.
        let handle = {
            let backend = self.backend.clone();
            let asset_id = asset.id.clone();
            let cancel = cancel.clone();
            let attempts = self.config.max_poll_attempts;
            let backoff = self.config.poll_backoff;
            tokio::spawn(
                async move { poll_until_processed(backend, asset_id, cancel, attempts, backoff).await },
            )
        };

        let result = match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                tracing::error!(%node, error = %join_err, "status polling panicked");
                Err(BackendError::Internal)
            }
        };

        // Settle bookkeeping before touching the document.
        self.pending.remove(pending_id);
        self.registry.remove(node, session_id);
        self.active.lock().remove(&node);

        match result {
            // A result can arrive after a concurrent abort: the poll task may
            // already hold a Ready answer by the time the cancel lands. The
            // abort wins; the stale result is discarded.
            Ok(_) if cancel.is_cancelled() => {
                self.revert_size(node, &prior);
                let _ = self.events.send(SessionEvent::Aborted { node });
            }
            Ok(processed) => self.apply(node, &asset, processed),
            Err(BackendError::Aborted) => {
                self.revert_size(node, &prior);
                let _ = self.events.send(SessionEvent::Aborted { node });
            }
            Err(BackendError::Internal) => {
                // Already logged at the panic site; no second user warning.
                self.revert_size(node, &prior);
                let _ = self.events.send(SessionEvent::Failed { node });
            }
            Err(err) => {
                self.revert_size(node, &prior);
                if cancel.is_cancelled() {
                    // Concurrently aborted; the failure is not news.
                    let _ = self.events.send(SessionEvent::Aborted { node });
                } else {
                    tracing::error!(%node, error = %err, "image edit processing failed");
                    self.notifier.warn(PROCESSING_FAILED_MESSAGE);
                    let _ = self.events.send(SessionEvent::Failed { node });
                }
            }
        }
    }

    /// Replace the target node with one carrying the processed asset's
    /// attributes, in a single document transaction that preserves the
    /// node's children, its alt text, and the selection.
    fn apply(self: &Arc<Self>, node: NodeId, asset: &SavedAsset, processed: ProcessedAsset) {
        if !self.document.contains(node) {
            let _ = self.events.send(SessionEvent::Aborted { node });
            return;
        }

        let mut attributes: Vec<(String, String)> =
            vec![(ATTR_ASSET_ID.to_string(), processed.id.clone())];
        if let Some(image) = &processed.image {
            attributes.push((ATTR_SRC.to_string(), image.fallback_url.clone()));
            if let Some(srcset) = &image.srcset {
                attributes.push((ATTR_SRCSET.to_string(), srcset.clone()));
            }
            if let Some(sizes) = &image.sizes {
                attributes.push((ATTR_SIZES.to_string(), sizes.clone()));
            }
        }
        if let Some(width) = processed.width.or(asset.width) {
            attributes.push((ATTR_WIDTH.to_string(), width.to_string()));
        }
        if let Some(height) = processed.height.or(asset.height) {
            attributes.push((ATTR_HEIGHT.to_string(), height.to_string()));
        }
        if let Some(alt) = self.document.attribute(node, ATTR_ALT) {
            attributes.push((ATTR_ALT.to_string(), alt));
        }

        let spec = ReplaceSpec {
            attributes,
            preserve_children: true,
            preserve_selection: true,
        };
        match self.document.replace_node(node, spec) {
            Ok(new_node) => {
                tracing::debug!(%node, %new_node, asset_id = %processed.id, "edited asset applied");
                let _ = self.events.send(SessionEvent::Processed {
                    node,
                    new_node,
                    asset_id: processed.id,
                });
            }
            Err(DocumentError::NodeGone) => {
                let _ = self.events.send(SessionEvent::Aborted { node });
            }
        }
    }

    fn revert_size(&self, node: NodeId, prior: &PriorSize) {
        if !self.document.contains(node) {
            return;
        }
        self.document
            .set_attribute(node, ATTR_WIDTH, prior.width.clone());
        self.document
            .set_attribute(node, ATTR_HEIGHT, prior.height.clone());
    }

    fn schedule_refresh(self: &Arc<Self>) {
        let this = self.clone();
        let cancel = self.shutdown.child_token();
        let delay = self.config.refresh_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => this.surface.refresh(),
            }
        });
    }
}

/// Poll the asset's processing status until it settles.
///
/// Queued/missing statuses are retryable up to the attempt cap, with
/// strictly increasing delays between attempts; everything else settles the
/// session immediately.
async fn poll_until_processed(
    backend: Arc<dyn AssetBackend>,
    asset_id: String,
    cancel: CancellationToken,
    max_attempts: u32,
    backoff: Duration,
) -> Result<ProcessedAsset, BackendError> {
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(BackendError::Aborted);
        }
        attempt += 1;

        match backend.poll_asset(&asset_id, &cancel).await {
            Ok(AssetPoll::Ready(processed)) => return Ok(processed),
            Ok(AssetPoll::Pending) => {
                if attempt >= max_attempts {
                    return Err(BackendError::Fatal(format!(
                        "asset {} was still queued after {} status checks",
                        asset_id, max_attempts
                    )));
                }
                let delay = backoff * attempt;
                tokio::select! {
                    _ = cancel.cancelled() => return Err(BackendError::Aborted),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}
