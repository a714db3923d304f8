//! In-memory collaborators for exercising the coordinator without a real
//! document, surface, or asset service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::backend::{AssetBackend, AssetPoll, BackendError, EditTarget};
use crate::document::{DocumentChange, DocumentError, DocumentModel, NodeId, ReplaceSpec};
use crate::notify::Notifier;
use crate::surface::{EditOptions, EditorSurface};

#[derive(Debug, Clone, Default)]
struct NodeRecord {
    attributes: HashMap<String, String>,
    children: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Selection {
    node: NodeId,
    offset: usize,
}

#[derive(Default)]
struct DocInner {
    nodes: HashMap<NodeId, NodeRecord>,
    selected: Option<NodeId>,
    selection: Option<Selection>,
}

/// Minimal in-memory document model.
pub struct MemoryDocument {
    inner: Mutex<DocInner>,
    changes: broadcast::Sender<DocumentChange>,
}

impl MemoryDocument {
    pub fn new() -> Arc<Self> {
        let (changes, _) = broadcast::channel(64);
        Arc::new(Self {
            inner: Mutex::new(DocInner::default()),
            changes,
        })
    }

    pub fn insert_image(&self, attributes: &[(&str, &str)]) -> NodeId {
        let node = NodeId::new();
        let record = NodeRecord {
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            children: Vec::new(),
        };
        self.inner.lock().nodes.insert(node, record);
        node
    }

    pub fn add_child(&self, node: NodeId, text: &str) {
        if let Some(record) = self.inner.lock().nodes.get_mut(&node) {
            record.children.push(text.to_string());
        }
    }

    pub fn children(&self, node: NodeId) -> Vec<String> {
        self.inner
            .lock()
            .nodes
            .get(&node)
            .map(|r| r.children.clone())
            .unwrap_or_default()
    }

    pub fn remove_node(&self, node: NodeId) {
        let mut inner = self.inner.lock();
        if inner.nodes.remove(&node).is_some() {
            if inner.selected == Some(node) {
                inner.selected = None;
            }
            if inner.selection.map(|s| s.node) == Some(node) {
                inner.selection = None;
            }
            drop(inner);
            let _ = self.changes.send(DocumentChange::NodeRemoved(node));
        }
    }

    pub fn select(&self, node: NodeId, offset: usize) {
        let mut inner = self.inner.lock();
        inner.selected = Some(node);
        inner.selection = Some(Selection { node, offset });
    }

    /// Current selection as `(node, offset)`.
    pub fn selection(&self) -> Option<(NodeId, usize)> {
        self.inner.lock().selection.map(|s| (s.node, s.offset))
    }
}

impl DocumentModel for MemoryDocument {
    fn selected_node(&self) -> Option<NodeId> {
        self.inner.lock().selected
    }

    fn contains(&self, node: NodeId) -> bool {
        self.inner.lock().nodes.contains_key(&node)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.inner
            .lock()
            .nodes
            .get(&node)
            .and_then(|r| r.attributes.get(name).cloned())
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: Option<String>) {
        if let Some(record) = self.inner.lock().nodes.get_mut(&node) {
            match value {
                Some(value) => {
                    record.attributes.insert(name.to_string(), value);
                }
                None => {
                    record.attributes.remove(name);
                }
            }
        }
    }

    fn replace_node(&self, old: NodeId, spec: ReplaceSpec) -> Result<NodeId, DocumentError> {
        let new = NodeId::new();
        {
            let mut inner = self.inner.lock();
            let previous = inner.nodes.remove(&old).ok_or(DocumentError::NodeGone)?;

            let record = NodeRecord {
                attributes: spec.attributes.into_iter().collect(),
                children: if spec.preserve_children {
                    previous.children
                } else {
                    Vec::new()
                },
            };
            inner.nodes.insert(new, record);

            if spec.preserve_selection {
                if inner.selected == Some(old) {
                    inner.selected = Some(new);
                }
                if let Some(selection) = inner.selection.as_mut() {
                    if selection.node == old {
                        selection.node = new;
                    }
                }
            } else if inner.selection.map(|s| s.node) == Some(old) {
                inner.selection = None;
                inner.selected = None;
            }
        }
        let _ = self.changes.send(DocumentChange::NodeReplaced { old, new });
        Ok(new)
    }

    fn subscribe(&self) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }
}

/// Backend whose poll answers follow a script.
///
/// Entries are consumed front to back; the last entry repeats once the
/// script runs out, and an empty script always answers `Pending`.
pub struct ScriptedBackend {
    pub prepare_delay: Duration,
    pub prepare_calls: AtomicUsize,
    prepare_failure: Mutex<Option<BackendError>>,
    poll_script: Mutex<Vec<Result<AssetPoll, BackendError>>>,
    poll_times: Mutex<Vec<tokio::time::Instant>>,
    poll_delay: Mutex<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            prepare_delay: Duration::ZERO,
            prepare_calls: AtomicUsize::new(0),
            prepare_failure: Mutex::new(None),
            poll_script: Mutex::new(Vec::new()),
            poll_times: Mutex::new(Vec::new()),
            poll_delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn with_prepare_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            prepare_delay: delay,
            prepare_calls: AtomicUsize::new(0),
            prepare_failure: Mutex::new(None),
            poll_script: Mutex::new(Vec::new()),
            poll_times: Mutex::new(Vec::new()),
            poll_delay: Mutex::new(Duration::ZERO),
        })
    }

    /// Hold each poll answer back by `delay` after it is recorded, so a test
    /// can act while the answer is in flight.
    pub fn set_poll_delay(&self, delay: Duration) {
        *self.poll_delay.lock() = delay;
    }

    pub fn fail_prepare(&self, err: BackendError) {
        *self.prepare_failure.lock() = Some(err);
    }

    pub fn script_polls(&self, script: Vec<Result<AssetPoll, BackendError>>) {
        *self.poll_script.lock() = script;
    }

    pub fn prepare_count(&self) -> usize {
        self.prepare_calls.load(Ordering::SeqCst)
    }

    pub fn poll_count(&self) -> usize {
        self.poll_times.lock().len()
    }

    /// Instants at which each poll arrived, for asserting backoff spacing.
    pub fn poll_instants(&self) -> Vec<tokio::time::Instant> {
        self.poll_times.lock().clone()
    }
}

#[async_trait]
impl AssetBackend for ScriptedBackend {
    async fn prepare(
        &self,
        target: &EditTarget,
        cancel: &CancellationToken,
    ) -> Result<EditOptions, BackendError> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);

        if !self.prepare_delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(BackendError::Aborted),
                _ = tokio::time::sleep(self.prepare_delay) => {}
            }
        }

        if let Some(err) = self.prepare_failure.lock().clone() {
            return Err(err);
        }

        // Echo the target so tests can tell which node's preparation won.
        Ok(EditOptions {
            token: "test-token".to_string(),
            asset_id: target.asset_id.clone(),
            category_id: target.asset_id.is_none().then(|| "cat-1".to_string()),
            image_url: target.src.clone(),
        })
    }

    async fn poll_asset(
        &self,
        _asset_id: &str,
        _cancel: &CancellationToken,
    ) -> Result<AssetPoll, BackendError> {
        self.poll_times.lock().push(tokio::time::Instant::now());

        // Deliberately not cancel-aware: the delayed answer still lands even
        // if the session was aborted in the meantime.
        let delay = *self.poll_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.poll_script.lock();
        if script.is_empty() {
            return Ok(AssetPoll::Pending);
        }
        if script.len() == 1 {
            return script[0].clone();
        }
        script.remove(0)
    }
}

/// Surface that only counts its lifecycle calls.
#[derive(Default)]
pub struct CountingSurface {
    pub mounts: AtomicUsize,
    pub unmounts: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub last_options: Mutex<Option<EditOptions>>,
}

impl CountingSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mount_count(&self) -> usize {
        self.mounts.load(Ordering::SeqCst)
    }

    pub fn unmount_count(&self) -> usize {
        self.unmounts.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<EditOptions> {
        self.last_options.lock().clone()
    }
}

impl EditorSurface for CountingSurface {
    fn mount(&self, options: EditOptions) {
        self.mounts.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock() = Some(options);
    }

    fn unmount(&self) {
        self.unmounts.fetch_add(1, Ordering::SeqCst);
    }

    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Notifier that records every warning it is asked to show.
#[derive(Default)]
pub struct RecordingNotifier {
    warnings: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn warn(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }
}
