//! Shared fixture: a coordinator wired to the in-memory test collaborators.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use editor::prelude::*;
use editor::testkit::{CountingSurface, MemoryDocument, RecordingNotifier, ScriptedBackend};

pub struct Fixture {
    pub document: Arc<MemoryDocument>,
    pub backend: Arc<ScriptedBackend>,
    pub surface: Arc<CountingSurface>,
    pub notifier: Arc<RecordingNotifier>,
    pub coordinator: Arc<EditCoordinator>,
}

pub fn fixture() -> Fixture {
    fixture_with(ScriptedBackend::new(), EditConfig::default())
}

pub fn fixture_with(backend: Arc<ScriptedBackend>, config: EditConfig) -> Fixture {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let document = MemoryDocument::new();
    let surface = CountingSurface::new();
    let notifier = RecordingNotifier::new();
    let coordinator = EditCoordinator::new(
        document.clone(),
        backend.clone(),
        surface.clone(),
        notifier.clone(),
        InFlightRegistry::new(),
        config,
    );
    Fixture {
        document,
        backend,
        surface,
        notifier,
        coordinator,
    }
}

/// An image node with a source, alt text and rendered dimensions.
pub fn image_node(document: &MemoryDocument) -> NodeId {
    document.insert_image(&[
        ("src", "https://cdn.example.test/images/pic.jpg"),
        ("alt", "A picture"),
        ("width", "640"),
        ("height", "480"),
    ])
}

/// Spin until `cond` holds, yielding to the runtime between checks.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition was not met in time");
}

pub async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event channel closed")
}
