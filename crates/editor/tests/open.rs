//! Dialog lifecycle: open idempotence, latest-open-wins debounce, failure
//! surfacing, gating against in-flight sessions, and closing.

mod common;

use std::time::Duration;

use editor::backend::AssetPoll;
use editor::prelude::*;
use editor::testkit::ScriptedBackend;

use common::{fixture, fixture_with, image_node, next_event, wait_until};

#[tokio::test(start_paused = true)]
async fn test_open_is_idempotent_while_mounted() {
    let fx = fixture();
    let node = image_node(&fx.document);
    fx.document.select(node, 0);

    fx.coordinator.open_selected();
    wait_until(|| fx.surface.mount_count() == 1).await;

    // Re-opening the node the dialog already shows does nothing.
    fx.coordinator.open_selected();
    fx.coordinator.open(node);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(fx.surface.mount_count(), 1);
    assert_eq!(fx.surface.unmount_count(), 0);
    assert_eq!(fx.backend.prepare_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_latest_open_wins() {
    let backend = ScriptedBackend::with_prepare_delay(Duration::from_millis(200));
    let fx = fixture_with(backend, EditConfig::default());

    let first = fx.document.insert_image(&[("src", "https://cdn.example.test/first.jpg")]);
    let second = fx.document.insert_image(&[("src", "https://cdn.example.test/second.jpg")]);

    fx.coordinator.open(first);
    tokio::task::yield_now().await;
    fx.coordinator.open(second);

    wait_until(|| fx.surface.mount_count() == 1).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Only the latest open mounted; the abandoned one never reached the
    // surface.
    assert_eq!(fx.surface.mount_count(), 1);
    let options = fx.surface.last_options().unwrap();
    assert_eq!(
        options.image_url.as_deref(),
        Some("https://cdn.example.test/second.jpg")
    );
}

#[tokio::test(start_paused = true)]
async fn test_prepare_failure_warns_once_and_dialog_stays_reopenable() {
    let fx = fixture();
    let node = image_node(&fx.document);
    fx.backend
        .fail_prepare(BackendError::Fatal("category listing failed".into()));
    let mut events = fx.coordinator.subscribe();

    fx.coordinator.open(node);
    assert_eq!(next_event(&mut events).await, SessionEvent::Failed { node });
    assert_eq!(fx.surface.mount_count(), 0);
    assert_eq!(fx.notifier.warnings().len(), 1);

    // The failed dialog was cleared; the node can be opened again.
    fx.coordinator.open(node);
    assert_eq!(next_event(&mut events).await, SessionEvent::Failed { node });
    assert_eq!(fx.backend.prepare_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_open_ignored_while_node_is_processing() {
    let fx = fixture();
    let node = image_node(&fx.document);
    fx.backend.script_polls(vec![
        Ok(AssetPoll::Pending),
        Ok(AssetPoll::Ready(ProcessedAsset {
            id: "asset-2".into(),
            image: None,
            width: None,
            height: None,
        })),
    ]);
    let mut events = fx.coordinator.subscribe();

    fx.coordinator.open(node);
    wait_until(|| fx.surface.mount_count() == 1).await;
    fx.coordinator.saved(SavedAsset {
        id: "asset-new".into(),
        width: Some(800),
        height: Some(600),
    });
    assert!(fx.coordinator.is_processing(node));

    // Editing is gated while the session is in flight.
    fx.coordinator.open(node);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fx.surface.mount_count(), 1);
    assert_eq!(fx.backend.prepare_count(), 1);

    match next_event(&mut events).await {
        SessionEvent::Processed { node: done, .. } => assert_eq!(done, node),
        other => panic!("expected the session to finish, got {:?}", other),
    }
    assert!(!fx.coordinator.is_processing(node));
}

#[tokio::test(start_paused = true)]
async fn test_close_aborts_and_refreshes_after_settle_delay() {
    let fx = fixture();
    let node = image_node(&fx.document);
    let mut events = fx.coordinator.subscribe();

    fx.coordinator.open(node);
    wait_until(|| fx.surface.mount_count() == 1).await;

    fx.coordinator.close();
    assert_eq!(next_event(&mut events).await, SessionEvent::Aborted { node });
    assert_eq!(fx.surface.unmount_count(), 1);

    wait_until(|| fx.surface.refresh_count() == 1).await;
}

#[tokio::test(start_paused = true)]
async fn test_node_deletion_closes_the_dialog_silently() {
    let fx = fixture();
    let node = image_node(&fx.document);
    let mut events = fx.coordinator.subscribe();

    fx.coordinator.open(node);
    wait_until(|| fx.surface.mount_count() == 1).await;

    fx.document.remove_node(node);
    assert_eq!(next_event(&mut events).await, SessionEvent::Aborted { node });
    wait_until(|| fx.surface.unmount_count() == 1).await;
    assert!(fx.notifier.warnings().is_empty());
}
