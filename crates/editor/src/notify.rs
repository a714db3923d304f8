/// User-facing notification seam.
///
/// The coordinator emits at most one warning per failed operation,
/// regardless of how many internal retries occurred; cancellation paths
/// never notify.
pub trait Notifier: Send + Sync + 'static {
    fn warn(&self, message: &str);
}

/// Default notifier: routes warnings to the diagnostic log.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn warn(&self, message: &str) {
        tracing::warn!(target: "mosaic::notify", "{}", message);
    }
}
