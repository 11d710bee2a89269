//! Progress UI (spinners) for device and sync runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use registros_core::RecordStore;

fn new_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Static spinner for a single long call. `None` when disabled.
pub(crate) fn start_spinner(enabled: bool, message: impl Into<String>) -> Option<ProgressBar> {
    enabled.then(|| new_spinner(message.into()))
}

/// Spawns a spinner that tracks the pending count while a sync runs.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `enabled` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_sync_progress(
    enabled: bool,
    store: RecordStore,
    total: usize,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !enabled {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let handle = tokio::spawn(async move {
        let spinner = new_spinner(format!("[0/{total}] Syncing..."));
        while !flag.load(Ordering::SeqCst) {
            let pending = store
                .count_by_status()
                .await
                .map(|counts| counts.pending)
                .unwrap_or(total);
            let done = total.saturating_sub(pending);
            spinner.set_message(format!("[{done}/{total}] Syncing..."));
            tokio::time::sleep(Duration::from_millis(120)).await;
        }
        spinner.finish_and_clear();
    });
    (Some(handle), stop)
}

#[cfg(test)]
mod tests {
    use super::{spawn_sync_progress, start_spinner};
    use registros_core::{MemoryBackend, RecordStore};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_spawn_sync_progress_disabled_returns_stopped() {
        let store = RecordStore::new(Arc::new(MemoryBackend::new()));
        let (handle, stop) = spawn_sync_progress(false, store, 3);
        assert!(handle.is_none());
        assert!(stop.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_spawn_sync_progress_stops_on_signal() {
        let store = RecordStore::new(Arc::new(MemoryBackend::new()));
        let (handle, stop) = spawn_sync_progress(true, store, 0);
        stop.store(true, Ordering::SeqCst);
        handle.expect("spinner handle").await.expect("spinner task");
    }

    #[test]
    fn test_start_spinner_disabled() {
        assert!(start_spinner(false, "Downloading").is_none());
    }
}
