//! Online/offline status with subscriber broadcast.
//!
//! [`NetworkMonitor`] is the process-wide observable for connectivity. It
//! consults an optional [`ConnectivityProbe`] (initialized at most once) and
//! otherwise falls back to the last status reported through
//! [`NetworkMonitor::notify`]. Transitions are broadcast synchronously to the
//! current subscribers in registration order.
//!
//! Lifecycle: create with [`NetworkMonitor::new`], optionally start polling
//! with [`NetworkMonitor::watch_probe`], and stop polling with
//! [`NetworkMonitor::shutdown`] (also done when the last handle is dropped).

mod probe;

pub use probe::{ConnectivityProbe, ProbeError, TcpProbe};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Callback invoked with the new online status.
pub type Listener = Arc<dyn Fn(bool) + Send + Sync>;

struct Inner {
    online: AtomicBool,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    probe_ready: OnceCell<bool>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn stop_watcher(&self) {
        let handle = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}

/// Connectivity observable.
///
/// Cloning is cheap; clones share state and subscribers.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("online", &self.last_known())
            .field("listeners", &self.listener_count())
            .field("probe", &self.inner.probe)
            .finish_non_exhaustive()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(None)
    }
}

impl NetworkMonitor {
    /// Creates a monitor. Without a probe, status comes only from
    /// [`NetworkMonitor::notify`]; the initial status is online.
    #[must_use]
    pub fn new(probe: Option<Arc<dyn ConnectivityProbe>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                online: AtomicBool::new(true),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                probe,
                probe_ready: OnceCell::new(),
                watcher: Mutex::new(None),
            }),
        }
    }

    /// Returns the probe once it initialized successfully.
    async fn ready_probe(&self) -> Option<&Arc<dyn ConnectivityProbe>> {
        let probe = self.inner.probe.as_ref()?;
        let ready = *self
            .inner
            .probe_ready
            .get_or_init(|| async {
                let ready = probe.init().await;
                debug!(ready, "connectivity probe initialized");
                ready
            })
            .await;
        ready.then_some(probe)
    }

    /// Point-in-time status.
    ///
    /// Asks the probe when one is available and falls back to the last
    /// reported status otherwise (or when the probe errors).
    pub async fn status(&self) -> bool {
        if let Some(probe) = self.ready_probe().await {
            match probe.is_connected().await {
                Ok(connected) => return connected,
                Err(e) => warn!(error = %e, "connectivity probe failed, using last known status"),
            }
        }
        self.last_known()
    }

    /// Last status reported or observed, without I/O.
    #[must_use]
    pub fn last_known(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Reports a connectivity change. Subscribers are called only when the
    /// status actually changes.
    pub fn notify(&self, online: bool) {
        notify_inner(&self.inner, online);
    }

    /// Registers a listener. Each call adds a new registration, even for the
    /// same callback, with its own [`Subscription`].
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        Subscription {
            id,
            monitor: Arc::downgrade(&self.inner),
            active: AtomicBool::new(true),
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Starts polling the probe every `interval` and forwards transitions.
    ///
    /// Returns `false` when there is no usable probe. Calling it again
    /// replaces the previous polling task.
    pub async fn watch_probe(&self, interval: Duration) -> bool {
        let Some(probe) = self.ready_probe().await.cloned() else {
            return false;
        };
        let weak = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let connected = match probe.is_connected().await {
                    Ok(connected) => connected,
                    Err(e) => {
                        debug!(error = %e, "probe poll failed");
                        continue;
                    }
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                notify_inner(&inner, connected);
            }
        });

        let previous = self
            .inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        info!(interval_ms = interval.as_millis(), "watching connectivity probe");
        true
    }

    /// Stops probe polling. Subscribers stay registered.
    pub fn shutdown(&self) {
        self.inner.stop_watcher();
    }
}

fn notify_inner(inner: &Inner, online: bool) {
    let previous = inner.online.swap(online, Ordering::SeqCst);
    if previous == online {
        return;
    }
    info!(online, "connectivity changed");

    // Snapshot so listeners can (un)subscribe while being called.
    let snapshot: Vec<Listener> = inner
        .listeners
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(_, listener)| Arc::clone(listener))
        .collect();
    for listener in snapshot {
        listener(online);
    }
}

/// Handle returned by [`NetworkMonitor::subscribe`].
///
/// Dropping it keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    monitor: Weak<Inner>,
    active: AtomicBool,
}

impl Subscription {
    /// Removes this registration only. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.monitor.upgrade() {
            inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }

    /// Returns true until [`Subscription::unsubscribe`] is called.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
