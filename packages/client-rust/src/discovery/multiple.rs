//! Statically seeded discovery whose server list is replaced at runtime.
//!
//! The server list sits behind a read/write lock and is swapped wholesale
//! on `update`. Watchers live behind a separate mutex so subscription
//! management never contends with readers of the list.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::config::DiscoveryConfig;
use super::pair::KVPair;
use super::traits::{ServiceDiscovery, ServiceDiscoveryFilter};
use super::watcher::{Watcher, WatcherId};
use super::ServiceList;

/// A list waiting for room in a full watcher queue.
#[derive(Clone)]
struct Pending {
    pairs: ServiceList,
    deadline: Instant,
}

impl Pending {
    fn new(pairs: ServiceList, timeout: Duration) -> Self {
        let now = Instant::now();
        // Saturate instead of panicking on an effectively infinite timeout.
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30));
        Self { pairs, deadline }
    }
}

/// Registry side of one watcher.
///
/// The backlog is non-empty exactly while a drain task owns delivery to this
/// watcher. New lists queue behind it instead of being sent directly, so the
/// watcher sees updates in call order.
#[derive(Clone)]
struct WatcherEntry {
    id: WatcherId,
    tx: mpsc::Sender<ServiceList>,
    cancel: CancellationToken,
    backlog: Arc<Mutex<VecDeque<Pending>>>,
}

/// Discovery over a caller-maintained list of servers.
///
/// Each `update` is fanned out to every registered watcher. A watcher with
/// room in its queue receives the list synchronously. A full watcher gets a
/// single background drain task that feeds its backlog in order; every
/// backlogged list waits at most `delivery_timeout` from its `update` and is
/// then dropped with a warning. A stalled watcher never delays other
/// watchers or the caller of `update`.
pub struct MultipleServersDiscovery {
    config: DiscoveryConfig,
    pairs: RwLock<ServiceList>,
    watchers: Mutex<Vec<WatcherEntry>>,
    update_lock: Mutex<()>,
    next_watcher_id: AtomicU64,
    dropped: Arc<AtomicU64>,
}

impl fmt::Debug for MultipleServersDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let services = self.pairs.read().len();
        let watchers = self.watcher_count();
        let pending = self.pending_updates();
        f.debug_struct("MultipleServersDiscovery")
            .field("services", &services)
            .field("watchers", &watchers)
            .field("pending", &pending)
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish()
    }
}

impl MultipleServersDiscovery {
    /// Creates a registry seeded with `pairs` and the default configuration.
    #[must_use]
    pub fn new(pairs: Vec<KVPair>) -> Self {
        Self::with_config(pairs, DiscoveryConfig::default())
    }

    #[must_use]
    pub fn with_config(pairs: Vec<KVPair>, config: DiscoveryConfig) -> Self {
        Self {
            config,
            pairs: RwLock::new(pairs.into()),
            watchers: Mutex::new(Vec::new()),
            update_lock: Mutex::new(()),
            next_watcher_id: AtomicU64::new(1),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Unregisters the watcher with `id`. Unknown ids are ignored.
    ///
    /// Lists still waiting for room in that watcher's queue are discarded;
    /// once this returns, nothing more is sent to it.
    pub fn remove_watcher_id(&self, id: WatcherId) {
        let removed = {
            let mut watchers = self.watchers.lock();
            watchers
                .iter()
                .position(|w| w.id == id)
                .map(|idx| watchers.remove(idx))
        };

        if let Some(watcher) = removed {
            let mut backlog = watcher.backlog.lock();
            watcher.cancel.cancel();
            backlog.clear();
        }
    }

    /// Number of currently registered watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }

    /// Lists waiting for room in a full watcher queue, across all watchers.
    #[must_use]
    pub fn pending_updates(&self) -> usize {
        self.watchers
            .lock()
            .iter()
            .map(|w| w.backlog.lock().len())
            .sum()
    }

    /// Total deliveries dropped because a watcher stayed full past the
    /// delivery timeout.
    #[must_use]
    pub fn dropped_updates(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Replaces the server list and notifies every registered watcher.
    ///
    /// The new list is visible to `get_services` before this returns.
    /// Concurrent calls are serialized, so every watcher observes lists in
    /// the order they were installed. Delivery to a full watcher continues
    /// in the background and needs a tokio runtime; outside one, such
    /// deliveries are dropped immediately.
    pub fn update(&self, pairs: Vec<KVPair>) {
        let pairs: ServiceList = pairs.into();
        let _serialized = self.update_lock.lock();
        *self.pairs.write() = Arc::clone(&pairs);

        let targets = self.watchers.lock().clone();
        trace!(
            services = pairs.len(),
            watchers = targets.len(),
            "server list updated"
        );

        for watcher in &targets {
            self.deliver(watcher, Arc::clone(&pairs));
        }
    }

    fn deliver(&self, watcher: &WatcherEntry, pairs: ServiceList) {
        let mut backlog = watcher.backlog.lock();
        if watcher.cancel.is_cancelled() {
            return;
        }

        let timeout = self.config.delivery_timeout;
        if !backlog.is_empty() {
            backlog.push_back(Pending::new(pairs, timeout));
            return;
        }

        match watcher.tx.try_send(pairs) {
            Ok(()) => {}
            Err(TrySendError::Closed(_)) => {
                debug!(watcher = watcher.id.0, "watcher closed, skipping server list");
            }
            Err(TrySendError::Full(pairs)) => {
                let Ok(handle) = Handle::try_current() else {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        watcher = watcher.id.0,
                        "watcher is full and no runtime is available; server list dropped"
                    );
                    return;
                };

                backlog.push_back(Pending::new(pairs, timeout));
                handle.spawn(drain_backlog(
                    watcher.clone(),
                    Arc::clone(&self.dropped),
                    timeout,
                ));
            }
        }
    }
}

/// Feeds a watcher's backlog into its queue, oldest first, until the backlog
/// is empty, the watcher is removed, or its receiver is dropped.
///
/// The front entry stays in the backlog while it is being sent, which keeps
/// `deliver` queueing behind it instead of overtaking it.
async fn drain_backlog(watcher: WatcherEntry, dropped: Arc<AtomicU64>, timeout: Duration) {
    loop {
        let Some(Pending { pairs, deadline }) = watcher.backlog.lock().front().cloned() else {
            return;
        };

        let wait = deadline.saturating_duration_since(Instant::now());
        let outcome = tokio::select! {
            biased;
            () = watcher.cancel.cancelled() => return,
            outcome = watcher.tx.send_timeout(pairs, wait) => outcome,
        };

        match outcome {
            Ok(()) => {}
            Err(SendTimeoutError::Closed(_)) => {
                watcher.backlog.lock().clear();
                debug!(watcher = watcher.id.0, "watcher closed while waiting, skipping server list");
                return;
            }
            Err(SendTimeoutError::Timeout(_)) => {
                dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    watcher = watcher.id.0,
                    timeout_secs = timeout.as_secs(),
                    "watcher is full and new server list has been dropped"
                );
            }
        }

        watcher.backlog.lock().pop_front();
    }
}

impl ServiceDiscovery for MultipleServersDiscovery {
    fn get_services(&self) -> ServiceList {
        self.pairs.read().clone()
    }

    fn watch_service(&self) -> Watcher {
        let id = WatcherId(self.next_watcher_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.config.watcher_capacity.max(1));
        self.watchers.lock().push(WatcherEntry {
            id,
            tx,
            cancel: CancellationToken::new(),
            backlog: Arc::default(),
        });
        Watcher::new(id, rx)
    }

    fn remove_watcher(&self, watcher: &Watcher) {
        self.remove_watcher_id(watcher.id());
    }

    /// The list is shared by every service path, so this returns `self`.
    fn clone_for(
        self: Arc<Self>,
        _service_path: &str,
    ) -> anyhow::Result<Arc<dyn ServiceDiscovery>> {
        Ok(self)
    }

    /// Filters are not applied; the list is reported as supplied.
    fn set_filter(&self, _filter: ServiceDiscoveryFilter) {}

    /// Nothing to release: no background polling, and watcher queues are
    /// owned by their holders.
    fn close(&self) {}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
