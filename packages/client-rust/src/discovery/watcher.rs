//! Subscriber handles returned by `watch_service`.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::ServiceList;

/// Identifies one registered watcher within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(pub u64);

/// Receiving end of a registry subscription.
///
/// Each message is a full replacement server list. Dropping the watcher
/// closes its queue; the registry keeps the sending half until the watcher
/// is removed, and deliveries to a closed queue are skipped.
#[derive(Debug)]
pub struct Watcher {
    id: WatcherId,
    rx: mpsc::Receiver<ServiceList>,
}

impl Watcher {
    pub(crate) fn new(id: WatcherId, rx: mpsc::Receiver<ServiceList>) -> Self {
        Self { id, rx }
    }

    #[must_use]
    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Waits for the next server list. Returns `None` once the registry has
    /// dropped its sending half and the queue is drained.
    pub async fn recv(&mut self) -> Option<ServiceList> {
        self.rx.recv().await
    }

    /// Takes the next queued server list without waiting.
    ///
    /// # Errors
    ///
    /// Returns `TryRecvError::Empty` if nothing is queued and
    /// `TryRecvError::Disconnected` if the sending half is gone.
    pub fn try_recv(&mut self) -> Result<ServiceList, TryRecvError> {
        self.rx.try_recv()
    }

    /// Number of server lists waiting in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
