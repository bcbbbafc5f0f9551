//! Service discovery capability consumed by connection selectors.

use std::sync::Arc;

use super::pair::KVPair;
use super::watcher::Watcher;
use super::ServiceList;

/// Predicate a discovery backend may apply to the servers it reports.
pub type ServiceDiscoveryFilter = Arc<dyn Fn(&KVPair) -> bool + Send + Sync>;

/// Source of server lists for one service path.
///
/// Backends backed by external registries specialize per path in
/// `clone_for`, honor `set_filter`, and release polling resources in
/// `close`. Static backends may treat those as no-ops.
pub trait ServiceDiscovery: Send + Sync {
    /// Current server list snapshot.
    fn get_services(&self) -> ServiceList;

    /// Registers a new watcher. Every call yields a distinct watcher.
    fn watch_service(&self) -> Watcher;

    /// Unregisters `watcher`. Unknown or already removed watchers are ignored.
    fn remove_watcher(&self, watcher: &Watcher);

    /// Returns a discovery instance for `service_path`.
    ///
    /// # Errors
    ///
    /// Backends that open a new subscription per path return its failure.
    fn clone_for(self: Arc<Self>, service_path: &str) -> anyhow::Result<Arc<dyn ServiceDiscovery>>;

    /// Installs a server filter.
    fn set_filter(&self, filter: ServiceDiscoveryFilter);

    /// Releases backend resources.
    fn close(&self);
}
