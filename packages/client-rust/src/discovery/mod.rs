//! Service discovery: server lists and change notification.

pub mod config;
pub mod multiple;
pub mod pair;
pub mod traits;
pub mod watcher;

use std::sync::Arc;

/// Immutable server list shared between the registry and its watchers.
/// Updates replace the whole list; no list is mutated after publication.
pub type ServiceList = Arc<[pair::KVPair]>;

pub use config::DiscoveryConfig;
pub use multiple::MultipleServersDiscovery;
pub use pair::KVPair;
pub use traits::{ServiceDiscovery, ServiceDiscoveryFilter};
pub use watcher::{Watcher, WatcherId};
