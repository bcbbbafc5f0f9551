//! RPC client: statically seeded, dynamically updatable server discovery.

pub mod discovery;

pub use discovery::{
    DiscoveryConfig, KVPair, MultipleServersDiscovery, ServiceDiscovery, ServiceDiscoveryFilter,
    ServiceList, Watcher, WatcherId,
};
