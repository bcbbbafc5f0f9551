//! Endpoint descriptors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Network used when a key carries no `network@` prefix.
pub const DEFAULT_NETWORK: &str = "tcp";

/// One reachable server: a key such as `tcp@10.0.0.1:8972` and opaque
/// metadata, conventionally URL-query encoded (`weight=10&group=a`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KVPair {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl KVPair {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Network part of `network@address`, or [`DEFAULT_NETWORK`].
    #[must_use]
    pub fn network(&self) -> &str {
        self.key
            .split_once('@')
            .map_or(DEFAULT_NETWORK, |(network, _)| network)
    }

    /// Address part of `network@address`, or the whole key.
    #[must_use]
    pub fn address(&self) -> &str {
        self.key
            .split_once('@')
            .map_or(self.key.as_str(), |(_, address)| address)
    }

    /// Decodes the metadata value. Repeated names keep the last occurrence.
    #[must_use]
    pub fn metadata(&self) -> HashMap<String, String> {
        form_urlencoded::parse(self.value.as_bytes())
            .into_owned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_splits_into_network_and_address() {
        let pair = KVPair::new("quic@10.0.0.1:8972", "");
        assert_eq!(pair.network(), "quic");
        assert_eq!(pair.address(), "10.0.0.1:8972");
    }

    #[test]
    fn key_without_network_defaults_to_tcp() {
        let pair = KVPair::new("10.0.0.1:8972", "");
        assert_eq!(pair.network(), "tcp");
        assert_eq!(pair.address(), "10.0.0.1:8972");
    }

    #[test]
    fn metadata_decodes_query_encoding() {
        let pair = KVPair::new("tcp@a:1", "weight=10&group=blue%20team&weight=20");
        let meta = pair.metadata();
        assert_eq!(meta.get("weight").map(String::as_str), Some("20"));
        assert_eq!(meta.get("group").map(String::as_str), Some("blue team"));
        assert!(KVPair::new("tcp@a:1", "").metadata().is_empty());
    }

    #[test]
    fn server_list_loads_from_json() {
        let raw = r#"[
            {"key": "tcp@10.0.0.1:8972", "value": "weight=5"},
            {"key": "tcp@10.0.0.2:8972"}
        ]"#;
        let pairs: Vec<KVPair> = serde_json::from_str(raw).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].metadata().get("weight").map(String::as_str), Some("5"));
        assert_eq!(pairs[1].value, "");
    }
}
