//! Deployed resource set of a broker cluster

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label recording whether a broker cluster is pooled or sharded
pub const LABEL_BROKER_KIND: &str = "addrctl.io/broker-kind";

/// Label naming the address a sharded cluster is dedicated to
pub const LABEL_ADDRESS: &str = "addrctl.io/address";

pub const BROKER_KIND_POOLED: &str = "pooled";
pub const BROKER_KIND_SHARDED: &str = "sharded";

/// The deployable units of one broker cluster, as produced by a cluster
/// generator and as observed on the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    #[serde(rename = "clusterId")]
    pub cluster_id: String,

    /// Template the set was generated from
    #[serde(default)]
    pub template: String,

    #[serde(default = "default_replicas")]
    pub replicas: u32,

    #[serde(rename = "readyReplicas", default)]
    pub ready_replicas: u32,

    /// Requested size of the persistent volume claim (e.g., "2Gi")
    #[serde(rename = "storageSize")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    #[serde(rename = "addressFullPolicy")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_full_policy: Option<String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_replicas() -> u32 {
    1
}

impl ResourceSet {
    pub fn new(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            template: String::new(),
            replicas: default_replicas(),
            ready_replicas: 0,
            storage_size: None,
            cpu: None,
            memory: None,
            address_full_policy: None,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_replicas(mut self, replicas: u32, ready_replicas: u32) -> Self {
        self.replicas = replicas;
        self.ready_replicas = ready_replicas;
        self
    }

    pub fn with_storage(mut self, size: impl Into<String>) -> Self {
        self.storage_size = Some(size.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// `pooled` or `sharded`, when labelled
    pub fn broker_kind(&self) -> Option<&str> {
        self.labels.get(LABEL_BROKER_KIND).map(String::as_str)
    }

    pub fn is_pooled(&self) -> bool {
        self.broker_kind() == Some(BROKER_KIND_POOLED)
    }

    /// Whether `other` differs only in fields that can be changed in place
    pub fn same_structure(&self, other: &ResourceSet) -> bool {
        self.storage_size == other.storage_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pooled_label() {
        let set = ResourceSet::new("broker-pooled-1")
            .with_label(LABEL_BROKER_KIND, BROKER_KIND_POOLED);
        assert!(set.is_pooled());
        assert!(!ResourceSet::new("q1-0").is_pooled());
    }

    #[test]
    fn test_parse_resource_set() {
        let json = r#"{"clusterId": "q1-0", "replicas": 1, "readyReplicas": 1, "storageSize": "2Gi"}"#;
        let set: ResourceSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.cluster_id, "q1-0");
        assert_eq!(set.storage_size.as_deref(), Some("2Gi"));
        assert!(set.labels.is_empty());
    }
}
