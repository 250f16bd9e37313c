//! Broker and router cluster value objects
//!
//! Both are reconstructed from the orchestration client's listing on every
//! pass and are never persisted by the controller.

use serde::{Deserialize, Serialize};

use super::resources::ResourceSet;

/// A broker cluster and its deployed resource set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerCluster {
    #[serde(rename = "clusterId")]
    pub cluster_id: String,

    pub resources: ResourceSet,

    #[serde(skip)]
    should_replace: bool,
}

impl BrokerCluster {
    pub fn new(resources: ResourceSet) -> Self {
        Self {
            cluster_id: resources.cluster_id.clone(),
            resources,
            should_replace: false,
        }
    }

    pub fn replicas(&self) -> u32 {
        self.resources.replicas
    }

    pub fn ready_replicas(&self) -> u32 {
        self.resources.ready_replicas
    }

    pub fn storage_size(&self) -> Option<&str> {
        self.resources.storage_size.as_deref()
    }

    /// All desired replicas are up
    pub fn is_ready(&self) -> bool {
        self.replicas() > 0 && self.ready_replicas() >= self.replicas()
    }

    /// Container hosting addresses placed on this cluster
    pub fn container_id(&self) -> String {
        container_id(&self.cluster_id)
    }

    /// Fold a freshly generated resource set into this cluster.
    ///
    /// Non-structural fields (cpu, memory, address-full policy, template,
    /// labels) are taken from `upgraded` and the current replica counts are
    /// kept. A different storage size cannot be applied to an existing claim,
    /// so the cluster is flagged for replacement and left untouched.
    ///
    /// Returns true when the in-place resource set changed.
    pub fn update_resources(&mut self, upgraded: &ResourceSet) -> bool {
        if !self.resources.same_structure(upgraded) {
            self.should_replace = true;
            return false;
        }

        let mut merged = upgraded.clone();
        merged.cluster_id = self.cluster_id.clone();
        merged.replicas = self.resources.replicas;
        merged.ready_replicas = self.resources.ready_replicas;

        if merged == self.resources {
            return false;
        }
        self.resources = merged;
        true
    }

    pub fn should_replace(&self) -> bool {
        self.should_replace
    }
}

/// Container id of the first broker of a cluster
pub fn container_id(cluster_id: &str) -> String {
    format!("{}-0", cluster_id)
}

/// The tenant's router deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterCluster {
    pub name: String,

    pub replicas: u32,

    #[serde(rename = "readyReplicas", default)]
    pub ready_replicas: u32,
}

impl RouterCluster {
    pub fn new(name: impl Into<String>, replicas: u32) -> Self {
        Self {
            name: name.into(),
            replicas,
            ready_replicas: 0,
        }
    }

    pub fn with_ready(mut self, ready_replicas: u32) -> Self {
        self.ready_replicas = ready_replicas;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.ready_replicas > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployed() -> ResourceSet {
        let mut set = ResourceSet::new("q1-0")
            .with_replicas(1, 1)
            .with_storage("2Gi");
        set.cpu = Some("500m".into());
        set.memory = Some("512Mi".into());
        set
    }

    #[test]
    fn test_storage_change_requires_replace() {
        let mut cluster = BrokerCluster::new(deployed());
        let mut upgraded = deployed().with_replicas(1, 0);
        upgraded.storage_size = Some("5Gi".into());

        assert!(!cluster.update_resources(&upgraded));
        assert!(cluster.should_replace());
        assert_eq!(cluster.storage_size(), Some("2Gi"));
    }

    #[test]
    fn test_cpu_memory_change_in_place() {
        let mut cluster = BrokerCluster::new(deployed());
        let mut upgraded = deployed().with_replicas(1, 0);
        upgraded.cpu = Some("1".into());
        upgraded.memory = Some("1Gi".into());
        upgraded.address_full_policy = Some("BLOCK".into());

        assert!(cluster.update_resources(&upgraded));
        assert!(!cluster.should_replace());
        assert_eq!(cluster.resources.memory.as_deref(), Some("1Gi"));
        // replica counts are the observed ones, not the generated ones
        assert_eq!(cluster.ready_replicas(), 1);
    }

    #[test]
    fn test_identical_set_is_noop() {
        let mut cluster = BrokerCluster::new(deployed());
        assert!(!cluster.update_resources(&deployed().with_replicas(1, 0)));
        assert!(!cluster.should_replace());
    }

    #[test]
    fn test_readiness() {
        assert!(BrokerCluster::new(deployed()).is_ready());
        assert!(!BrokerCluster::new(deployed().with_replicas(1, 0)).is_ready());
        assert!(!BrokerCluster::new(deployed().with_replicas(0, 0)).is_ready());
        assert_eq!(BrokerCluster::new(deployed()).container_id(), "q1-0-0");
    }

    #[test]
    fn test_router_ready() {
        assert!(!RouterCluster::new("qdrouterd", 1).is_ready());
        assert!(RouterCluster::new("qdrouterd", 1).with_ready(1).is_ready());
    }
}
