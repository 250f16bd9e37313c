//! In-memory orchestration platform
//!
//! Holds broker clusters, the router and address objects in concurrent maps.
//! Used by the CLI to simulate a tenant and by tests to observe what the
//! controller asked the platform to do.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::address::{Address, AddressApi};

use super::broker::{BrokerCluster, RouterCluster};
use super::client::{ClientError, OrchestrationClient};
use super::resources::ResourceSet;

/// A tenant's platform state kept in memory
#[derive(Clone)]
pub struct MemoryPlatform {
    /// Broker resource sets indexed by cluster id
    clusters: Arc<DashMap<String, ResourceSet>>,

    /// Routers indexed by name
    routers: Arc<DashMap<String, RouterCluster>>,

    /// Addresses indexed by namespace/name
    addresses: Arc<DashMap<String, Address>>,

    /// Cluster ids whose creation is rejected
    failing_creates: Arc<Mutex<BTreeSet<String>>>,

    /// Newly created or scaled units report ready immediately
    auto_ready: bool,

    list_calls: Arc<AtomicUsize>,
    replace_calls: Arc<AtomicUsize>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self {
            clusters: Arc::new(DashMap::new()),
            routers: Arc::new(DashMap::new()),
            addresses: Arc::new(DashMap::new()),
            failing_creates: Arc::new(Mutex::new(BTreeSet::new())),
            auto_ready: false,
            list_calls: Arc::new(AtomicUsize::new(0)),
            replace_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_auto_ready(mut self, auto_ready: bool) -> Self {
        self.auto_ready = auto_ready;
        self
    }

    pub fn with_router(self, router: RouterCluster) -> Self {
        self.routers.insert(router.name.clone(), router);
        self
    }

    pub fn with_cluster(self, resources: ResourceSet) -> Self {
        self.clusters.insert(resources.cluster_id.clone(), resources);
        self
    }

    // =========================================================================
    // Inspection and simulation helpers
    // =========================================================================

    pub fn cluster(&self, cluster_id: &str) -> Option<ResourceSet> {
        self.clusters.get(cluster_id).map(|r| r.clone())
    }

    /// Cluster ids in sorted order
    pub fn cluster_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.clusters.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn router(&self, name: &str) -> Option<RouterCluster> {
        self.routers.get(name).map(|r| r.clone())
    }

    /// Mark every broker replica and router replica as ready
    pub fn mark_all_ready(&self) {
        for mut cluster in self.clusters.iter_mut() {
            cluster.ready_replicas = cluster.replicas;
        }
        for mut router in self.routers.iter_mut() {
            router.ready_replicas = router.replicas;
        }
    }

    pub fn set_ready_replicas(&self, cluster_id: &str, ready: u32) {
        if let Some(mut cluster) = self.clusters.get_mut(cluster_id) {
            cluster.ready_replicas = ready;
        }
    }

    pub fn fail_create(&self, cluster_id: impl Into<String>) {
        if let Ok(mut failing) = self.failing_creates.lock() {
            failing.insert(cluster_id.into());
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing_creates.lock() {
            failing.clear();
        }
    }

    /// Store an address as if the user had submitted it
    pub fn put_address(&self, address: Address) {
        self.addresses.insert(address_key(&address), address);
    }

    pub fn get_address(&self, namespace: &str, name: &str) -> Option<Address> {
        self.addresses
            .get(&format!("{}/{}", namespace, name))
            .map(|r| r.clone())
    }

    /// Mark an address for deletion as the user would
    pub fn request_delete(&self, namespace: &str, name: &str) -> bool {
        match self.addresses.get_mut(&format!("{}/{}", namespace, name)) {
            Some(mut address) => {
                address.metadata.deletion_timestamp = Some(chrono::Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn replace_calls(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn address_key(address: &Address) -> String {
    format!("{}/{}", address.metadata.namespace, address.metadata.name)
}

#[async_trait]
impl OrchestrationClient for MemoryPlatform {
    async fn list_clusters(&self) -> Result<Vec<BrokerCluster>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut clusters: Vec<BrokerCluster> = self
            .clusters
            .iter()
            .map(|r| BrokerCluster::new(r.value().clone()))
            .collect();
        clusters.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
        Ok(clusters)
    }

    async fn get_router(&self, name: &str) -> Result<RouterCluster, ClientError> {
        self.router(name)
            .ok_or_else(|| ClientError::NotFound(name.to_string()))
    }

    async fn scale_stateful_set(&self, name: &str, replicas: u32) -> Result<(), ClientError> {
        debug!("Scaling {} to {} replicas", name, replicas);
        if let Some(mut router) = self.routers.get_mut(name) {
            router.replicas = replicas;
            if self.auto_ready {
                router.ready_replicas = replicas;
            }
            return Ok(());
        }
        let mut cluster = self
            .clusters
            .get_mut(name)
            .ok_or_else(|| ClientError::NotFound(name.to_string()))?;
        cluster.replicas = replicas;
        if self.auto_ready {
            cluster.ready_replicas = replicas;
        }
        Ok(())
    }

    async fn create(&self, resources: &ResourceSet) -> Result<(), ClientError> {
        let failing = self
            .failing_creates
            .lock()
            .map(|f| f.contains(&resources.cluster_id))
            .unwrap_or(false);
        if failing {
            return Err(ClientError::Api(format!(
                "admission denied for {}",
                resources.cluster_id
            )));
        }
        if self.clusters.contains_key(&resources.cluster_id) {
            return Err(ClientError::AlreadyExists(resources.cluster_id.clone()));
        }

        let mut created = resources.clone();
        if self.auto_ready {
            created.ready_replicas = created.replicas;
        }
        self.clusters.insert(created.cluster_id.clone(), created);
        Ok(())
    }

    async fn apply(&self, resources: &ResourceSet) -> Result<(), ClientError> {
        let mut existing = self
            .clusters
            .get_mut(&resources.cluster_id)
            .ok_or_else(|| ClientError::NotFound(resources.cluster_id.clone()))?;
        let ready = existing.ready_replicas;
        *existing = resources.clone();
        existing.ready_replicas = ready;
        Ok(())
    }

    async fn delete(&self, resources: &ResourceSet) -> Result<(), ClientError> {
        self.clusters
            .remove(&resources.cluster_id)
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(resources.cluster_id.clone()))
    }
}

#[async_trait]
impl AddressApi for MemoryPlatform {
    async fn list_addresses(&self, namespace: &str) -> Result<Vec<Address>, ClientError> {
        let mut addresses: Vec<Address> = self
            .addresses
            .iter()
            .filter(|r| r.metadata.namespace == namespace)
            .map(|r| r.clone())
            .collect();
        addresses.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(addresses)
    }

    async fn replace_address(&self, address: &Address) -> Result<(), ClientError> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        let key = address_key(address);
        if !self.addresses.contains_key(&key) {
            return Err(ClientError::NotFound(key));
        }

        // A deleted object is purged once its last finalizer is gone
        if address.is_deleted() && address.metadata.finalizers.is_empty() {
            self.addresses.remove(&key);
        } else {
            self.addresses.insert(key, address.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressType;

    #[tokio::test]
    async fn test_create_and_list() {
        let platform = MemoryPlatform::new();
        platform.create(&ResourceSet::new("b")).await.unwrap();
        platform.create(&ResourceSet::new("a")).await.unwrap();

        let clusters = platform.list_clusters().await.unwrap();
        let ids: Vec<_> = clusters.iter().map(|c| c.cluster_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(!clusters[0].is_ready());
    }

    #[tokio::test]
    async fn test_create_duplicate() {
        let platform = MemoryPlatform::new().with_cluster(ResourceSet::new("a"));
        let result = platform.create(&ResourceSet::new("a")).await;
        assert_eq!(result, Err(ClientError::AlreadyExists("a".into())));
    }

    #[tokio::test]
    async fn test_injected_create_failure() {
        let platform = MemoryPlatform::new();
        platform.fail_create("a");
        assert!(matches!(
            platform.create(&ResourceSet::new("a")).await,
            Err(ClientError::Api(_))
        ));
        platform.clear_failures();
        assert!(platform.create(&ResourceSet::new("a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_auto_ready_scale_router() {
        let platform = MemoryPlatform::new()
            .with_auto_ready(true)
            .with_router(RouterCluster::new("qdrouterd", 1));
        platform.scale_stateful_set("qdrouterd", 3).await.unwrap();
        let router = platform.get_router("qdrouterd").await.unwrap();
        assert_eq!(router.replicas, 3);
        assert_eq!(router.ready_replicas, 3);
    }

    #[tokio::test]
    async fn test_scale_unknown() {
        let platform = MemoryPlatform::new();
        let result = platform.scale_stateful_set("nope", 1).await;
        assert_eq!(result, Err(ClientError::NotFound("nope".into())));
    }

    #[tokio::test]
    async fn test_replace_purges_finalized_deletion() {
        let platform = MemoryPlatform::new();
        let address = Address::new("q1", "q1", AddressType::Queue, "small-queue").with_namespace("ns");
        platform.put_address(address);
        assert!(platform.request_delete("ns", "q1"));

        let deleted = platform.get_address("ns", "q1").unwrap();
        platform.replace_address(&deleted).await.unwrap();
        assert!(platform.get_address("ns", "q1").is_none());
        assert_eq!(platform.replace_calls(), 1);
    }
}
