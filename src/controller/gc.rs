//! Garbage collection of broker clusters no address refers to

use std::collections::BTreeSet;

use tracing::debug;

use crate::address::Address;
use crate::cluster::{BrokerCluster, OrchestrationClient};
use crate::events::{log_event, ControllerKind, ControllerReason};

/// Cluster ids referenced by any association, in any state
pub fn referenced_clusters(addresses: &[Address]) -> BTreeSet<String> {
    addresses
        .iter()
        .flat_map(|a| a.status.broker_statuses.iter())
        .map(|b| b.cluster_id.clone())
        .collect()
}

/// Listed clusters nothing refers to, in id order
pub fn orphaned_clusters<'a>(
    clusters: &'a [BrokerCluster],
    addresses: &[Address],
) -> Vec<&'a BrokerCluster> {
    let referenced = referenced_clusters(addresses);
    let mut orphans: Vec<&BrokerCluster> = clusters
        .iter()
        .filter(|c| !referenced.contains(&c.cluster_id))
        .collect();
    orphans.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
    orphans
}

/// Delete orphaned clusters. A failed delete is logged and retried on the
/// next pass. Returns the ids deleted.
pub async fn collect_garbage(
    client: &dyn OrchestrationClient,
    clusters: &[BrokerCluster],
    addresses: &[Address],
) -> Vec<String> {
    let mut deleted = Vec::new();
    for cluster in orphaned_clusters(clusters, addresses) {
        debug!("Broker cluster {} is no longer referenced", cluster.cluster_id);
        match client.delete(&cluster.resources).await {
            Ok(()) => {
                log_event(
                    ControllerReason::BrokerDeleted,
                    ControllerKind::Broker,
                    &cluster.cluster_id,
                    "Deleted unused broker cluster",
                );
                deleted.push(cluster.cluster_id.clone());
            }
            Err(e) => log_event(
                ControllerReason::BrokerDeleteFailed,
                ControllerKind::Broker,
                &cluster.cluster_id,
                &e.to_string(),
            ),
        }
    }
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{AddressType, BrokerState, BrokerStatus, Phase};
    use crate::cluster::{MemoryPlatform, ResourceSet};

    #[tokio::test]
    async fn test_orphan_deleted_referenced_kept() {
        let platform = MemoryPlatform::new()
            .with_cluster(ResourceSet::new("broker-1").with_replicas(1, 1))
            .with_cluster(ResourceSet::new("broker-2").with_replicas(1, 1))
            .with_cluster(ResourceSet::new("broker-3").with_replicas(1, 1));
        let addresses = vec![
            Address::new("q1", "q1", AddressType::Queue, "small-queue")
                .with_phase(Phase::Active)
                .with_broker(BrokerStatus::active("broker-1", "broker-1-0")),
            Address::new("q2", "q2", AddressType::Queue, "large-queue")
                .with_phase(Phase::Active)
                .with_broker(BrokerStatus {
                    cluster_id: "broker-3".into(),
                    container_id: "broker-3-0".into(),
                    state: BrokerState::Draining,
                }),
        ];

        let clusters = platform.list_clusters().await.unwrap();
        let deleted = collect_garbage(&platform, &clusters, &addresses).await;

        assert_eq!(deleted, vec!["broker-2"]);
        assert_eq!(platform.cluster_ids(), vec!["broker-1", "broker-3"]);
    }

    #[tokio::test]
    async fn test_delete_failure_is_not_fatal() {
        let platform = MemoryPlatform::new();
        // listed but already gone from the platform
        let stale = vec![BrokerCluster::new(ResourceSet::new("broker-9"))];
        let deleted = collect_garbage(&platform, &stale, &[]).await;
        assert!(deleted.is_empty());
    }
}
