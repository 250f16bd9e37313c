//! Resource usage accounting
//!
//! `UsageMap` is an immutable-style accumulator: every `with_*` method
//! consumes the map and returns the updated one. Tentative admission is a
//! clone plus additions, and rollback is simply dropping the clone.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::schema::{EPSILON, RESOURCE_BROKER};

/// Partition key for tenant-wide accounting
pub const PARTITION_ALL: &str = "all";

/// Credit accounted against one (resource, partition) pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageInfo {
    /// Committed by addresses placed before this pass
    pub used: f64,
    /// Committed by addresses admitted during this pass
    pub needed: f64,
}

impl UsageInfo {
    pub fn total(&self) -> f64 {
        self.used + self.needed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageMap {
    /// resource name -> partition key -> usage
    resources: BTreeMap<String, BTreeMap<String, UsageInfo>>,

    /// Broker clusters hosting pooled addresses -> their resource definition
    pooled: BTreeMap<String, Option<String>>,

    /// Topic address -> subscriptions colocated on its brokers
    colocated: BTreeMap<String, u32>,
}

impl UsageMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_used(mut self, resource: &str, partition: &str, amount: f64) -> Self {
        self.entry(resource, partition).used += amount;
        self
    }

    pub fn with_needed(mut self, resource: &str, partition: &str, amount: f64) -> Self {
        self.entry(resource, partition).needed += amount;
        self
    }

    /// Record `cluster_id` as a pool built from `definition`
    pub fn with_pooled(mut self, cluster_id: &str, definition: Option<&str>) -> Self {
        self.pooled
            .insert(cluster_id.to_string(), definition.map(str::to_string));
        self
    }

    pub fn with_colocated(mut self, topic: &str) -> Self {
        *self.colocated.entry(topic.to_string()).or_insert(0) += 1;
        self
    }

    fn entry(&mut self, resource: &str, partition: &str) -> &mut UsageInfo {
        self.resources
            .entry(resource.to_string())
            .or_default()
            .entry(partition.to_string())
            .or_default()
    }

    pub fn get(&self, resource: &str, partition: &str) -> Option<UsageInfo> {
        self.resources
            .get(resource)
            .and_then(|p| p.get(partition))
            .copied()
    }

    /// Partitions of one resource
    pub fn partitions(&self, resource: &str) -> Option<&BTreeMap<String, UsageInfo>> {
        self.resources.get(resource)
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &String> {
        self.resources.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Total credit of one resource across partitions
    pub fn resource_total(&self, resource: &str) -> f64 {
        self.resources
            .get(resource)
            .map(|p| p.values().map(UsageInfo::total).sum())
            .unwrap_or(0.0)
    }

    /// Total credit across all resources
    pub fn aggregate_total(&self) -> f64 {
        self.resources
            .keys()
            .map(|r| self.resource_total(r))
            .sum()
    }

    /// Credit newly committed this pass for one resource
    pub fn needed_total(&self, resource: &str) -> f64 {
        self.resources
            .get(resource)
            .map(|p| p.values().map(|u| u.needed).sum())
            .unwrap_or(0.0)
    }

    pub fn is_pooled(&self, cluster_id: &str) -> bool {
        self.pooled.contains_key(cluster_id)
    }

    /// Whether `cluster_id` is a pool built from `definition`
    pub fn is_pool_for(&self, cluster_id: &str, definition: Option<&str>) -> bool {
        self.pooled
            .get(cluster_id)
            .map(|d| d.as_deref() == definition)
            .unwrap_or(false)
    }

    /// Pools built from `definition` as (id, broker credit), least loaded first
    pub fn pooled_clusters(&self, definition: Option<&str>) -> Vec<(String, f64)> {
        let mut clusters: Vec<(String, f64)> = self
            .pooled
            .iter()
            .filter(|(_, d)| d.as_deref() == definition)
            .map(|(id, _)| {
                let used = self
                    .get(RESOURCE_BROKER, id)
                    .map(|u| u.total())
                    .unwrap_or(0.0);
                (id.clone(), used)
            })
            .collect();
        clusters.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        clusters
    }

    /// Whether a broker partition with this cluster id is accounted
    pub fn knows_cluster(&self, cluster_id: &str) -> bool {
        cluster_id != PARTITION_ALL
            && self
                .resources
                .get(RESOURCE_BROKER)
                .map(|p| p.contains_key(cluster_id))
                .unwrap_or(false)
    }

    pub fn colocated(&self, topic: &str) -> u32 {
        self.colocated.get(topic).copied().unwrap_or(0)
    }

    /// Whether `resource` stays within `max` (with tolerance)
    pub fn within(&self, resource: &str, max: f64) -> bool {
        self.resource_total(resource) <= max + EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_used_and_needed() {
        let usage = UsageMap::new()
            .with_used("router", PARTITION_ALL, 0.2)
            .with_used("router", PARTITION_ALL, 0.2)
            .with_needed("router", PARTITION_ALL, 0.1);

        let info = usage.get("router", PARTITION_ALL).unwrap();
        assert!((info.used - 0.4).abs() < EPSILON);
        assert!((info.total() - 0.5).abs() < EPSILON);
        assert!((usage.needed_total("router") - 0.1).abs() < EPSILON);
    }

    #[test]
    fn test_tentative_add_is_a_copy() {
        let usage = UsageMap::new().with_used("broker", "broker-1", 0.4);
        let tentative = usage.clone().with_needed("broker", "broker-1", 0.4);

        assert!((usage.resource_total("broker") - 0.4).abs() < EPSILON);
        assert!((tentative.resource_total("broker") - 0.8).abs() < EPSILON);
    }

    #[test]
    fn test_aggregate_total() {
        let usage = UsageMap::new()
            .with_used("router", PARTITION_ALL, 0.5)
            .with_used("broker", "broker-1", 0.4)
            .with_used("broker", "broker-2", 0.1);
        assert!((usage.aggregate_total() - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_pooled_clusters_least_loaded_first() {
        let usage = UsageMap::new()
            .with_used("broker", "broker-b", 0.2)
            .with_used("broker", "broker-a", 0.6)
            .with_used("broker", "broker-c", 0.2)
            .with_pooled("broker-a", Some("broker"))
            .with_pooled("broker-b", Some("broker"))
            .with_pooled("broker-c", Some("broker"));

        let ids: Vec<_> = usage
            .pooled_clusters(Some("broker"))
            .into_iter()
            .map(|c| c.0)
            .collect();
        assert_eq!(ids, vec!["broker-b", "broker-c", "broker-a"]);
    }

    #[test]
    fn test_pooled_clusters_by_definition() {
        let usage = UsageMap::new()
            .with_used("broker", "broker-1", 0.2)
            .with_used("broker", "broker-2", 0.1)
            .with_pooled("broker-1", Some("broker"))
            .with_pooled("broker-2", Some("large-broker"));

        let small: Vec<_> = usage
            .pooled_clusters(Some("broker"))
            .into_iter()
            .map(|c| c.0)
            .collect();
        assert_eq!(small, vec!["broker-1"]);
        assert!(usage.is_pool_for("broker-2", Some("large-broker")));
        assert!(!usage.is_pool_for("broker-2", Some("broker")));
        assert!(usage.pooled_clusters(None).is_empty());
    }

    #[test]
    fn test_within_uses_tolerance() {
        let mut usage = UsageMap::new();
        for _ in 0..10 {
            usage = usage.with_used("router", PARTITION_ALL, 0.1);
        }
        assert!(usage.within("router", 1.0));
        assert!(!usage.within("router", 0.9));
    }

    #[test]
    fn test_knows_cluster() {
        let usage = UsageMap::new().with_used("broker", PARTITION_ALL, 0.1);
        assert!(!usage.knows_cluster(PARTITION_ALL));
        let usage = usage.with_used("broker", "q1-0", 1.0);
        assert!(usage.knows_cluster("q1-0"));
    }
}
