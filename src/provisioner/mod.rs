//! # Address provisioner
//!
//! Computes what capacity a tenant is using, decides which new addresses fit
//! within its allowances and where they go, and asks the platform for it.
//!
//! One pass runs three steps strictly in order:
//!
//! ```text
//! check_usage(placed)            -> UsageMap
//! check_quota(usage, candidates) -> QuotaOutcome   (admission + placement)
//! provision_resources(outcome)   -> ProvisionReport (router scale, creates)
//! ```
//!
//! `upgrade_clusters` then folds catalog changes into running clusters.

pub mod ids;
pub mod provision;
pub mod quota;
pub mod usage;

pub use ids::{
    sanitize_name, shard_cluster_ids, ClusterIdGenerator, CounterIdGenerator, UuidIdGenerator,
};
pub use provision::ProvisionReport;
pub use quota::{Allocation, Placement, QuotaOutcome};
pub use usage::{UsageInfo, UsageMap, PARTITION_ALL};

use std::sync::Arc;

use tracing::warn;

use crate::address::{find_topic, Address, AddressType, BrokerState};
use crate::cluster::{ClusterGenerator, OrchestrationClient, DEFAULT_ROUTER_NAME};
use crate::schema::{AddressResolver, RESOURCE_BROKER};

/// Placement policy knobs
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionerConfig {
    /// Subscriptions colocated on a topic's brokers before they get their own
    pub max_subscriptions_per_broker: u32,
    /// Broker credit one pooled broker can host
    pub pooled_broker_capacity: f64,
    /// Router credit served by one router replica
    pub router_capacity: f64,
    /// Name of the router stateful set
    pub router_name: String,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            max_subscriptions_per_broker: 10,
            pooled_broker_capacity: 1.0,
            router_capacity: 1.0,
            router_name: DEFAULT_ROUTER_NAME.to_string(),
        }
    }
}

pub struct AddressProvisioner {
    resolver: AddressResolver,
    generator: Arc<dyn ClusterGenerator>,
    client: Arc<dyn OrchestrationClient>,
    ids: Arc<dyn ClusterIdGenerator>,
    config: ProvisionerConfig,
}

impl AddressProvisioner {
    pub fn new(
        resolver: AddressResolver,
        generator: Arc<dyn ClusterGenerator>,
        client: Arc<dyn OrchestrationClient>,
        ids: Arc<dyn ClusterIdGenerator>,
        config: ProvisionerConfig,
    ) -> Self {
        Self {
            resolver,
            generator,
            client,
            ids,
            config,
        }
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn resolver(&self) -> &AddressResolver {
        &self.resolver
    }

    /// Usage committed by addresses that already hold capacity.
    ///
    /// Router and other tenant-wide resources are accounted under `"all"`.
    /// Broker credit is split across the address's active clusters, or goes
    /// under `"all"` while the address has none. Subscriptions sitting on
    /// their topic's clusters contribute no broker credit, up to the
    /// colocation threshold.
    pub fn check_usage(&self, addresses: &[Address]) -> UsageMap {
        let mut placed: Vec<&Address> = addresses
            .iter()
            .filter(|a| !a.is_deleted() && a.status.phase.is_placed())
            .collect();
        placed.sort_by(|a, b| a.name().cmp(b.name()));

        let capacity = self.config.pooled_broker_capacity;
        let mut usage = UsageMap::new();

        for address in placed {
            let plan = match self.resolver.placed_plan(address) {
                Ok(plan) => plan,
                Err(e) => {
                    warn!("Skipping usage of address {}: {}", address.name(), e);
                    continue;
                }
            };

            let definition = self.resolver.admitted_definition(address);
            let active = address.status.clusters_in_state(BrokerState::Active);
            let colocated_topic = self.colocated_topic(address, &active, addresses, &usage);

            for (resource, cost) in &plan.resources {
                if resource != RESOURCE_BROKER {
                    usage = usage.with_used(resource, PARTITION_ALL, *cost);
                    continue;
                }
                if colocated_topic.is_some() {
                    continue;
                }
                if active.is_empty() {
                    usage = usage.with_used(resource, PARTITION_ALL, *cost);
                    continue;
                }
                let share = cost / active.len() as f64;
                for cluster_id in &active {
                    usage = usage.with_used(resource, cluster_id, share);
                    if plan.is_pooled(capacity) {
                        usage = usage.with_pooled(cluster_id, definition.as_deref());
                    }
                }
            }

            if let Some(topic) = colocated_topic {
                usage = usage.with_colocated(&topic);
            }
        }

        usage
    }

    /// Topic a placed subscription is colocated with, if any
    fn colocated_topic(
        &self,
        address: &Address,
        active: &[String],
        addresses: &[Address],
        usage: &UsageMap,
    ) -> Option<String> {
        if address.spec.address_type != AddressType::Subscription || active.is_empty() {
            return None;
        }
        let topic = address.spec.topic.as_deref()?;
        let parent = find_topic(topic, addresses)?;
        if !parent.status.phase.is_placed() {
            return None;
        }

        let parent_active = parent.status.clusters_in_state(BrokerState::Active);
        let on_parent = active.iter().all(|id| parent_active.contains(id));
        if on_parent && usage.colocated(topic) < self.config.max_subscriptions_per_broker {
            Some(topic.to_string())
        } else {
            None
        }
    }
}
