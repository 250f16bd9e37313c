//! Quota checking and placement
//!
//! Candidates are admitted one at a time in a fixed order. Each admission is
//! probed on a copy of the usage map; a rejected candidate leaves the map it
//! was given untouched.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::address::{find_topic, Address, AddressType, BrokerState, Phase, PlacementPolicy};
use crate::cluster::{BROKER_KIND_POOLED, BROKER_KIND_SHARDED};
use crate::schema::{AddressPlan, AddressSpacePlan, EPSILON, RESOURCE_AGGREGATE, RESOURCE_BROKER};

use super::ids::shard_cluster_ids;
use super::usage::{UsageMap, PARTITION_ALL};
use super::AddressProvisioner;

/// Partition key a not-yet-named pooled cluster is probed under
const UNNAMED_CLUSTER: &str = "<new>";

pub const MESSAGE_QUOTA_EXCEEDED: &str = "Quota exceeded";

/// Where an admitted address goes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Placement {
    /// No broker footprint
    RouterOnly,
    /// Shares one pooled broker
    #[serde(rename_all = "camelCase")]
    Pooled { cluster_id: String, new_cluster: bool },
    /// One dedicated broker per partition
    #[serde(rename_all = "camelCase")]
    Sharded { cluster_ids: Vec<String> },
    /// On the brokers of its parent topic
    #[serde(rename_all = "camelCase")]
    Colocated {
        topic: String,
        cluster_ids: Vec<String>,
    },
}

impl Placement {
    pub fn cluster_ids(&self) -> Vec<String> {
        match self {
            Placement::RouterOnly => Vec::new(),
            Placement::Pooled { cluster_id, .. } => vec![cluster_id.clone()],
            Placement::Sharded { cluster_ids } | Placement::Colocated { cluster_ids, .. } => {
                cluster_ids.clone()
            }
        }
    }

    /// Whether the clusters are dedicated to this address
    pub fn is_dedicated(&self) -> bool {
        matches!(self, Placement::Sharded { .. })
    }

    /// Broker kind the target clusters must carry
    pub fn broker_kind(&self) -> Option<&'static str> {
        match self {
            Placement::Pooled { .. } => Some(BROKER_KIND_POOLED),
            Placement::Sharded { .. } => Some(BROKER_KIND_SHARDED),
            Placement::RouterOnly | Placement::Colocated { .. } => None,
        }
    }
}

/// An admitted candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub plan: AddressPlan,
    pub placement: Placement,
    /// Phase before admission, restored if provisioning fails
    pub prior_phase: Phase,
}

/// Result of a quota check
#[derive(Debug, Clone, Default)]
pub struct QuotaOutcome {
    /// Usage after every admission was committed
    pub usage: UsageMap,
    /// Admitted candidates by resource name
    pub allocations: BTreeMap<String, Allocation>,
    /// Resource allowances the check ran against
    pub limits: BTreeMap<String, f64>,
}

enum Target {
    Placed(Placement),
    NewPool,
    Waiting(String),
}

impl AddressProvisioner {
    /// Admit and place `candidates` against `usage`.
    ///
    /// Non-subscriptions go first, then subscriptions, each by ascending
    /// resource name, so topics admitted in this pass can take their
    /// subscriptions with them. `addresses` is the full tenant used to find
    /// parent topics and the cluster ids already spoken for.
    ///
    /// Rejected candidates become `Pending` with a message. Admitted ones
    /// become `Configuring` unless they are already `Active`.
    pub fn check_quota(
        &self,
        space_plan: &AddressSpacePlan,
        usage: UsageMap,
        candidates: &mut [Address],
        addresses: &[Address],
    ) -> QuotaOutcome {
        let limits = space_plan.limits();
        let mut usage = usage;
        let mut allocations = BTreeMap::new();

        let mut taken: BTreeSet<String> = addresses
            .iter()
            .flat_map(|a| a.status.broker_statuses.iter())
            .map(|b| b.cluster_id.clone())
            .collect();
        let mut topic_clusters = placed_topic_clusters(addresses);

        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| {
            let (a, b) = (&candidates[a], &candidates[b]);
            is_subscription(a)
                .cmp(&is_subscription(b))
                .then_with(|| a.name().cmp(b.name()))
        });

        for index in order {
            let candidate = &mut candidates[index];

            let plan = match self.resolver.plan(candidate) {
                Ok(plan) => plan,
                Err(e) => {
                    reject(candidate, e.to_string());
                    continue;
                }
            };

            let placement = match self.place(candidate, &plan, &usage, &topic_clusters) {
                Target::Placed(placement) => placement,
                Target::NewPool => Placement::Pooled {
                    cluster_id: UNNAMED_CLUSTER.to_string(),
                    new_cluster: true,
                },
                Target::Waiting(message) => {
                    reject(candidate, message);
                    continue;
                }
            };

            if let Placement::Sharded { cluster_ids } = &placement {
                if let Some(cluster_id) = shard_conflict(candidate, cluster_ids, &usage, &taken) {
                    reject(
                        candidate,
                        format!("Broker cluster '{}' is already in use", cluster_id),
                    );
                    continue;
                }
            }

            let probe = charge(usage.clone(), &plan, &placement);
            if !fits(&probe, &plan, &placement, &limits) {
                debug!("Address {} does not fit plan {}", candidate.name(), plan.name);
                reject(candidate, MESSAGE_QUOTA_EXCEEDED.to_string());
                continue;
            }

            let placement = match placement {
                Placement::Pooled {
                    new_cluster: true, ..
                } => Placement::Pooled {
                    cluster_id: self.fresh_cluster_id(&usage, &mut taken),
                    new_cluster: true,
                },
                other => other,
            };
            usage = charge(usage, &plan, &placement);

            let cluster_ids = placement.cluster_ids();
            taken.extend(cluster_ids.iter().cloned());
            if candidate.spec.address_type == AddressType::Topic {
                topic_clusters.insert(candidate.spec.address.clone(), cluster_ids.clone());
            }

            info!(
                "Admitted address {} with plan {} on {:?}",
                candidate.name(),
                plan.name,
                cluster_ids
            );

            let prior_phase = candidate.status.phase;
            if prior_phase != Phase::Active {
                candidate.status.phase = Phase::Configuring;
            }
            allocations.insert(
                candidate.name().to_string(),
                Allocation {
                    plan,
                    placement,
                    prior_phase,
                },
            );
        }

        QuotaOutcome {
            usage,
            allocations,
            limits,
        }
    }

    fn place(
        &self,
        candidate: &Address,
        plan: &AddressPlan,
        usage: &UsageMap,
        topic_clusters: &BTreeMap<String, Vec<String>>,
    ) -> Target {
        match candidate.spec.address_type.placement() {
            PlacementPolicy::RouterOnly => Target::Placed(Placement::RouterOnly),
            _ if !plan.needs_broker() => Target::Placed(Placement::RouterOnly),
            PlacementPolicy::ColocatedWithParent => {
                let topic = candidate.spec.topic.clone().unwrap_or_default();
                match topic_clusters.get(&topic) {
                    None => Target::Waiting(format!(
                        "Waiting for topic address '{}' to be placed",
                        topic
                    )),
                    Some(ids)
                        if !ids.is_empty()
                            && usage.colocated(&topic)
                                < self.config.max_subscriptions_per_broker =>
                    {
                        Target::Placed(Placement::Colocated {
                            topic,
                            cluster_ids: ids.clone(),
                        })
                    }
                    Some(_) => self.brokered(candidate, plan, usage),
                }
            }
            PlacementPolicy::Brokered => self.brokered(candidate, plan, usage),
        }
    }

    fn brokered(&self, candidate: &Address, plan: &AddressPlan, usage: &UsageMap) -> Target {
        let capacity = self.config.pooled_broker_capacity;
        if !plan.is_pooled(capacity) {
            let partitions = plan.partitions(capacity);
            return Target::Placed(Placement::Sharded {
                cluster_ids: shard_cluster_ids(candidate.name(), partitions),
            });
        }

        let definition = plan.resource_definition.as_deref();
        let cost = plan.cost(RESOURCE_BROKER);
        let fits_on = |cluster_id: &str| {
            let used = usage
                .get(RESOURCE_BROKER, cluster_id)
                .map(|u| u.total())
                .unwrap_or(0.0);
            used + cost <= capacity + EPSILON
        };

        // Stay where we are when the pool matches the plan's definition
        let current = candidate.status.clusters_in_state(BrokerState::Active);
        if let Some(cluster_id) = current.iter().find(|id| {
            let same_pool = if usage.is_pooled(id) {
                usage.is_pool_for(id, definition)
            } else {
                self.was_pooled(candidate)
            };
            same_pool && fits_on(id)
        }) {
            return Target::Placed(Placement::Pooled {
                cluster_id: cluster_id.clone(),
                new_cluster: false,
            });
        }

        for (cluster_id, _) in usage.pooled_clusters(definition) {
            if fits_on(&cluster_id) {
                return Target::Placed(Placement::Pooled {
                    cluster_id,
                    new_cluster: false,
                });
            }
        }

        Target::NewPool
    }

    /// Whether the address was admitted with a pooled plan before
    fn was_pooled(&self, address: &Address) -> bool {
        let capacity = self.config.pooled_broker_capacity;
        match &address.status.plan_status {
            Some(snapshot) => {
                let cost = snapshot.resources.get(RESOURCE_BROKER).copied().unwrap_or(0.0);
                snapshot.partitions <= 1
                    && cost < capacity - EPSILON
                    && address.status.clusters_in_state(BrokerState::Active).len() == 1
            }
            None => false,
        }
    }

    fn fresh_cluster_id(&self, usage: &UsageMap, taken: &mut BTreeSet<String>) -> String {
        loop {
            let id = self.ids.next_id();
            if !taken.contains(&id) && !usage.knows_cluster(&id) {
                taken.insert(id.clone());
                return id;
            }
        }
    }
}

/// First shard id already held by another address or by a pool
fn shard_conflict<'a>(
    candidate: &Address,
    cluster_ids: &'a [String],
    usage: &UsageMap,
    taken: &BTreeSet<String>,
) -> Option<&'a String> {
    let own: BTreeSet<&str> = candidate
        .status
        .broker_statuses
        .iter()
        .map(|b| b.cluster_id.as_str())
        .collect();
    cluster_ids.iter().find(|id| {
        usage.is_pooled(id) || (taken.contains(id.as_str()) && !own.contains(id.as_str()))
    })
}

fn is_subscription(address: &Address) -> bool {
    address.spec.address_type == AddressType::Subscription
}

fn reject(candidate: &mut Address, message: String) {
    debug!("Rejected address {}: {}", candidate.name(), message);
    candidate.status.phase = Phase::Pending;
    candidate.status.append_message(message);
}

/// Active clusters of placed topics, by address string
fn placed_topic_clusters(addresses: &[Address]) -> BTreeMap<String, Vec<String>> {
    let mut topics = BTreeMap::new();
    for address in addresses {
        if address.spec.address_type != AddressType::Topic || topics.contains_key(&address.spec.address) {
            continue;
        }
        if let Some(winner) = find_topic(&address.spec.address, addresses) {
            if winner.spec.address_type == AddressType::Topic && winner.status.phase.is_placed() {
                topics.insert(
                    winner.spec.address.clone(),
                    winner.status.clusters_in_state(BrokerState::Active),
                );
            }
        }
    }
    topics
}

/// Add the cost of `plan` placed at `placement` to `usage`
fn charge(usage: UsageMap, plan: &AddressPlan, placement: &Placement) -> UsageMap {
    let mut usage = usage;
    for (resource, cost) in &plan.resources {
        if resource != RESOURCE_BROKER {
            usage = usage.with_needed(resource, PARTITION_ALL, *cost);
            continue;
        }
        usage = match placement {
            Placement::RouterOnly => usage.with_needed(resource, PARTITION_ALL, *cost),
            Placement::Pooled { cluster_id, .. } => usage
                .with_needed(resource, cluster_id, *cost)
                .with_pooled(cluster_id, plan.resource_definition.as_deref()),
            Placement::Sharded { cluster_ids } => {
                let share = cost / cluster_ids.len().max(1) as f64;
                cluster_ids
                    .iter()
                    .fold(usage, |u, id| u.with_needed(resource, id, share))
            }
            Placement::Colocated { .. } => usage,
        };
    }
    if let Placement::Colocated { topic, .. } = placement {
        usage = usage.with_colocated(topic);
    }
    usage
}

/// Whether `usage` stays within every allowance `plan` draws on
fn fits(
    usage: &UsageMap,
    plan: &AddressPlan,
    placement: &Placement,
    limits: &BTreeMap<String, f64>,
) -> bool {
    for resource in plan.resources.keys() {
        if resource == RESOURCE_BROKER && matches!(placement, Placement::Colocated { .. }) {
            continue;
        }
        let max = limits.get(resource).copied().unwrap_or(0.0);
        if max <= EPSILON || !usage.within(resource, max) {
            return false;
        }
    }
    match limits.get(RESOURCE_AGGREGATE) {
        Some(max) => usage.aggregate_total() <= max + EPSILON,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{provisioner, provisioner_with};
    use super::super::ProvisionerConfig;
    use super::*;
    use crate::address::BrokerStatus;
    use crate::cluster::MemoryPlatform;
    use crate::schema::{fixtures, RESOURCE_ROUTER};

    fn space_plan(name: &str) -> AddressSpacePlan {
        fixtures::resolver().address_space_plan(name).unwrap()
    }

    fn queue(name: &str, plan: &str) -> Address {
        Address::new(name, name, AddressType::Queue, plan)
    }

    #[test]
    fn test_pooled_queues_share_a_broker() {
        let provisioner = provisioner(&MemoryPlatform::new());
        let mut candidates = vec![queue("q1", "small-queue"), queue("q2", "small-queue")];
        let all = candidates.clone();

        let outcome = provisioner.check_quota(&space_plan("small"), UsageMap::new(), &mut candidates, &all);

        assert_eq!(candidates[0].status.phase, Phase::Configuring);
        assert_eq!(candidates[1].status.phase, Phase::Configuring);
        let expected = Placement::Pooled {
            cluster_id: "broker-1".into(),
            new_cluster: true,
        };
        assert_eq!(outcome.allocations["q1"].placement, expected);
        assert_eq!(
            outcome.allocations["q2"].placement,
            Placement::Pooled {
                cluster_id: "broker-1".into(),
                new_cluster: false
            }
        );
        assert!((outcome.usage.needed_total(RESOURCE_BROKER) - 0.8).abs() < EPSILON);
    }

    #[test]
    fn test_third_small_queue_opens_new_pool() {
        let provisioner = provisioner(&MemoryPlatform::new());
        let mut candidates = vec![
            queue("q1", "small-queue"),
            queue("q2", "small-queue"),
            queue("q3", "small-queue"),
        ];
        let all = candidates.clone();

        let outcome = provisioner.check_quota(&space_plan("small"), UsageMap::new(), &mut candidates, &all);
        assert_eq!(
            outcome.allocations["q3"].placement.cluster_ids(),
            vec!["broker-2".to_string()]
        );
    }

    #[test]
    fn test_quota_exceeded() {
        let provisioner = provisioner(&MemoryPlatform::new());
        let mut candidates = vec![queue("q1", "mega-xlarge-queue")];
        let all = candidates.clone();

        let outcome = provisioner.check_quota(&space_plan("small"), UsageMap::new(), &mut candidates, &all);

        assert_eq!(candidates[0].status.phase, Phase::Pending);
        assert!(candidates[0]
            .status
            .messages
            .contains(&MESSAGE_QUOTA_EXCEEDED.to_string()));
        assert!(outcome.allocations.is_empty());
        assert!(outcome.usage.is_empty());
    }

    #[test]
    fn test_first_that_fit_by_name_are_admitted() {
        let provisioner = provisioner(&MemoryPlatform::new());
        // broker max 3.0: three large queues fit, the fourth does not
        let mut candidates: Vec<Address> = ["q4", "q2", "q1", "q3"]
            .iter()
            .map(|n| queue(n, "large-queue"))
            .collect();
        let all = candidates.clone();

        let outcome = provisioner.check_quota(&space_plan("small"), UsageMap::new(), &mut candidates, &all);

        let admitted: Vec<_> = outcome.allocations.keys().cloned().collect();
        assert_eq!(admitted, vec!["q1", "q2", "q3"]);
        let q4 = candidates.iter().find(|a| a.name() == "q4").unwrap();
        assert_eq!(q4.status.phase, Phase::Pending);
    }

    #[test]
    fn test_sharded_placement() {
        let provisioner = provisioner(&MemoryPlatform::new());
        let mut candidates = vec![queue("q1", "sharded-queue")];
        let all = candidates.clone();

        let outcome = provisioner.check_quota(&space_plan("small"), UsageMap::new(), &mut candidates, &all);
        let shards = shard_cluster_ids("q1", 2);
        assert_eq!(
            outcome.allocations["q1"].placement,
            Placement::Sharded {
                cluster_ids: shards.clone()
            }
        );
        assert!((outcome.usage.get(RESOURCE_BROKER, &shards[1]).unwrap().needed - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_zero_allowance_never_admits() {
        let provisioner = provisioner(&MemoryPlatform::new());
        let mut plan = space_plan("small");
        plan.resources.retain(|r| r.name != RESOURCE_ROUTER);
        let mut candidates = vec![Address::new("a1", "a1", AddressType::Anycast, "small-anycast")];
        let all = candidates.clone();

        let outcome = provisioner.check_quota(&plan, UsageMap::new(), &mut candidates, &all);
        assert!(outcome.allocations.is_empty());
        assert_eq!(candidates[0].status.phase, Phase::Pending);
    }

    #[test]
    fn test_aggregate_ceiling() {
        let provisioner = provisioner(&MemoryPlatform::new());
        let mut plan = space_plan("small");
        for allowance in plan.resources.iter_mut() {
            if allowance.name == RESOURCE_AGGREGATE {
                allowance.max = 3.5;
            }
        }
        let usage = UsageMap::new()
            .with_used(RESOURCE_ROUTER, PARTITION_ALL, 0.5)
            .with_used(RESOURCE_BROKER, "q0-0", 3.0);
        let mut candidates = vec![Address::new("a1", "a1", AddressType::Anycast, "small-anycast")];
        let all = candidates.clone();

        // router alone would be fine at 0.7, the aggregate reaches 3.7
        let outcome = provisioner.check_quota(&plan, usage, &mut candidates, &all);
        assert!(outcome.allocations.is_empty());
        assert_eq!(candidates[0].status.messages, vec![MESSAGE_QUOTA_EXCEEDED.to_string()]);
    }

    #[test]
    fn test_subscription_colocates_with_topic_admitted_same_pass() {
        let provisioner = provisioner(&MemoryPlatform::new());
        let topic = Address::new("t1", "t1", AddressType::Topic, "small-topic");
        let sub = Address::new("s1", "s1", AddressType::Subscription, "small-subscription")
            .with_topic("t1");
        // subscription sorts before the topic by name but is processed after
        let mut candidates = vec![sub, topic];
        let all = candidates.clone();

        let outcome = provisioner.check_quota(&space_plan("small"), UsageMap::new(), &mut candidates, &all);
        assert_eq!(
            outcome.allocations["s1"].placement,
            Placement::Colocated {
                topic: "t1".into(),
                cluster_ids: vec!["broker-1".into()]
            }
        );
        let broker = outcome.usage.get(RESOURCE_BROKER, "broker-1").unwrap();
        assert!((broker.needed - 0.2).abs() < EPSILON);
    }

    #[test]
    fn test_subscription_waits_for_unplaced_topic() {
        let provisioner = provisioner(&MemoryPlatform::new());
        let topic = Address::new("t1", "t1", AddressType::Topic, "small-topic");
        let mut candidates = vec![
            Address::new("s1", "s1", AddressType::Subscription, "small-subscription").with_topic("t1"),
        ];
        let all = vec![candidates[0].clone(), topic];

        let outcome = provisioner.check_quota(&space_plan("small"), UsageMap::new(), &mut candidates, &all);
        assert!(outcome.allocations.is_empty());
        assert_eq!(candidates[0].status.phase, Phase::Pending);
        assert_eq!(
            candidates[0].status.messages,
            vec!["Waiting for topic address 't1' to be placed".to_string()]
        );
    }

    #[test]
    fn test_subscription_over_threshold_is_pooled() {
        let config = ProvisionerConfig {
            max_subscriptions_per_broker: 1,
            ..Default::default()
        };
        let provisioner = provisioner_with(&MemoryPlatform::new(), config);
        let topic = Address::new("t1", "t1", AddressType::Topic, "small-topic")
            .with_phase(Phase::Active)
            .with_broker(BrokerStatus::active("broker-1", "broker-1-0"));
        let mut candidates = vec![
            Address::new("s1", "s1", AddressType::Subscription, "small-subscription").with_topic("t1"),
            Address::new("s2", "s2", AddressType::Subscription, "small-subscription").with_topic("t1"),
        ];
        let mut all = candidates.clone();
        all.push(topic.clone());
        let usage = provisioner.check_usage(&all);

        let outcome = provisioner.check_quota(&space_plan("small"), usage, &mut candidates, &all);
        assert!(matches!(
            outcome.allocations["s1"].placement,
            Placement::Colocated { .. }
        ));
        // second one pays for itself on the least loaded pool
        assert_eq!(
            outcome.allocations["s2"].placement,
            Placement::Pooled {
                cluster_id: "broker-1".into(),
                new_cluster: false
            }
        );
    }

    #[test]
    fn test_plan_change_keeps_active_phase_and_pool() {
        let provisioner = provisioner(&MemoryPlatform::new());
        let mut q1 = queue("q1", "small-queue")
            .with_phase(Phase::Active)
            .with_broker(BrokerStatus::active("broker-7", "broker-7-0"));
        q1.status.plan_status = Some(crate::address::PlanStatus {
            name: "small-queue".into(),
            partitions: 1,
            resources: [(RESOURCE_BROKER.to_string(), 0.4)].into_iter().collect(),
        });
        q1.spec.plan = "large-queue".into();
        let mut candidates = vec![q1];
        let all = candidates.clone();

        let outcome = provisioner.check_quota(&space_plan("small"), UsageMap::new(), &mut candidates, &all);
        assert_eq!(candidates[0].status.phase, Phase::Active);
        assert_eq!(
            outcome.allocations["q1"].placement,
            Placement::Sharded {
                cluster_ids: shard_cluster_ids("q1", 1)
            }
        );
        assert_eq!(outcome.allocations["q1"].prior_phase, Phase::Active);
    }

    #[test]
    fn test_fresh_ids_skip_referenced_clusters() {
        let provisioner = provisioner(&MemoryPlatform::new());
        // broker-1 is referenced but full
        let full = queue("q0", "small-queue")
            .with_phase(Phase::Active)
            .with_broker(BrokerStatus::active("broker-1", "broker-1-0"));
        let usage = UsageMap::new()
            .with_used(RESOURCE_BROKER, "broker-1", 1.0)
            .with_pooled("broker-1", Some("broker"));
        let mut candidates = vec![queue("q1", "small-queue")];
        let all = vec![full, candidates[0].clone()];

        let outcome = provisioner.check_quota(&space_plan("unlimited"), usage, &mut candidates, &all);
        assert_eq!(
            outcome.allocations["q1"].placement.cluster_ids(),
            vec!["broker-2".to_string()]
        );
    }

    #[test]
    fn test_shards_already_held_by_another_address_are_rejected() {
        let provisioner = provisioner(&MemoryPlatform::new());
        let shards = shard_cluster_ids("q1", 2);
        let mut holder = queue("q0", "sharded-queue").with_phase(Phase::Active);
        for id in &shards {
            holder = holder.with_broker(BrokerStatus::active(id.clone(), format!("{}-0", id)));
        }
        let mut candidates = vec![queue("q1", "sharded-queue")];
        let all = vec![holder, candidates[0].clone()];

        let outcome = provisioner.check_quota(&space_plan("unlimited"), UsageMap::new(), &mut candidates, &all);
        assert!(outcome.allocations.is_empty());
        assert_eq!(candidates[0].status.phase, Phase::Pending);
        assert_eq!(
            candidates[0].status.messages,
            vec![format!("Broker cluster '{}' is already in use", shards[0])]
        );
    }

    #[test]
    fn test_shards_never_land_on_a_pool() {
        let provisioner = provisioner(&MemoryPlatform::new());
        let shards = shard_cluster_ids("broker", 2);
        let usage = UsageMap::new()
            .with_used(RESOURCE_BROKER, &shards[0], 0.4)
            .with_pooled(&shards[0], Some("broker"));
        let mut candidates = vec![queue("broker", "sharded-queue")];
        let all = candidates.clone();

        let outcome = provisioner.check_quota(&space_plan("unlimited"), usage, &mut candidates, &all);
        assert!(outcome.allocations.is_empty());
        assert_eq!(candidates[0].status.phase, Phase::Pending);
    }

    #[test]
    fn test_pooled_first_fit_matches_resource_definition() {
        let provisioner = provisioner(&MemoryPlatform::new());
        let small = queue("q1", "small-queue")
            .with_phase(Phase::Active)
            .with_broker(BrokerStatus::active("broker-1", "broker-1-0"));
        let mut candidates = vec![queue("q2", "persisted-queue"), queue("q3", "small-queue")];
        let mut all = candidates.clone();
        all.push(small);
        let usage = provisioner.check_usage(&all);

        let outcome = provisioner.check_quota(&space_plan("unlimited"), usage, &mut candidates, &all);
        // broker-1 has room, but it was built from another definition
        assert_eq!(
            outcome.allocations["q2"].placement,
            Placement::Pooled {
                cluster_id: "broker-2".into(),
                new_cluster: true
            }
        );
        assert_eq!(
            outcome.allocations["q3"].placement,
            Placement::Pooled {
                cluster_id: "broker-1".into(),
                new_cluster: false
            }
        );
        assert!(outcome.usage.is_pool_for("broker-2", Some("large-broker")));
    }

    #[test]
    fn test_plan_change_to_other_definition_leaves_pool() {
        let provisioner = provisioner(&MemoryPlatform::new());
        let mut q1 = queue("q1", "small-queue")
            .with_phase(Phase::Active)
            .with_broker(BrokerStatus::active("broker-1", "broker-1-0"));
        q1.status.plan_status = Some(crate::address::PlanStatus {
            name: "small-queue".into(),
            partitions: 1,
            resources: [(RESOURCE_BROKER.to_string(), 0.4)].into_iter().collect(),
        });
        q1.spec.plan = "persisted-queue".into();
        let mut candidates = vec![q1];
        let all = candidates.clone();
        let usage = provisioner.check_usage(&all);

        let outcome = provisioner.check_quota(&space_plan("unlimited"), usage, &mut candidates, &all);
        assert_eq!(
            outcome.allocations["q1"].placement,
            Placement::Pooled {
                cluster_id: "broker-2".into(),
                new_cluster: true
            }
        );
    }
}
