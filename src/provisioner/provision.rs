//! Applying placement decisions to the platform
//!
//! Router scaling happens first, then missing broker clusters are generated
//! (concurrently) and created (in cluster id order). An address whose router
//! or clusters could not be provisioned keeps its prior phase and gets an
//! error message; other addresses in the pass are unaffected.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::address::{Address, AddressType, BrokerState, BrokerStatus, Phase, PlanStatus};
use crate::cluster::{container_id, BrokerCluster, ResourceSet, RouterCluster};
use crate::events::{log_event, ControllerKind, ControllerReason};
use crate::schema::{AddressPlan, ResourceDefinition, EPSILON, RESOURCE_ROUTER};

use super::quota::{Allocation, Placement, QuotaOutcome};
use super::AddressProvisioner;

/// What a provisioning step changed on the platform
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProvisionReport {
    /// Broker clusters created, in creation order
    pub created: Vec<ResourceSet>,

    /// Router replicas after scaling, when scaled
    #[serde(rename = "routerReplicas", skip_serializing_if = "Option::is_none")]
    pub router_replicas: Option<u32>,

    /// Addresses whose provisioning failed
    pub failed: BTreeSet<String>,
}

/// A cluster to generate for one allocation
struct ClusterRequest {
    cluster_id: String,
    definition: ResourceDefinition,
    /// Owner of a dedicated cluster
    address: Option<Address>,
}

impl AddressProvisioner {
    /// Router replicas needed for `total` router credit, within the
    /// tenant's router allowance
    pub fn required_router_replicas(&self, total: f64, router_max: Option<f64>) -> u32 {
        let capacity = self.config.router_capacity;
        let needed = ((total / capacity - EPSILON).ceil().max(1.0)) as u32;
        match router_max {
            Some(max) => {
                let ceiling = ((max / capacity - EPSILON).ceil().max(1.0)) as u32;
                needed.min(ceiling)
            }
            None => needed,
        }
    }

    /// Bring the platform in line with `outcome` and record the resulting
    /// broker associations on each admitted candidate.
    pub async fn provision_resources(
        &self,
        router: &RouterCluster,
        clusters: &[BrokerCluster],
        outcome: &QuotaOutcome,
        candidates: &mut [Address],
    ) -> ProvisionReport {
        let mut report = ProvisionReport::default();
        let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();

        // Router
        let total = outcome.usage.resource_total(RESOURCE_ROUTER);
        let required = self.required_router_replicas(total, outcome.limits.get(RESOURCE_ROUTER).copied());
        if required != router.replicas {
            match self.client.scale_stateful_set(&router.name, required).await {
                Ok(()) => {
                    log_event(
                        ControllerReason::RouterScaled,
                        ControllerKind::Router,
                        &router.name,
                        &format!("Scaled router from {} to {} replicas", router.replicas, required),
                    );
                    report.router_replicas = Some(required);
                }
                Err(e) => {
                    log_event(
                        ControllerReason::RouterScaleFailed,
                        ControllerKind::Router,
                        &router.name,
                        &e.to_string(),
                    );
                    for (name, allocation) in &outcome.allocations {
                        if allocation.plan.needs_router() {
                            errors
                                .entry(name.clone())
                                .or_default()
                                .push(format!("Error scaling router: {}", e));
                        }
                    }
                }
            }
        }

        // Broker clusters
        let existing: BTreeMap<&str, &BrokerCluster> =
            clusters.iter().map(|c| (c.cluster_id.as_str(), c)).collect();
        let mut requests: BTreeMap<String, ClusterRequest> = BTreeMap::new();
        let mut failed_clusters: BTreeMap<String, String> = BTreeMap::new();

        let router_failed: BTreeSet<String> = errors.keys().cloned().collect();

        // Colocated subscriptions ride on clusters their topic provisions
        for (name, allocation) in &outcome.allocations {
            if router_failed.contains(name)
                || matches!(allocation.placement, Placement::Colocated { .. })
            {
                continue;
            }
            for cluster_id in allocation.placement.cluster_ids() {
                if let Some(cluster) = existing.get(cluster_id.as_str()) {
                    if let Some(message) = kind_mismatch(cluster, &allocation.placement) {
                        errors.entry(name.clone()).or_default().push(message);
                    }
                    continue;
                }
                if requests.contains_key(&cluster_id)
                    || failed_clusters.contains_key(&cluster_id)
                {
                    continue;
                }
                match self.cluster_request(&cluster_id, allocation, candidates, name) {
                    Ok(request) => {
                        requests.insert(cluster_id, request);
                    }
                    Err(message) => {
                        failed_clusters.insert(cluster_id, message);
                    }
                }
            }
        }

        let generated = join_all(requests.values().map(|request| async move {
            let result = self
                .generator
                .generate_cluster(
                    &request.cluster_id,
                    &request.definition,
                    1,
                    request.address.as_ref(),
                )
                .await;
            (request.cluster_id.clone(), result)
        }))
        .await;

        for (cluster_id, result) in generated {
            let created = match result {
                Ok(resources) => self
                    .client
                    .create(&resources)
                    .await
                    .map(|_| resources)
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match created {
                Ok(resources) => {
                    log_event(
                        ControllerReason::BrokerCreated,
                        ControllerKind::Broker,
                        &cluster_id,
                        "Created broker cluster",
                    );
                    report.created.push(resources);
                }
                Err(e) => {
                    log_event(
                        ControllerReason::BrokerCreateFailed,
                        ControllerKind::Broker,
                        &cluster_id,
                        &e,
                    );
                    failed_clusters.insert(cluster_id, e);
                }
            }
        }

        let created: BTreeSet<&str> = report.created.iter().map(|r| r.cluster_id.as_str()).collect();
        for (name, allocation) in &outcome.allocations {
            if router_failed.contains(name) {
                continue;
            }
            for cluster_id in allocation.placement.cluster_ids() {
                let failure = match failed_clusters.get(&cluster_id) {
                    Some(e) => Some(e.clone()),
                    None if !existing.contains_key(cluster_id.as_str())
                        && !created.contains(cluster_id.as_str()) =>
                    {
                        Some("cluster was not provisioned".to_string())
                    }
                    None => None,
                };
                if let Some(e) = failure {
                    errors
                        .entry(name.clone())
                        .or_default()
                        .push(format!("Error creating broker cluster '{}': {}", cluster_id, e));
                }
            }
        }

        // Statuses
        for candidate in candidates.iter_mut() {
            let Some(allocation) = outcome.allocations.get(candidate.name()) else {
                continue;
            };
            match errors.get(candidate.name()) {
                Some(messages) => {
                    candidate.status.phase = allocation.prior_phase;
                    for message in messages {
                        candidate.status.append_message(message.clone());
                    }
                    report.failed.insert(candidate.name().to_string());
                }
                None => {
                    apply_allocation(candidate, allocation, self.config.pooled_broker_capacity);
                }
            }
        }

        report
    }

    fn cluster_request(
        &self,
        cluster_id: &str,
        allocation: &Allocation,
        candidates: &[Address],
        owner: &str,
    ) -> Result<ClusterRequest, String> {
        let definition_name = allocation.plan.resource_definition.as_deref().ok_or_else(|| {
            format!("address plan '{}' has no resource definition", allocation.plan.name)
        })?;
        let definition = self
            .resolver
            .resource_definition(definition_name)
            .map_err(|e| e.to_string())?;

        let address = if allocation.placement.is_dedicated() {
            candidates.iter().find(|a| a.name() == owner).cloned()
        } else {
            None
        };

        Ok(ClusterRequest {
            cluster_id: cluster_id.to_string(),
            definition,
            address,
        })
    }

    /// Fold catalog changes into running broker clusters.
    ///
    /// Every listed cluster carrying active associations is regenerated from
    /// the resource definition of its first non-subscription owner. Changes
    /// that fit in place are applied; a storage change replaces the cluster
    /// under a fresh id and moves its owners through `Migrating`.
    ///
    /// Returns the replacement clusters created.
    pub async fn upgrade_clusters(
        &self,
        clusters: &[BrokerCluster],
        addresses: &mut [Address],
    ) -> Vec<ResourceSet> {
        let mut created = Vec::new();
        let mut taken: BTreeSet<String> = clusters.iter().map(|c| c.cluster_id.clone()).collect();
        taken.extend(
            addresses
                .iter()
                .flat_map(|a| a.status.broker_statuses.iter())
                .map(|b| b.cluster_id.clone()),
        );

        for cluster in clusters {
            let owners = active_owners(addresses, &cluster.cluster_id);
            let Some(owner) = owners
                .iter()
                .find(|a| a.spec.address_type != AddressType::Subscription)
                .or_else(|| owners.first())
                .map(|a| (*a).clone())
            else {
                continue;
            };
            let owner_names: Vec<String> = owners.iter().map(|a| a.name().to_string()).collect();

            let (plan, definition) = match self.owner_definition(&owner) {
                Ok(Some(found)) => found,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Cannot upgrade broker cluster {}: {}", cluster.cluster_id, e);
                    continue;
                }
            };
            let dedicated = !plan.is_pooled(self.config.pooled_broker_capacity);
            let address = dedicated.then_some(&owner);

            let upgraded = match self
                .generator
                .generate_cluster(&cluster.cluster_id, &definition, cluster.replicas(), address)
                .await
            {
                Ok(upgraded) => upgraded,
                Err(e) => {
                    warn!("Cannot regenerate broker cluster {}: {}", cluster.cluster_id, e);
                    continue;
                }
            };

            let mut current = cluster.clone();
            if current.update_resources(&upgraded) {
                match self.client.apply(&current.resources).await {
                    Ok(()) => log_event(
                        ControllerReason::BrokerUpdated,
                        ControllerKind::Broker,
                        &cluster.cluster_id,
                        "Updated broker cluster in place",
                    ),
                    Err(e) => warn!("Failed to update broker cluster {}: {}", cluster.cluster_id, e),
                }
                continue;
            }
            if !current.should_replace() {
                debug!("Broker cluster {} is up to date", cluster.cluster_id);
                continue;
            }

            let replacement_id = loop {
                let id = self.ids.next_id();
                if taken.insert(id.clone()) {
                    break id;
                }
            };
            let replacement = self
                .generator
                .generate_cluster(&replacement_id, &definition, cluster.replicas(), address)
                .await
                .map_err(|e| e.to_string());
            let result = match replacement {
                Ok(resources) => self
                    .client
                    .create(&resources)
                    .await
                    .map(|_| resources)
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e),
            };

            match result {
                Ok(resources) => {
                    log_event(
                        ControllerReason::BrokerReplaced,
                        ControllerKind::Broker,
                        &cluster.cluster_id,
                        &format!("Replacing broker cluster with {}", replacement_id),
                    );
                    for address in addresses.iter_mut() {
                        if owner_names.iter().any(|n| n == address.name()) {
                            migrate(address, &cluster.cluster_id, &replacement_id);
                        }
                    }
                    created.push(resources);
                }
                Err(e) => {
                    log_event(
                        ControllerReason::BrokerCreateFailed,
                        ControllerKind::Broker,
                        &replacement_id,
                        &e,
                    );
                    for address in addresses.iter_mut() {
                        if owner_names.iter().any(|n| n == address.name()) {
                            address.status.append_message(format!(
                                "Error replacing broker cluster '{}': {}",
                                cluster.cluster_id, e
                            ));
                        }
                    }
                }
            }
        }

        created
    }

    fn owner_definition(
        &self,
        owner: &Address,
    ) -> Result<Option<(AddressPlan, ResourceDefinition)>, String> {
        let plan = self.resolver.placed_plan(owner).map_err(|e| e.to_string())?;
        let Some(name) = plan.resource_definition.clone() else {
            return Ok(None);
        };
        let definition = self
            .resolver
            .resource_definition(&name)
            .map_err(|e| e.to_string())?;
        Ok(Some((plan, definition)))
    }
}

/// Error for placing onto an existing cluster of the other broker kind
fn kind_mismatch(cluster: &BrokerCluster, placement: &Placement) -> Option<String> {
    let wanted = placement.broker_kind()?;
    let actual = cluster.resources.broker_kind()?;
    (actual != wanted).then(|| {
        format!(
            "Broker cluster '{}' is a {} broker, not {}",
            cluster.cluster_id, actual, wanted
        )
    })
}

/// Placed addresses with an active association on `cluster_id`, by name
fn active_owners<'a>(addresses: &'a [Address], cluster_id: &str) -> Vec<&'a Address> {
    let mut owners: Vec<&Address> = addresses
        .iter()
        .filter(|a| !a.is_deleted() && a.status.phase.is_placed())
        .filter(|a| {
            a.status
                .broker_statuses
                .iter()
                .any(|b| b.state == BrokerState::Active && b.cluster_id == cluster_id)
        })
        .collect();
    owners.sort_by(|a, b| a.name().cmp(b.name()));
    owners
}

/// Record an admitted placement on the address
fn apply_allocation(address: &mut Address, allocation: &Allocation, broker_capacity: f64) {
    let target = allocation.placement.cluster_ids();
    let previous = address.status.clusters_in_state(BrokerState::Active);

    // Shrinking onto a subset (or off brokers entirely) drains, moving migrates
    let shrink = target.iter().all(|id| previous.contains(id));
    let leaving = if shrink {
        BrokerState::Draining
    } else {
        BrokerState::Migrating
    };

    for status in address.status.broker_statuses.iter_mut() {
        if target.contains(&status.cluster_id) {
            status.state = BrokerState::Active;
        } else if status.state == BrokerState::Active {
            status.state = leaving;
        }
    }
    for cluster_id in &target {
        if !address
            .status
            .broker_statuses
            .iter()
            .any(|b| &b.cluster_id == cluster_id)
        {
            address
                .status
                .broker_statuses
                .push(BrokerStatus::active(cluster_id.clone(), container_id(cluster_id)));
        }
    }
    address
        .status
        .broker_statuses
        .sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));

    address.status.plan_status = Some(PlanStatus {
        name: allocation.plan.name.clone(),
        partitions: allocation.plan.partitions(broker_capacity),
        resources: allocation.plan.resources.clone(),
    });
    if address.status.phase == Phase::Pending {
        address.status.phase = Phase::Configuring;
    }
    address.status.clear_messages();

    if let Placement::Colocated { topic, .. } = &allocation.placement {
        debug!("Address {} colocated with topic {}", address.name(), topic);
    }
    info!(
        "Placed address {} on {:?}",
        address.name(),
        address.status.clusters_in_state(BrokerState::Active)
    );
}

/// Move an address's active association from `from` to `to`
fn migrate(address: &mut Address, from: &str, to: &str) {
    for status in address.status.broker_statuses.iter_mut() {
        if status.cluster_id == from && status.state == BrokerState::Active {
            status.state = BrokerState::Migrating;
        }
    }
    address
        .status
        .broker_statuses
        .push(BrokerStatus::active(to, container_id(to)));
    address
        .status
        .broker_statuses
        .sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
}
