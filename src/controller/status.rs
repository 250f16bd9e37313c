//! Readiness evaluation and broker association pruning
//!
//! SBIO pattern: pure functions over an address and observed cluster
//! readiness, no platform access.

use std::collections::BTreeMap;

use crate::address::{Address, BrokerState, ForwarderStatus, Phase};

pub const MESSAGE_ROUTER_NOT_READY: &str = "Router is not ready";
pub const MESSAGE_DELETING: &str = "Address is being deleted";

pub fn waiting_message(cluster_id: &str) -> String {
    format!("Waiting for broker cluster '{}' to become ready", cluster_id)
}

/// Observed readiness the pass evaluates addresses against
#[derive(Debug, Clone, Default)]
pub struct Readiness {
    /// Cluster id -> all replicas ready
    pub clusters: BTreeMap<String, bool>,
    pub router: bool,
}

impl Readiness {
    pub fn cluster_ready(&self, cluster_id: &str) -> bool {
        self.clusters.get(cluster_id).copied().unwrap_or(false)
    }
}

/// Update phase, ready flag, messages and forwarders of one address.
///
/// Once every active association is on a ready cluster, migrating and
/// draining associations are dropped and a configuring address becomes
/// active (provided the router is up when the plan needs it).
pub fn evaluate_readiness(address: &mut Address, readiness: &Readiness, needs_router: bool) {
    if !address.status.phase.is_placed() {
        address.status.ready = false;
        mirror_forwarders(address);
        return;
    }

    let unready: Vec<String> = address
        .status
        .clusters_in_state(BrokerState::Active)
        .into_iter()
        .filter(|id| !readiness.cluster_ready(id))
        .collect();

    if unready.is_empty() {
        prune_transitions(address);
    }

    let router_ok = !needs_router || readiness.router;
    if unready.is_empty() && router_ok && address.status.phase == Phase::Configuring {
        address.status.phase = Phase::Active;
    }

    for cluster_id in &unready {
        address.status.append_message(waiting_message(cluster_id));
    }
    if !router_ok {
        address.status.append_message(MESSAGE_ROUTER_NOT_READY);
    }

    address.status.ready = address.status.phase == Phase::Active
        && unready.is_empty()
        && router_ok
        && !address.status.has_transitions();
    mirror_forwarders(address);
}

/// Drop associations that are no longer active
pub fn prune_transitions(address: &mut Address) {
    address
        .status
        .broker_statuses
        .retain(|b| b.state == BrokerState::Active);
}

/// Release everything a deleted address holds
pub fn release(address: &mut Address) {
    address.status.broker_statuses.clear();
    address.status.phase = Phase::Terminating;
    address.status.ready = false;
    address.status.clear_messages();
    address.status.append_message(MESSAGE_DELETING);
    address.remove_finalizer();
    mirror_forwarders(address);
}

fn mirror_forwarders(address: &mut Address) {
    let ready = address.status.ready;
    address.status.forwarders = address
        .spec
        .forwarders
        .iter()
        .map(|f| ForwarderStatus {
            name: f.name.clone(),
            ready,
            messages: Vec::new(),
        })
        .collect();
}
