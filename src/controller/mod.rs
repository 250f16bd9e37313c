//! # Address controller
//!
//! One reconciliation pass over the complete address set of one tenant:
//!
//! 1. Deleted addresses release their associations and finalizer
//! 2. Plan changes are detected through the applied-plan annotation
//! 3. Validation against the catalog and sibling addresses
//! 4. Collision resolution among valid addresses
//! 5. Usage, quota and provisioning of candidates
//! 6. In-place upgrade or replacement of running broker clusters
//! 7. Readiness, pruning of finished migrations
//! 8. Garbage collection of unreferenced clusters
//!
//! Global failures (catalog, cluster listing, router) abort the pass before
//! anything is written. Everything after that is isolated per address.

pub mod collision;
pub mod gc;
pub mod runner;
pub mod status;

pub use collision::{collision_message, collision_order, resolve_collisions};
pub use gc::{collect_garbage, orphaned_clusters, referenced_clusters};
pub use runner::{needs_pass, spawn_controller, RunnerConfig};
pub use status::{evaluate_readiness, Readiness};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::address::{validate_address, Address, Phase};
use crate::cluster::{BrokerCluster, ClientError, OrchestrationClient};
use crate::provisioner::AddressProvisioner;
use crate::schema::SchemaError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    #[error("Failed to resolve address space plan: {0}")]
    Schema(#[from] SchemaError),

    #[error("Failed to list broker clusters: {0}")]
    ListClusters(ClientError),

    #[error("Failed to read router '{name}': {source}")]
    Router { name: String, source: ClientError },

    #[error("Failed to list addresses: {0}")]
    ListAddresses(ClientError),
}

pub struct AddressController {
    address_space: String,
    address_space_plan: String,
    provisioner: AddressProvisioner,
    client: Arc<dyn OrchestrationClient>,
    /// Held for the duration of a pass
    pass: Mutex<()>,
}

impl AddressController {
    pub fn new(
        address_space: impl Into<String>,
        address_space_plan: impl Into<String>,
        provisioner: AddressProvisioner,
        client: Arc<dyn OrchestrationClient>,
    ) -> Self {
        Self {
            address_space: address_space.into(),
            address_space_plan: address_space_plan.into(),
            provisioner,
            client,
            pass: Mutex::new(()),
        }
    }

    pub fn address_space(&self) -> &str {
        &self.address_space
    }

    /// Run one pass and return every address with its updated status,
    /// sorted by resource name.
    pub async fn reconcile(&self, addresses: Vec<Address>) -> Result<Vec<Address>, ControllerError> {
        let _pass = self.pass.lock().await;

        let resolver = self.provisioner.resolver();
        let space_plan = resolver.address_space_plan(&self.address_space_plan)?;
        let clusters = self
            .client
            .list_clusters()
            .await
            .map_err(ControllerError::ListClusters)?;
        let router_name = &self.provisioner.config().router_name;
        let router = self
            .client
            .get_router(router_name)
            .await
            .map_err(|source| ControllerError::Router {
                name: router_name.clone(),
                source,
            })?;

        debug!(
            "Reconciling {} addresses of {} against {} broker clusters",
            addresses.len(),
            self.address_space,
            clusters.len()
        );

        let mut addresses = addresses;
        addresses.sort_by(|a, b| a.name().cmp(b.name()));

        // Deletion and bookkeeping
        let mut finished: Vec<Address> = Vec::new();
        let mut live: Vec<Address> = Vec::new();
        for mut address in addresses {
            if address.is_deleted() {
                status::release(&mut address);
                finished.push(address);
                continue;
            }
            address.add_finalizer();
            address.status.clear_messages();
            live.push(address);
        }

        let mut plan_changed: BTreeSet<String> = BTreeSet::new();
        for address in live.iter_mut() {
            if plan_has_changed(address) {
                info!(
                    "Address {} changed plan to {}",
                    address.name(),
                    address.spec.plan
                );
                plan_changed.insert(address.name().to_string());
            }
            let plan = address.spec.plan.clone();
            address.set_applied_plan(&plan);
        }

        // Validation
        let siblings = live.clone();
        let mut valid: Vec<Address> = Vec::new();
        for mut address in live {
            match validate_address(&address, &siblings, resolver, &space_plan) {
                Ok(_) => valid.push(address),
                Err(message) => {
                    debug!("Address {} is invalid: {}", address.name(), message);
                    exclude(&mut address, message);
                    finished.push(address);
                }
            }
        }

        // Collisions
        let losers = resolve_collisions(&valid);
        let mut winners: Vec<Address> = Vec::new();
        for mut address in valid {
            match losers.get(address.name()) {
                Some(winner) => {
                    let message = collision_message(&address.spec.address, winner);
                    exclude(&mut address, message);
                    finished.push(address);
                }
                None => winners.push(address),
            }
        }

        // Provisioning
        let (mut candidates, placed): (Vec<Address>, Vec<Address>) =
            winners.into_iter().partition(|a| {
                !a.status.phase.is_placed() || plan_changed.contains(a.name())
            });

        let mut everyone = placed.clone();
        everyone.extend(candidates.iter().cloned());

        let usage = self.provisioner.check_usage(&placed);
        let outcome = self
            .provisioner
            .check_quota(&space_plan, usage, &mut candidates, &everyone);
        let report = self
            .provisioner
            .provision_resources(&router, &clusters, &outcome, &mut candidates)
            .await;

        let mut provisioned = placed;
        provisioned.extend(candidates);
        provisioned.sort_by(|a, b| a.name().cmp(b.name()));

        let replacements = self
            .provisioner
            .upgrade_clusters(&clusters, &mut provisioned)
            .await;

        // Readiness
        let mut readiness = Readiness {
            clusters: clusters
                .iter()
                .map(|c| (c.cluster_id.clone(), c.is_ready()))
                .collect::<BTreeMap<_, _>>(),
            router: router.is_ready(),
        };
        for created in report.created.iter().chain(replacements.iter()) {
            let cluster = BrokerCluster::new(created.clone());
            readiness
                .clusters
                .insert(cluster.cluster_id.clone(), cluster.is_ready());
        }
        for address in provisioned.iter_mut() {
            let needs_router = resolver
                .placed_plan(address)
                .map(|p| p.needs_router())
                .unwrap_or(false);
            evaluate_readiness(address, &readiness, needs_router);
        }

        // Garbage collection
        let mut result = provisioned;
        result.extend(finished);
        result.sort_by(|a, b| a.name().cmp(b.name()));

        let deleted = collect_garbage(self.client.as_ref(), &clusters, &result).await;
        info!(
            "Reconciled {}: {} admitted, {} created, {} deleted",
            self.address_space,
            outcome.allocations.len() - report.failed.len(),
            report.created.len() + replacements.len(),
            deleted.len()
        );

        Ok(result)
    }
}

/// Whether the declared plan differs from the one last applied
fn plan_has_changed(address: &Address) -> bool {
    match address.applied_plan() {
        Some(applied) => applied != address.spec.plan,
        None => address
            .status
            .plan_status
            .as_ref()
            .map(|p| p.name != address.spec.plan)
            .unwrap_or(false),
    }
}

/// Take an address out of provisioning for this pass
fn exclude(address: &mut Address, message: String) {
    address.status.phase = Phase::Pending;
    address.status.ready = false;
    address.status.broker_statuses.clear();
    address.status.plan_status = None;
    address.status.messages = vec![message];
    address.status.forwarders = address
        .spec
        .forwarders
        .iter()
        .map(|f| crate::address::ForwarderStatus {
            name: f.name.clone(),
            ready: false,
            messages: Vec::new(),
        })
        .collect();
}
