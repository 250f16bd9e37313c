//! Command implementations for the CLI
//!
//! SBIO pattern: Commands return Results, I/O is handled by caller

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::address::{validate_address, Address, AddressApi};
use crate::cluster::{
    ClientError, MemoryPlatform, OrchestrationClient, ResourceSet, RouterCluster,
    TemplateClusterGenerator,
};
use crate::config::{ConfigError, ControllerOptions, OptionsError, OptionsFile, Snapshot};
use crate::controller::{
    collision_message, resolve_collisions, spawn_controller, AddressController, ControllerError,
};
use crate::provisioner::{AddressProvisioner, CounterIdGenerator};
use crate::schema::{AddressResolver, SchemaError};

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Options error: {0}")]
    Options(#[from] OptionsError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),

    #[error("Platform error: {0}")]
    Client(#[from] ClientError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(String),
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

// ============================================================================
// Options
// ============================================================================

/// Resolve controller options for a snapshot.
///
/// A snapshot names its own tenant, so its address space and plan take the
/// place of the options file values. The environment still wins over both.
pub fn resolve_options(
    snapshot: &Snapshot,
    file: &OptionsFile,
    env: &HashMap<String, String>,
) -> CommandResult<ControllerOptions> {
    let mut file = file.clone();
    if snapshot.address_space.is_some() {
        file.address_space = snapshot.address_space.clone();
    }
    if snapshot.address_space_plan.is_some() {
        file.address_space_plan = snapshot.address_space_plan.clone();
    }
    Ok(ControllerOptions::from_map(env, &file)?)
}

/// Wire a controller to a platform and the snapshot's catalog
pub fn build_controller(
    snapshot: &Snapshot,
    options: &ControllerOptions,
    platform: &MemoryPlatform,
) -> AddressController {
    let client: Arc<dyn OrchestrationClient> = Arc::new(platform.clone());
    let resolver = AddressResolver::new(Arc::new(snapshot.catalog()));
    let provisioner = AddressProvisioner::new(
        resolver,
        Arc::new(TemplateClusterGenerator::new()),
        client.clone(),
        Arc::new(CounterIdGenerator::default()),
        options.provisioner_config(),
    );
    AddressController::new(
        options.address_space.clone(),
        options.address_space_plan.clone(),
        provisioner,
        client,
    )
}

// ============================================================================
// Tenant state
// ============================================================================

/// Platform state of one tenant after the controller ran
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantView {
    pub address_space: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub router: Option<RouterCluster>,

    pub clusters: Vec<ResourceSet>,

    pub addresses: Vec<Address>,
}

pub async fn tenant_view(
    platform: &MemoryPlatform,
    options: &ControllerOptions,
) -> CommandResult<TenantView> {
    let addresses = platform.list_addresses(&options.address_space).await?;
    let clusters = platform
        .cluster_ids()
        .iter()
        .filter_map(|id| platform.cluster(id))
        .collect();
    Ok(TenantView {
        address_space: options.address_space.clone(),
        router: platform.router(&options.router_name),
        clusters,
        addresses,
    })
}

// ============================================================================
// Reconcile / Run Commands
// ============================================================================

/// Run `passes` passes over the snapshot, persisting results between them
pub async fn reconcile_snapshot(
    snapshot: &Snapshot,
    options: &ControllerOptions,
    passes: u32,
    auto_ready: bool,
) -> CommandResult<TenantView> {
    let platform = snapshot.platform(&options.address_space, auto_ready);
    let controller = build_controller(snapshot, options, &platform);

    for pass in 1..=passes.max(1) {
        let addresses = platform.list_addresses(&options.address_space).await?;
        let replaced = controller.on_update(&platform, addresses).await?;
        info!("Pass {}: {} addresses updated", pass, replaced);
    }

    tenant_view(&platform, options).await
}

/// Run the controller loop until `duration` elapses or Ctrl-C is pressed
pub async fn run_snapshot(
    snapshot: &Snapshot,
    options: &ControllerOptions,
    duration: Option<u64>,
) -> CommandResult<TenantView> {
    let platform = snapshot.platform(&options.address_space, true);
    let controller = Arc::new(build_controller(snapshot, options, &platform));
    let api: Arc<dyn AddressApi> = Arc::new(platform.clone());

    let shutdown = spawn_controller(controller, api, options.runner_config());

    match duration {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
        }
    }
    let _ = shutdown.send(());

    tenant_view(&platform, options).await
}

// ============================================================================
// Validate Commands
// ============================================================================

/// Validation result for one address
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub name: String,
    pub address: String,
    pub plan: String,
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Validate every live address of the snapshot, including collisions
pub fn validate_snapshot(
    snapshot: &Snapshot,
    options: &ControllerOptions,
) -> CommandResult<Vec<ValidationResult>> {
    let resolver = AddressResolver::new(Arc::new(snapshot.catalog()));
    let space_plan = resolver.address_space_plan(&options.address_space_plan)?;

    let live: Vec<Address> = snapshot
        .addresses
        .iter()
        .filter(|a| !a.is_deleted())
        .cloned()
        .collect();

    let mut results: Vec<ValidationResult> = live
        .iter()
        .map(|a| ValidationResult {
            name: a.name().to_string(),
            address: a.spec.address.clone(),
            plan: a.spec.plan.clone(),
            error: validate_address(a, &live, &resolver, &space_plan).err(),
        })
        .collect();

    let valid: Vec<Address> = live
        .iter()
        .zip(&results)
        .filter(|(_, r)| r.is_valid())
        .map(|(a, _)| a.clone())
        .collect();
    let losers = resolve_collisions(&valid);
    for result in results.iter_mut() {
        if let Some(winner) = losers.get(&result.name) {
            result.error = Some(collision_message(&result.address, winner));
        }
    }

    results.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(results)
}
