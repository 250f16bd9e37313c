//! Tenant snapshots
//!
//! A snapshot is one document holding everything a pass looks at: the
//! plan catalog, the router, the deployed broker clusters and the address
//! objects. The CLI loads one into a `MemoryPlatform` to run passes offline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;
use crate::cluster::{MemoryPlatform, ResourceSet, RouterCluster};
use crate::schema::{Schema, StaticSchema};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("Failed to parse snapshot: {0}")]
    Parse(String),

    #[error("Duplicate address '{0}' in snapshot")]
    DuplicateAddress(String),

    #[error("Duplicate broker cluster '{0}' in snapshot")]
    DuplicateCluster(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Tenant namespace; addresses without one are placed here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_space: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_space_plan: Option<String>,

    #[serde(default)]
    pub schema: Schema,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router: Option<RouterCluster>,

    #[serde(default)]
    pub clusters: Vec<ResourceSet>,

    #[serde(default)]
    pub addresses: Vec<Address>,
}

impl Snapshot {
    /// Parse a snapshot from YAML or JSON
    pub fn from_str(content: &str) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot =
            serde_yaml::from_str(content).map_err(|e| SnapshotError::Parse(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn validate(&self) -> Result<(), SnapshotError> {
        let mut names = std::collections::BTreeSet::new();
        for address in &self.addresses {
            if !names.insert(address.name()) {
                return Err(SnapshotError::DuplicateAddress(address.name().to_string()));
            }
        }
        let mut ids = std::collections::BTreeSet::new();
        for cluster in &self.clusters {
            if !ids.insert(cluster.cluster_id.as_str()) {
                return Err(SnapshotError::DuplicateCluster(cluster.cluster_id.clone()));
            }
        }
        Ok(())
    }

    pub fn catalog(&self) -> StaticSchema {
        StaticSchema::new(self.schema.clone())
    }

    /// Build a platform holding the snapshot's router, clusters and
    /// addresses, with addresses moved into `namespace` when they have none
    pub fn platform(&self, namespace: &str, auto_ready: bool) -> MemoryPlatform {
        let mut platform = MemoryPlatform::new().with_auto_ready(auto_ready);
        if let Some(router) = &self.router {
            platform = platform.with_router(router.clone());
        }
        for cluster in &self.clusters {
            platform = platform.with_cluster(cluster.clone());
        }
        for address in &self.addresses {
            let mut address = address.clone();
            if address.metadata.namespace.is_empty() {
                address.metadata.namespace = namespace.to_string();
            }
            platform.put_address(address);
        }
        platform
    }
}
