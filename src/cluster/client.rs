//! Orchestration platform seam
//!
//! The platform is the single writer of physical cluster state. The
//! controller reads it once per pass and issues create/scale/delete calls.

use async_trait::async_trait;
use thiserror::Error;

use super::broker::{BrokerCluster, RouterCluster};
use super::resources::ResourceSet;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Resource '{0}' not found")]
    NotFound(String),

    #[error("Resource '{0}' already exists")]
    AlreadyExists(String),

    #[error("Platform error: {0}")]
    Api(String),
}

// ============================================================================
// SBIO: Trait for abstraction (allows an in-memory platform in tests)
// ============================================================================

#[async_trait]
pub trait OrchestrationClient: Send + Sync {
    /// Currently running broker clusters with their readiness
    async fn list_clusters(&self) -> Result<Vec<BrokerCluster>, ClientError>;

    async fn get_router(&self, name: &str) -> Result<RouterCluster, ClientError>;

    async fn scale_stateful_set(&self, name: &str, replicas: u32) -> Result<(), ClientError>;

    async fn create(&self, resources: &ResourceSet) -> Result<(), ClientError>;

    /// Update an existing resource set in place
    async fn apply(&self, resources: &ResourceSet) -> Result<(), ClientError>;

    async fn delete(&self, resources: &ResourceSet) -> Result<(), ClientError>;
}
