//! # Broker and router clusters
//!
//! The physical side of a tenant: what is deployed, how it is generated and
//! how the controller talks to the platform that runs it.
//!
//! ```text
//! ┌──────────────────┐   generate_cluster    ┌──────────────────────┐
//! │   Provisioner    │ ────────────────────▶ │  ClusterGenerator    │
//! │                  │                       └──────────────────────┘
//! │                  │   create/apply/scale  ┌──────────────────────┐
//! │                  │ ────────────────────▶ │ OrchestrationClient  │
//! └──────────────────┘ ◀──────────────────── │ (platform)           │
//!                          list_clusters     └──────────────────────┘
//! ```

pub mod broker;
pub mod client;
pub mod generator;
pub mod memory;
pub mod resources;

pub use broker::{container_id, BrokerCluster, RouterCluster};
pub use client::{ClientError, OrchestrationClient};
pub use generator::{ClusterGenerator, GeneratorError, TemplateClusterGenerator};
pub use memory::MemoryPlatform;
pub use resources::{
    ResourceSet, BROKER_KIND_POOLED, BROKER_KIND_SHARDED, LABEL_ADDRESS, LABEL_BROKER_KIND,
};

/// Default name of the router stateful set
pub const DEFAULT_ROUTER_NAME: &str = "qdrouterd";
