//! Schema/plan catalog lookup
//!
//! The catalog itself lives outside the controller. This module defines the
//! `SchemaProvider` seam, a static YAML-backed provider, and the
//! `AddressResolver` the controller and provisioner resolve plans through.

pub mod plans;

pub use plans::{
    AddressPlan, AddressSpacePlan, ResourceAllowance, ResourceDefinition, ResourceRequest,
    EPSILON, RESOURCE_AGGREGATE, RESOURCE_BROKER, RESOURCE_ROUTER,
};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::{Address, AddressType};

/// Errors resolving plans from the catalog
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Unknown address space plan '{0}'")]
    UnknownAddressSpacePlan(String),

    #[error("Unknown address plan '{plan}' for address type '{address_type}'")]
    UnknownAddressPlan {
        plan: String,
        address_type: AddressType,
    },

    #[error("Unknown resource definition '{0}'")]
    UnknownResourceDefinition(String),

    #[error("Failed to parse schema: {0}")]
    Parse(String),
}

// ============================================================================
// SBIO: Trait for abstraction (the catalog is external)
// ============================================================================

pub trait SchemaProvider: Send + Sync {
    fn resolve_address_plan(
        &self,
        address_type: AddressType,
        plan: &str,
    ) -> Result<AddressPlan, SchemaError>;

    fn resolve_address_space_plan(&self, plan: &str) -> Result<AddressSpacePlan, SchemaError>;

    fn resource_definition(&self, name: &str) -> Result<ResourceDefinition, SchemaError>;
}

/// A complete catalog snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "addressSpacePlans", default)]
    pub address_space_plans: Vec<AddressSpacePlan>,

    #[serde(rename = "addressPlans", default)]
    pub address_plans: Vec<AddressPlan>,

    #[serde(rename = "resourceDefinitions", default)]
    pub resource_definitions: Vec<ResourceDefinition>,
}

/// Catalog served from an in-memory `Schema` value
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    schema: Schema,
}

impl StaticSchema {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    /// Parse a catalog from YAML (JSON is accepted too)
    pub fn from_yaml(content: &str) -> Result<Self, SchemaError> {
        let schema: Schema =
            serde_yaml::from_str(content).map_err(|e| SchemaError::Parse(e.to_string()))?;
        Ok(Self::new(schema))
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl SchemaProvider for StaticSchema {
    fn resolve_address_plan(
        &self,
        address_type: AddressType,
        plan: &str,
    ) -> Result<AddressPlan, SchemaError> {
        self.schema
            .address_plans
            .iter()
            .find(|p| p.name == plan && p.address_type == address_type)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownAddressPlan {
                plan: plan.to_string(),
                address_type,
            })
    }

    fn resolve_address_space_plan(&self, plan: &str) -> Result<AddressSpacePlan, SchemaError> {
        self.schema
            .address_space_plans
            .iter()
            .find(|p| p.name == plan)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownAddressSpacePlan(plan.to_string()))
    }

    fn resource_definition(&self, name: &str) -> Result<ResourceDefinition, SchemaError> {
        self.schema
            .resource_definitions
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownResourceDefinition(name.to_string()))
    }
}

/// Resolves addresses against the catalog
#[derive(Clone)]
pub struct AddressResolver {
    provider: Arc<dyn SchemaProvider>,
}

impl AddressResolver {
    pub fn new(provider: Arc<dyn SchemaProvider>) -> Self {
        Self { provider }
    }

    /// Resolve the plan an address currently declares
    pub fn plan(&self, address: &Address) -> Result<AddressPlan, SchemaError> {
        self.provider
            .resolve_address_plan(address.spec.address_type, &address.spec.plan)
    }

    /// Plan an already-placed address is accounted with.
    ///
    /// Uses the admission snapshot when it matches the declared plan, so that
    /// catalog edits do not retroactively change committed usage.
    pub fn placed_plan(&self, address: &Address) -> Result<AddressPlan, SchemaError> {
        if let Some(snapshot) = &address.status.plan_status {
            if snapshot.name == address.spec.plan {
                let mut plan = AddressPlan::new(&snapshot.name, address.spec.address_type);
                plan.resources = snapshot.resources.clone();
                if let Ok(current) = self.plan(address) {
                    plan.partitions = current.partitions;
                    plan.resource_definition = current.resource_definition;
                }
                return Ok(plan);
            }
        }
        self.plan(address)
    }

    /// Resource definition of the plan an address was last admitted with
    pub fn admitted_definition(&self, address: &Address) -> Option<String> {
        let name = address
            .status
            .plan_status
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or(&address.spec.plan);
        self.provider
            .resolve_address_plan(address.spec.address_type, name)
            .ok()?
            .resource_definition
    }

    pub fn address_space_plan(&self, plan: &str) -> Result<AddressSpacePlan, SchemaError> {
        self.provider.resolve_address_space_plan(plan)
    }

    pub fn resource_definition(&self, name: &str) -> Result<ResourceDefinition, SchemaError> {
        self.provider.resource_definition(name)
    }
}
