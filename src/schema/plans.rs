//! Plan catalog types: what an address costs and what a tenant may spend

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::AddressType;

/// Resource name for router credit, accounted tenant-wide
pub const RESOURCE_ROUTER: &str = "router";

/// Resource name for broker credit, accounted per broker cluster
pub const RESOURCE_BROKER: &str = "broker";

/// Pseudo-resource bounding the sum of all consumption
pub const RESOURCE_AGGREGATE: &str = "aggregate";

/// Tolerance for floating point accumulation in all resource comparisons
pub const EPSILON: f64 = 1e-6;

/// The tenant's ceiling for one named resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAllowance {
    pub name: String,
    pub max: f64,
}

impl ResourceAllowance {
    pub fn new(name: impl Into<String>, max: f64) -> Self {
        Self {
            name: name.into(),
            max,
        }
    }
}

/// The cost one address of a plan consumes in one named resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub name: String,
    pub credit: f64,
}

/// An address plan: a named bundle of resource costs for one address type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressPlan {
    pub name: String,

    #[serde(rename = "addressType")]
    pub address_type: AddressType,

    /// Resource name -> cost
    #[serde(default)]
    pub resources: BTreeMap<String, f64>,

    /// Number of dedicated brokers for sharded plans
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<u32>,

    /// Resource definition used to generate broker clusters
    #[serde(rename = "resourceDefinition")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_definition: Option<String>,
}

impl AddressPlan {
    pub fn new(name: impl Into<String>, address_type: AddressType) -> Self {
        Self {
            name: name.into(),
            address_type,
            resources: BTreeMap::new(),
            partitions: None,
            resource_definition: None,
        }
    }

    pub fn with_resource(mut self, name: impl Into<String>, cost: f64) -> Self {
        self.resources.insert(name.into(), cost);
        self
    }

    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = Some(partitions);
        self
    }

    pub fn with_resource_definition(mut self, definition: impl Into<String>) -> Self {
        self.resource_definition = Some(definition.into());
        self
    }

    /// Requested resources in name order
    pub fn required_resources(&self) -> Vec<ResourceRequest> {
        self.resources
            .iter()
            .map(|(name, credit)| ResourceRequest {
                name: name.clone(),
                credit: *credit,
            })
            .collect()
    }

    pub fn cost(&self, resource: &str) -> f64 {
        self.resources.get(resource).copied().unwrap_or(0.0)
    }

    pub fn needs_router(&self) -> bool {
        self.resources.contains_key(RESOURCE_ROUTER)
    }

    pub fn needs_broker(&self) -> bool {
        self.resources.contains_key(RESOURCE_BROKER)
    }

    /// Whether broker credit is shared with other addresses on one broker
    pub fn is_pooled(&self, broker_capacity: f64) -> bool {
        self.partitions.is_none() && self.cost(RESOURCE_BROKER) < broker_capacity - EPSILON
    }

    /// Number of dedicated brokers a sharded plan occupies
    pub fn partitions(&self, broker_capacity: f64) -> u32 {
        match self.partitions {
            Some(p) if p > 0 => p,
            _ if self.is_pooled(broker_capacity) => 1,
            _ => {
                let units = (self.cost(RESOURCE_BROKER) / broker_capacity - EPSILON).ceil();
                units.max(1.0) as u32
            }
        }
    }
}

/// An address-space plan: allowances plus the address plans a tenant may use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressSpacePlan {
    pub name: String,

    #[serde(default)]
    pub resources: Vec<ResourceAllowance>,

    #[serde(rename = "addressPlans", default)]
    pub address_plans: Vec<String>,
}

impl AddressSpacePlan {
    /// Resource name -> max allowance
    pub fn limits(&self) -> BTreeMap<String, f64> {
        self.resources
            .iter()
            .map(|a| (a.name.clone(), a.max))
            .collect()
    }

    pub fn permits(&self, plan: &str) -> bool {
        self.address_plans.iter().any(|p| p == plan)
    }
}

/// Template and parameters a cluster generator turns into a resource set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub name: String,

    #[serde(default = "default_template")]
    pub template: String,

    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

fn default_template() -> String {
    "queue-persisted".to_string()
}

impl ResourceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: default_template(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}
