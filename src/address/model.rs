//! Address resource - a logical messaging endpoint within a tenant
//!
//! An Address is analogous to a Kubernetes custom resource. It carries:
//! - User supplied spec (address string, type, plan, topic, forwarders)
//! - Controller owned status (phase, messages, broker associations)
//! - Metadata used for two-phase deletion (finalizers, deletion timestamp)

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Finalizer the controller places on every live address
pub const FINALIZER: &str = "addrctl.io/address-controller";

/// Annotation holding the plan that was last applied to an address
pub const ANNOTATION_APPLIED_PLAN: &str = "addrctl.io/applied-plan";

/// A messaging address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    /// API version (e.g., "addrctl/v1")
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,

    /// Kind is always "Address"
    #[serde(default = "default_kind")]
    pub kind: String,

    pub metadata: AddressMetadata,

    pub spec: AddressSpec,

    #[serde(default)]
    pub status: AddressStatus,
}

fn default_api_version() -> String {
    "addrctl/v1".to_string()
}

fn default_kind() -> String {
    "Address".to_string()
}

/// Metadata for an Address
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AddressMetadata {
    /// Resource name, unique within the tenant
    pub name: String,

    /// Tenant (address space) this address belongs to
    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub finalizers: Vec<String>,

    /// Set when the user has requested deletion
    #[serde(rename = "deletionTimestamp")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

/// Desired state supplied by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressSpec {
    /// User facing address string (not necessarily unique)
    pub address: String,

    #[serde(rename = "type")]
    pub address_type: AddressType,

    pub plan: String,

    /// Parent topic address, required for subscriptions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forwarders: Vec<Forwarder>,
}

/// The closed set of address types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Anycast,
    Multicast,
    Queue,
    Topic,
    Subscription,
}

/// Where an address type lives in the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementPolicy {
    /// Routed directly, no broker footprint
    RouterOnly,
    /// Hosted on a pooled or sharded broker, chosen by the plan's broker cost
    Brokered,
    /// Hosted on the broker cluster(s) of a parent topic
    ColocatedWithParent,
}

impl AddressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressType::Anycast => "anycast",
            AddressType::Multicast => "multicast",
            AddressType::Queue => "queue",
            AddressType::Topic => "topic",
            AddressType::Subscription => "subscription",
        }
    }

    pub fn placement(&self) -> PlacementPolicy {
        match self {
            AddressType::Anycast | AddressType::Multicast => PlacementPolicy::RouterOnly,
            AddressType::Queue | AddressType::Topic => PlacementPolicy::Brokered,
            AddressType::Subscription => PlacementPolicy::ColocatedWithParent,
        }
    }

    /// Whether addresses of this type may declare forwarders
    pub fn supports_forwarders(&self) -> bool {
        matches!(self, AddressType::Queue | AddressType::Subscription)
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A link forwarding messages to or from a remote address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forwarder {
    pub name: String,

    #[serde(rename = "remoteAddress")]
    pub remote_address: String,

    #[serde(default)]
    pub direction: ForwarderDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwarderDirection {
    #[default]
    Out,
    In,
}

/// Lifecycle phase of an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Pending,
    Configuring,
    Active,
    Failed,
    Terminating,
}

impl Phase {
    /// Rank used when several addresses claim the same address string
    pub fn precedence(&self) -> u8 {
        match self {
            Phase::Active => 3,
            Phase::Configuring => 2,
            Phase::Pending => 1,
            Phase::Failed | Phase::Terminating => 0,
        }
    }

    /// Whether the address currently holds capacity
    pub fn is_placed(&self) -> bool {
        matches!(self, Phase::Active | Phase::Configuring)
    }
}

/// State of one address-to-broker association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BrokerState {
    #[default]
    Active,
    /// Old cluster retained while a new one takes over
    Migrating,
    /// Marked for removal once safe
    Draining,
}

/// An association between an address and a broker cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerStatus {
    #[serde(rename = "clusterId")]
    pub cluster_id: String,

    #[serde(rename = "containerId")]
    pub container_id: String,

    #[serde(default)]
    pub state: BrokerState,
}

impl BrokerStatus {
    pub fn active(cluster_id: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            container_id: container_id.into(),
            state: BrokerState::Active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwarderStatus {
    pub name: String,

    pub ready: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

/// Snapshot of the plan an address was admitted with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStatus {
    pub name: String,

    #[serde(default = "default_partitions")]
    pub partitions: u32,

    #[serde(default)]
    pub resources: BTreeMap<String, f64>,
}

fn default_partitions() -> u32 {
    1
}

/// Observed state, owned by the controller
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AddressStatus {
    #[serde(default)]
    pub phase: Phase,

    #[serde(default)]
    pub ready: bool,

    #[serde(default)]
    pub messages: Vec<String>,

    #[serde(rename = "brokerStatuses", default)]
    pub broker_statuses: Vec<BrokerStatus>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forwarders: Vec<ForwarderStatus>,

    #[serde(rename = "planStatus")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_status: Option<PlanStatus>,
}

impl AddressStatus {
    pub fn append_message(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.messages.contains(&message) {
            self.messages.push(message);
        }
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    /// Cluster ids of the associations in the given state, sorted
    pub fn clusters_in_state(&self, state: BrokerState) -> Vec<String> {
        let mut ids: Vec<String> = self
            .broker_statuses
            .iter()
            .filter(|b| b.state == state)
            .map(|b| b.cluster_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Whether any association is still migrating or draining
    pub fn has_transitions(&self) -> bool {
        self.broker_statuses
            .iter()
            .any(|b| b.state != BrokerState::Active)
    }
}

impl Address {
    /// Create a new address with an empty status
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        address_type: AddressType,
        plan: impl Into<String>,
    ) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: AddressMetadata {
                name: name.into(),
                ..Default::default()
            },
            spec: AddressSpec {
                address: address.into(),
                address_type,
                plan: plan.into(),
                topic: None,
                forwarders: Vec::new(),
            },
            status: AddressStatus::default(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.metadata.namespace = namespace.into();
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.spec.topic = Some(topic.into());
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.status.phase = phase;
        self
    }

    pub fn with_broker(mut self, status: BrokerStatus) -> Self {
        self.status.broker_statuses.push(status);
        self
    }

    pub fn with_forwarder(mut self, forwarder: Forwarder) -> Self {
        self.spec.forwarders.push(forwarder);
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn is_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn applied_plan(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get(ANNOTATION_APPLIED_PLAN)
            .map(String::as_str)
    }

    pub fn set_applied_plan(&mut self, plan: &str) {
        self.metadata
            .annotations
            .insert(ANNOTATION_APPLIED_PLAN.to_string(), plan.to_string());
    }

    pub fn has_finalizer(&self) -> bool {
        self.metadata.finalizers.iter().any(|f| f == FINALIZER)
    }

    pub fn add_finalizer(&mut self) {
        if !self.has_finalizer() {
            self.metadata.finalizers.push(FINALIZER.to_string());
        }
    }

    pub fn remove_finalizer(&mut self) {
        self.metadata.finalizers.retain(|f| f != FINALIZER);
    }
}
