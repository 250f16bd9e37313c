//! Address resources and their validation rules

pub mod api;
pub mod model;
pub mod validation;

pub use api::AddressApi;
pub use model::{
    Address, AddressMetadata, AddressSpec, AddressStatus, AddressType, BrokerState,
    BrokerStatus, Forwarder, ForwarderDirection, ForwarderStatus, Phase, PlacementPolicy,
    PlanStatus, ANNOTATION_APPLIED_PLAN, FINALIZER,
};
pub use validation::{find_topic, validate_address};
