//! Platform events emitted as structured log records

use std::fmt;

use tracing::{info, warn};

/// Why an event was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerReason {
    BrokerCreated,
    BrokerCreateFailed,
    BrokerUpdated,
    BrokerReplaced,
    BrokerDeleted,
    BrokerDeleteFailed,
    RouterScaled,
    RouterScaleFailed,
    AddressSyncFailed,
}

/// What kind of object an event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    Address,
    Broker,
    Router,
}

impl ControllerReason {
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            ControllerReason::BrokerCreateFailed
                | ControllerReason::BrokerDeleteFailed
                | ControllerReason::RouterScaleFailed
                | ControllerReason::AddressSyncFailed
        )
    }
}

impl fmt::Display for ControllerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Emit an event for `object`
pub fn log_event(reason: ControllerReason, kind: ControllerKind, object: &str, message: &str) {
    if reason.is_warning() {
        warn!(reason = %reason, kind = %kind, object, "{}", message);
    } else {
        info!(reason = %reason, kind = %kind, object, "{}", message);
    }
}
