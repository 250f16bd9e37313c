//! Per-address validation against the plan catalog and sibling addresses
//!
//! SBIO pattern: pure functions, the caller applies the outcome to status.

use crate::schema::{AddressPlan, AddressResolver, AddressSpacePlan};

use super::model::{Address, AddressType};

/// Validate one address.
///
/// `siblings` is the tenant's full set of live addresses and is used to
/// resolve subscription topics. Returns the resolved plan, or the message
/// explaining why the address cannot be provisioned.
pub fn validate_address(
    address: &Address,
    siblings: &[Address],
    resolver: &AddressResolver,
    space_plan: &AddressSpacePlan,
) -> Result<AddressPlan, String> {
    let plan = resolver.plan(address).map_err(|e| e.to_string())?;

    if !space_plan.permits(&plan.name) {
        return Err(format!(
            "Address plan '{}' is not permitted by address space plan '{}'",
            plan.name, space_plan.name
        ));
    }

    if !address.spec.forwarders.is_empty() && !address.spec.address_type.supports_forwarders() {
        return Err(format!(
            "Address '{}' of type '{}' does not support forwarders",
            address.spec.address, address.spec.address_type
        ));
    }

    if address.spec.address_type == AddressType::Subscription {
        validate_subscription(address, siblings)?;
    }

    Ok(plan)
}

fn validate_subscription(address: &Address, siblings: &[Address]) -> Result<(), String> {
    let topic = address.spec.topic.as_deref().ok_or_else(|| {
        format!(
            "Subscription address '{}' (resource name '{}') must reference a topic address.",
            address.spec.address,
            address.name()
        )
    })?;

    let parent = find_topic(topic, siblings).ok_or_else(|| {
        format!(
            "Subscription address '{}' (resource name '{}') references a topic address '{}' that does not exist.",
            address.spec.address,
            address.name(),
            topic
        )
    })?;

    if parent.spec.address_type != AddressType::Topic {
        return Err(format!(
            "Subscription address '{}' (resource name '{}') references a topic address '{}' (resource name '{}') that is not of expected type 'topic' (found type '{}' instead).",
            address.spec.address,
            address.name(),
            topic,
            parent.name(),
            parent.spec.address_type
        ));
    }

    Ok(())
}

/// Find the live address a subscription's topic reference resolves to.
///
/// When several addresses share the string, the one that would win a
/// collision is chosen.
pub fn find_topic<'a>(topic: &str, siblings: &'a [Address]) -> Option<&'a Address> {
    siblings
        .iter()
        .filter(|a| !a.is_deleted() && a.spec.address == topic)
        .min_by(|a, b| {
            b.status
                .phase
                .precedence()
                .cmp(&a.status.phase.precedence())
                .then_with(|| a.name().cmp(b.name()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Forwarder, ForwarderDirection, Phase};
    use crate::schema::fixtures;

    fn space_plan() -> AddressSpacePlan {
        fixtures::resolver().address_space_plan("small").unwrap()
    }

    #[test]
    fn test_valid_queue() {
        let q = Address::new("q1", "q1", AddressType::Queue, "small-queue");
        let plan = validate_address(&q, &[q.clone()], &fixtures::resolver(), &space_plan());
        assert_eq!(plan.unwrap().name, "small-queue");
    }

    #[test]
    fn test_unknown_plan() {
        let q = Address::new("q1", "q1", AddressType::Queue, "nope");
        let err = validate_address(&q, &[], &fixtures::resolver(), &space_plan()).unwrap_err();
        assert_eq!(err, "Unknown address plan 'nope' for address type 'queue'");
    }

    #[test]
    fn test_plan_not_permitted() {
        let resolver = fixtures::resolver();
        let plan = resolver.address_space_plan("unlimited").unwrap();
        let q = Address::new("q1", "q1", AddressType::Queue, "mega-xlarge-queue");
        let err = validate_address(&q, &[], &resolver, &plan).unwrap_err();
        assert!(err.contains("not permitted by address space plan 'unlimited'"));
    }

    #[test]
    fn test_subscription_unknown_topic() {
        let sub = Address::new("s1", "s1", AddressType::Subscription, "small-subscription")
            .with_topic("unknown");
        let err =
            validate_address(&sub, &[sub.clone()], &fixtures::resolver(), &space_plan())
                .unwrap_err();
        assert!(err.ends_with("references a topic address 'unknown' that does not exist."));
    }

    #[test]
    fn test_subscription_wrong_topic_type() {
        let anycast = Address::new("a1", "a1", AddressType::Anycast, "small-anycast");
        let sub = Address::new("s1", "s1", AddressType::Subscription, "small-subscription")
            .with_topic("a1");
        let err = validate_address(
            &sub,
            &[anycast, sub.clone()],
            &fixtures::resolver(),
            &space_plan(),
        )
        .unwrap_err();
        assert!(err.contains("found type 'anycast' instead"));
        assert!(err.contains("expected type 'topic'"));
    }

    #[test]
    fn test_subscription_requires_topic() {
        let sub = Address::new("s1", "s1", AddressType::Subscription, "small-subscription");
        let err =
            validate_address(&sub, &[], &fixtures::resolver(), &space_plan()).unwrap_err();
        assert!(err.contains("must reference a topic address"));
    }

    #[test]
    fn test_forwarders_on_anycast_rejected() {
        let a = Address::new("a1", "a1", AddressType::Anycast, "small-anycast").with_forwarder(
            Forwarder {
                name: "fwd".into(),
                remote_address: "remote/a1".into(),
                direction: ForwarderDirection::Out,
            },
        );
        let err = validate_address(&a, &[], &fixtures::resolver(), &space_plan()).unwrap_err();
        assert!(err.contains("does not support forwarders"));
    }

    #[test]
    fn test_find_topic_prefers_active() {
        let pending = Address::new("a-topic", "t", AddressType::Anycast, "small-anycast");
        let active =
            Address::new("b-topic", "t", AddressType::Topic, "small-topic").with_phase(Phase::Active);
        let siblings = [pending, active];
        assert_eq!(find_topic("t", &siblings).unwrap().name(), "b-topic");
    }
}
