//! Resolution of addresses that share one user-facing address string

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::address::Address;

/// Total order deciding who keeps an address string: higher phase
/// precedence first, then ascending resource name
pub fn collision_order(a: &Address, b: &Address) -> Ordering {
    b.status
        .phase
        .precedence()
        .cmp(&a.status.phase.precedence())
        .then_with(|| a.name().cmp(b.name()))
}

/// Losers of every collision group, mapped to the winning resource name
pub fn resolve_collisions(addresses: &[Address]) -> BTreeMap<String, String> {
    let mut groups: BTreeMap<&str, Vec<&Address>> = BTreeMap::new();
    for address in addresses {
        groups
            .entry(address.spec.address.as_str())
            .or_default()
            .push(address);
    }

    let mut losers = BTreeMap::new();
    for group in groups.values_mut() {
        if group.len() < 2 {
            continue;
        }
        group.sort_by(|a, b| collision_order(a, b));
        let winner = group[0].name();
        for loser in &group[1..] {
            losers.insert(loser.name().to_string(), winner.to_string());
        }
    }
    losers
}

pub fn collision_message(address: &str, winner: &str) -> String {
    format!(
        "Address '{}' already exists with resource name '{}'",
        address, winner
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{AddressType, Phase};

    fn queue(name: &str, address: &str) -> Address {
        Address::new(name, address, AddressType::Queue, "small-queue")
    }

    #[test]
    fn test_name_breaks_ties() {
        let addresses = vec![queue("myspace.a2", "a"), queue("myspace.a1", "a")];
        let losers = resolve_collisions(&addresses);
        assert_eq!(losers.len(), 1);
        assert_eq!(losers["myspace.a2"], "myspace.a1");
    }

    #[test]
    fn test_active_outranks_name() {
        let addresses = vec![
            queue("a1", "a"),
            queue("a2", "a").with_phase(Phase::Configuring),
            queue("a3", "a").with_phase(Phase::Active),
        ];
        let losers = resolve_collisions(&addresses);
        assert_eq!(losers["a1"], "a3");
        assert_eq!(losers["a2"], "a3");
        assert!(!losers.contains_key("a3"));
    }

    #[test]
    fn test_order_independent() {
        let mut addresses = vec![queue("b", "x"), queue("c", "x"), queue("a", "x")];
        let first = resolve_collisions(&addresses);
        addresses.reverse();
        assert_eq!(first, resolve_collisions(&addresses));
    }

    #[test]
    fn test_distinct_strings_do_not_collide() {
        let addresses = vec![queue("a1", "a"), queue("b1", "b")];
        assert!(resolve_collisions(&addresses).is_empty());
    }

    #[test]
    fn test_message() {
        assert_eq!(
            collision_message("a", "myspace.a1"),
            "Address 'a' already exists with resource name 'myspace.a1'"
        );
    }
}
