//! Cluster id generation
//!
//! Pooled and replacement clusters get ids from an injected generator so
//! tests can predict them. Sharded clusters derive their ids from the
//! address they are dedicated to: `<name>-<digest>-<shard>`, where the
//! digest is taken over the raw resource name. Names that clean up to the
//! same label still get distinct ids, and the trailing `-<shard>` after a
//! hex digest keeps them apart from `<prefix>-<n>` generator ids.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Longest cluster id accepted by the platform (DNS-1123 label)
const MAX_ID_LEN: usize = 63;

/// Hex characters of the name digest in a shard id
const SHARD_DIGEST_LEN: usize = 8;

/// Room left for `-<digest>-<shard>`
const SHARD_SUFFIX_LEN: usize = SHARD_DIGEST_LEN + 8;

pub trait ClusterIdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Monotonic ids: `broker-1`, `broker-2`, ...
#[derive(Debug)]
pub struct CounterIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl CounterIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Continue counting after `start`
    pub fn starting_after(prefix: impl Into<String>, start: u64) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(start),
        }
    }
}

impl Default for CounterIdGenerator {
    fn default() -> Self {
        Self::new("broker")
    }
}

impl ClusterIdGenerator for CounterIdGenerator {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{}", self.prefix, n)
    }
}

/// Random ids: `broker-1b4e28ba`
#[derive(Debug, Clone)]
pub struct UuidIdGenerator {
    prefix: String,
}

impl UuidIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl ClusterIdGenerator for UuidIdGenerator {
    fn next_id(&self) -> String {
        let uuid = Uuid::new_v4().simple().to_string();
        format!("{}-{}", self.prefix, &uuid[..8])
    }
}

fn invalid_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9-]+").unwrap())
}

/// Reduce a resource name to DNS-1123 label characters
pub fn sanitize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let replaced = invalid_chars().replace_all(&lowered, "-");
    let trimmed = replaced.trim_matches('-');
    let mut out: String = trimmed.chars().take(MAX_ID_LEN - SHARD_SUFFIX_LEN).collect();
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("address");
    }
    out
}

/// Short stable digest of a raw resource name
fn name_digest(name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash[..SHARD_DIGEST_LEN].to_string()
}

/// Cluster ids of the shards of a sharded address
pub fn shard_cluster_ids(address_name: &str, partitions: u32) -> Vec<String> {
    let base = sanitize_name(address_name);
    let digest = name_digest(address_name);
    (0..partitions)
        .map(|i| format!("{}-{}-{}", base, digest, i))
        .collect()
}
