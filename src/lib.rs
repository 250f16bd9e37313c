//! addrctl: admission, placement and garbage collection of messaging
//! addresses across pooled and sharded broker clusters.

pub mod address;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod events;
pub mod provisioner;
pub mod schema;
