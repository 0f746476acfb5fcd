//! xipd
//!
//! An authoritative DNS server that answers with the IP address embedded in the queried
//! hostname: `192-168-1-100.sslip.io` resolves to `192.168.1.100`, no registration
//! required. Handy for bringing up TLS on lab machines, NATed boxes, and anything else
//! without a name of its own.
//!
//! On top of the name-derived substrate it serves a fixed set of
//! [customizations][dns::customizations], delegates
//! [ACME DNS-01][dns#acme-dns-01-delegation] challenge names to the hosts they refer to,
//! runs a [key-value TXT protocol][kv_store] under `k-v.io`, and rewrites
//! [blocklisted][dns::blocklist] phishing names to a sink address.
//!
#![warn(clippy::pedantic)]

pub mod config;
pub mod dns;
pub mod error;
pub mod kv_store;
pub mod metrics;

pub use config::{Config, SharedConfig};
pub use dns::Handler;
pub use error::Error;
pub use kv_store::{EtcdKvStore, InMemoryKvStore};
pub use metrics::Metrics;
