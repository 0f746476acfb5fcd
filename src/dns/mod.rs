//! The name-derived DNS server.
//!
//! # Name-derived A/AAAA records
//!
//! Any queried hostname with an embedded IP literal answers with that literal:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 +short 192-168-1-100.sslip.io A
//! 192.168.1.100
//! ❯ dig @127.0.0.1 -p 5353 +short 2001-4860-4860--8888.sslip.io AAAA
//! 2001:4860:4860::8888
//! ```
//!
//! Dots and dashes both work as octet separators for IPv4; IPv6 groups are dash-separated
//! with `--` standing in for `::`. See [`name`] for the grammar.
//!
//! # Customized records
//!
//! A small fixed [table][customizations] overrides name-derived synthesis for the zone
//! apex and its infrastructure: MX and TXT for mail, A/AAAA for the nameservers, DKIM
//! CNAMEs, and the special TXT resolvers `ip.sslip.io` (echoes the querier's address),
//! `version.status.sslip.io`, and `metrics.status.sslip.io` (rate-limited).
//!
//! # ACME DNS-01 delegation
//!
//! A query for `_acme-challenge.<name-with-embedded-IP>` is answered with a
//! non-authoritative referral to the stripped name, so the host that owns the address can
//! solve its own certificate challenge:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 _acme-challenge.192-168-1-100.sslip.io NS
//! ;; AUTHORITY SECTION:
//! _acme-challenge.192-168-1-100.sslip.io. 604800 IN NS 192-168-1-100.sslip.io.
//! ```
//!
//! # Key-value TXT records
//!
//! Names under `k-v.io` drive a tiny storage protocol entirely over TXT queries:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 +short put.my-value.my-key.k-v.io TXT
//! "my-value"
//! ❯ dig @127.0.0.1 -p 5353 +short my-key.k-v.io TXT
//! "my-value"
//! ❯ dig @127.0.0.1 -p 5353 +short delete.my-key.k-v.io TXT
//! ```
//!
//! Values are truncated to 63 bytes to keep the answers useless for amplification. Keys
//! live in etcd when an endpoint is configured, in process memory otherwise.
//!
//! # The blocklist
//!
//! Hostnames embedding a public address that match a [blocklist][blocklist] substring or
//! CIDR answer with the sink address instead, so phishing domains stop resolving without a
//! server restart.

pub mod blocklist;
pub mod customizations;
mod handlers;
pub mod name;
pub mod server;

pub use handlers::{Handler, QueryAnswer, VERSION_DATE, VERSION_GIT_HASH, VERSION_SEMANTIC};
