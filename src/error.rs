//! Error types.

use trust_dns_server::proto::error::ProtoError;

/// Error enumerates the possible xipd error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when processing JSON from disk (e.g. trying to
    /// [load a `Config`][crate::config::Config::try_from_file]) fails due to invalid JSON content.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),

    /// Returned when the xipd DNS server encounters a generic DNS protocol error.
    #[error("DNS error")]
    DNSError(#[from] ProtoError),

    /// Returned when the external key-value store backing `k-v.io` rejects or drops a request.
    /// Surfaced to DNS clients as SERVFAIL.
    #[error("key-value store error")]
    KvStore(#[from] etcd_client::Error),

    /// Returned when the external key-value store misses the per-request deadline
    /// ([`REQUEST_TIMEOUT`][crate::kv_store::etcd::REQUEST_TIMEOUT]). Surfaced to DNS clients
    /// as SERVFAIL.
    #[error("key-value store timed out")]
    KvTimeout,

    /// Returned when the blocklist can't be downloaded. The previous blocklist snapshot stays
    /// in effect.
    #[error("blocklist fetch failed")]
    BlocklistFetch(#[from] reqwest::Error),

    /// A customized domain carried an MX field with no records in it. Customized MX sets are
    /// always non-empty; an empty set here is a programming error.
    #[error("no MX records for \"{0}\", but there should be at least one")]
    NoMxRecords(String),
}
