use crate::error::Error;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub type SharedConfig = Arc<Config>;

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// NS names returned for queries this server answers authoritatively. Missing trailing
    /// dots are appended when the handler is built.
    #[serde(default = "default_nameservers")]
    pub nameservers: Vec<String>,
    /// Zones delegated to external nameservers, one `apex=nameserver` entry each. Entries
    /// without an `=` are logged and skipped.
    #[serde(default)]
    pub delegates: Vec<String>,
    /// Where the blocklist of phishing substrings and CIDRs is (re-)downloaded from.
    #[serde(default = "default_blocklist_url")]
    pub blocklist_url: String,
    /// Endpoint of the etcd cluster backing `k-v.io`. When absent (or unreachable at startup)
    /// keys live in process memory instead.
    #[serde(default)]
    pub etcd_endpoint: Option<String>,
    pub dns_udp_bind_addr: SocketAddr,
    pub dns_tcp_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub dns_tcp_timeout: Duration,
}

fn default_nameservers() -> Vec<String> {
    ["ns-aws.sslip.io.", "ns-azure.sslip.io.", "ns-gce.sslip.io."]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_blocklist_url() -> String {
    "https://raw.githubusercontent.com/cunnie/sslip.io/main/etc/blocklist.txt".to_string()
}

impl Config {
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        Ok(conf)
    }
}
