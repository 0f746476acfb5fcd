//! The blocklist of phishing hostnames.
//!
//! The blocklist is a line-based text file of substrings (e.g. `raiffeisen`) and CIDRs
//! (e.g. `43.134.66.67/24`) downloaded at startup and re-downloaded every hour, so updates
//! don't require a server restart. Hostnames that embed a **public** address and either
//! contain a blocked substring or resolve into a blocked CIDR get the sink address instead
//! of their embedded one; hostnames that embed private addresses are never blocked, since
//! they can't be used to phish anyone on the open internet.

use crate::error::Error;
use ipnetwork::IpNetwork;
use lazy_static::lazy_static;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub type SharedBlocklist = Arc<RwLock<Blocklist>>;

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

lazy_static! {
    // Everything that isn't routable on the public internet: RFC 1918, CG-NAT, link-local,
    // loopback, RFC 4193 ULA, ORCHIDv2, documentation, and the IPv4/IPv6 translation
    // private range.
    static ref PRIVATE_NETWORKS: Vec<IpNetwork> = [
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "100.64.0.0/10",
        "169.254.0.0/16",
        "127.0.0.0/8",
        "fe80::/10",
        "::1/128",
        "fc00::/7",
        "2001:20::/28",
        "2001:db8::/32",
        "64:ff9b:1::/48",
    ]
    .iter()
    .map(|network| IpNetwork::from_str(network).unwrap())
    .collect();
}

/// Returns whether `ip` is routable on the public internet.
pub fn is_public(ip: IpAddr) -> bool {
    !PRIVATE_NETWORKS.iter().any(|network| network.contains(ip))
}

/// One parsed blocklist snapshot. The refresher replaces the shared snapshot wholesale;
/// in-flight queries keep reading whichever snapshot they started with.
#[derive(Debug, Default, Clone)]
pub struct Blocklist {
    pub strings: Vec<String>,
    pub cidrs: Vec<IpNetwork>,
    pub updated: Option<OffsetDateTime>,
}

impl Blocklist {
    /// Sanitizes and parses blocklist text: `#` comments are stripped, entries are
    /// lowercased, characters that can't appear in a DNS name (or a CIDR) are dropped, and
    /// lines left empty are skipped. A line containing a `/` that parses as a CIDR becomes a
    /// network entry; everything else becomes a substring entry.
    pub fn parse(text: &str) -> Self {
        let mut strings = Vec::new();
        let mut cidrs = Vec::new();
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").to_ascii_lowercase();
            let candidate: String = line
                .chars()
                .filter(|c| matches!(c, 'a'..='z' | '0'..='9' | '-' | '_' | '/' | '.' | ':'))
                .collect();
            let network = if candidate.contains('/') {
                IpNetwork::from_str(&candidate).ok()
            } else {
                None
            };
            match network {
                Some(network) => cidrs.push(network),
                None => {
                    let substring: String = candidate
                        .chars()
                        .filter(|c| matches!(c, 'a'..='z' | '0'..='9' | '-' | '_'))
                        .collect();
                    if !substring.is_empty() {
                        strings.push(substring);
                    }
                }
            }
        }
        Blocklist {
            strings,
            cidrs,
            updated: Some(OffsetDateTime::now_utc()),
        }
    }

    /// Returns whether a hostname that resolved to `ip` is blocked. The caller has already
    /// established that `ip` is public.
    pub fn matches(&self, fqdn: &str, ip: IpAddr) -> bool {
        self.strings.iter().any(|blocked| fqdn.contains(blocked.as_str()))
            || self.cidrs.iter().any(|cidr| cidr.contains(ip))
    }
}

/// Downloads the blocklist now and then once an hour, replacing the shared snapshot on
/// success. Failures keep the previous snapshot in effect.
pub async fn refresh_periodically(url: String, blocklist: SharedBlocklist) {
    loop {
        match fetch(&url).await {
            Ok(fresh) => {
                info!(
                    %url,
                    strings = fresh.strings.len(),
                    cidrs = fresh.cidrs.len(),
                    "downloaded blocklist"
                );
                *blocklist.write().await = fresh;
            }
            Err(err) => warn!(%url, %err, "couldn't refresh blocklist, keeping the previous one"),
        }
        tokio::time::sleep(REFRESH_INTERVAL).await;
    }
}

async fn fetch(url: &str) -> Result<Blocklist, Error> {
    let response = reqwest::get(url).await?.error_for_status()?;
    Ok(Blocklist::parse(&response.text().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn parse_strips_comments() {
        let blocklist = Blocklist::parse("# a comment\n#another comment\nno-comments\n");
        assert_eq!(blocklist.strings, vec!["no-comments"]);
        assert!(blocklist.cidrs.is_empty());
    }

    #[test]
    fn parse_strips_blank_lines() {
        let blocklist = Blocklist::parse("\n\n\nno-blank-lines");
        assert_eq!(blocklist.strings, vec!["no-blank-lines"]);
        assert!(blocklist.cidrs.is_empty());
    }

    #[test]
    fn parse_lowercases_names() {
        let blocklist = Blocklist::parse("NO-YELLING");
        assert_eq!(blocklist.strings, vec!["no-yelling"]);
    }

    #[test]
    fn parse_removes_non_dns_characters() {
        let blocklist = Blocklist::parse(
            "\nalpha #comment # comment\nåß∂ # comment # comment\ndelta∆\n ... GAMMA∑µ®† ...#asdfasdf#asdfasdf",
        );
        assert_eq!(blocklist.strings, vec!["alpha", "delta", "gamma"]);
        assert!(blocklist.cidrs.is_empty());
    }

    #[test]
    fn parse_reads_ipv4_cidrs() {
        let blocklist = Blocklist::parse("\n43.134.66.67/24 #asdfasdf");
        assert!(blocklist.strings.is_empty());
        assert_eq!(blocklist.cidrs.len(), 1);
        assert!(blocklist.cidrs[0].contains(IpAddr::V4(Ipv4Addr::new(43, 134, 66, 1))));
        assert!(!blocklist.cidrs[0].contains(IpAddr::V4(Ipv4Addr::new(43, 134, 67, 1))));
    }

    #[test]
    fn parse_reads_ipv6_cidrs() {
        let blocklist = Blocklist::parse("\n 2600::/64 #asdfasdf");
        assert!(blocklist.strings.is_empty());
        assert_eq!(blocklist.cidrs.len(), 1);
        assert!(blocklist.cidrs[0].contains("2600::1".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn matches_substrings_and_cidrs() {
        let blocklist = Blocklist::parse("raiffeisen\n43.134.66.0/24");
        let unrelated: IpAddr = "93.184.216.34".parse().unwrap();
        assert!(blocklist.matches("www.raiffeisen.94.228.116.18.sslip.io.", unrelated));
        assert!(blocklist.matches("anything.sslip.io.", "43.134.66.67".parse().unwrap()));
        assert!(!blocklist.matches("harmless.sslip.io.", unrelated));
    }

    #[test]
    fn public_and_private_ranges() {
        let cases: &[(&str, bool)] = &[
            ("8.8.8.8", true),
            ("2001:4860:4860::8888", true),
            ("2601:646:100:69f0:7d:9069:ea74:e3a", true),
            ("2001:558:6045:109:892f:2df3:15e3:3184", true),
            ("10.9.9.30", false),
            ("172.31.255.255", false),
            ("192.168.0.1", false),
            ("fdff::", false),
            ("100.127.255.255", false),
            ("100.128.0.0", true),
            ("169.254.169.254", false),
            ("169.255.255.255", true),
            ("fe80::", false),
            ("127.127.127.127", false),
            ("::1", false),
            ("64:ff9b::", true),
            ("64:ff9b:1::", false),
            ("2001::", true),
            ("2001:20::", false),
            ("2001:db8::", false),
            ("fc00::", false),
        ];
        for (ip, expected) in cases {
            let ip: IpAddr = ip.parse().unwrap();
            assert_eq!(is_public(ip), *expected, "{ip}");
        }
    }

    #[test]
    fn loopback_v6_alone_is_private() {
        assert!(!is_public(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_public(IpAddr::V6("::2".parse().unwrap())));
    }
}
