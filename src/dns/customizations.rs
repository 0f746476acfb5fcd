//! Specially-crafted records for a handful of domains.
//!
//! Most queries are answered from the IP address embedded in the name; the domains here get
//! fixed answers instead (e.g. MX records for the apex, A records for the nameservers
//! themselves) or a dynamic TXT resolver. Keys are always lowercase and carry the trailing
//! dot; lookups lowercase the queried name before comparing.

use crate::dns::name;
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use trust_dns_proto::rr::rdata::MX;
use trust_dns_server::client::rr::Name;

/// How a customized domain answers TXT queries. A closed set of resolvers rather than a
/// closure per domain, so the handler can drive the async ones (metrics needs a throttle
/// token) without boxing futures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxtProducer {
    /// A fixed set of TXT strings, one record per string.
    Fixed(Vec<String>),
    /// Echoes the IP address the query came from.
    SourceIp,
    /// Reports the server's semantic version, build date, and git hash.
    Version,
    /// Reports the cumulative query counters. Rate-limited.
    Metrics,
}

/// Fixed records returned for one domain. Empty fields fall back to name-derived synthesis
/// (A/AAAA) or the type's default answer.
#[derive(Debug, Clone, Default)]
pub struct DomainCustomization {
    pub a: Vec<Ipv4Addr>,
    pub aaaa: Vec<Ipv6Addr>,
    pub cname: Option<Name>,
    pub mx: Vec<MX>,
    pub txt: Option<TxtProducer>,
}

pub type DomainCustomizations = HashMap<String, DomainCustomization>;

fn record_name(fqdn: &str) -> Name {
    Name::from_ascii(fqdn).expect("well-formed record name")
}

/// The built-in customization table for the sslip.io zone.
pub fn default_customizations() -> DomainCustomizations {
    let mut customizations = DomainCustomizations::new();
    customizations.insert(
        "sslip.io.".to_string(),
        DomainCustomization {
            a: vec![Ipv4Addr::new(78, 46, 204, 247)],
            aaaa: vec!["2a01:4f8:c17:b8f::2".parse().expect("well-formed address")],
            mx: vec![
                MX::new(10, record_name("mail.protonmail.ch.")),
                MX::new(20, record_name("mailsec.protonmail.ch.")),
            ],
            // Multiple single-string TXT records rather than one multi-string record;
            // that's what ProtonMail requires.
            txt: Some(TxtProducer::Fixed(vec![
                "protonmail-verification=ce0ca3f5010aa7a2cf8bcc693778338ffde73e26".to_string(),
                "v=spf1 include:_spf.protonmail.ch mx ~all".to_string(),
            ])),
            ..DomainCustomization::default()
        },
    );
    // a conglomeration of ns-{aws,azure,gce}.sslip.io
    customizations.insert(
        "ns.sslip.io.".to_string(),
        DomainCustomization {
            a: vec![
                Ipv4Addr::new(52, 0, 56, 137),
                Ipv4Addr::new(52, 187, 42, 158),
                Ipv4Addr::new(104, 155, 144, 4),
            ],
            aaaa: vec!["2600:1f18:aaf:6900::a".parse().expect("well-formed address")],
            ..DomainCustomization::default()
        },
    );
    // nameserver addresses; we get queries for those every once in a while
    customizations.insert(
        "ns-aws.sslip.io.".to_string(),
        DomainCustomization {
            a: vec![Ipv4Addr::new(52, 0, 56, 137)],
            aaaa: vec!["2600:1f18:aaf:6900::a".parse().expect("well-formed address")],
            ..DomainCustomization::default()
        },
    );
    customizations.insert(
        "ns-azure.sslip.io.".to_string(),
        DomainCustomization {
            a: vec![Ipv4Addr::new(52, 187, 42, 158)],
            ..DomainCustomization::default()
        },
    );
    customizations.insert(
        "ns-gce.sslip.io.".to_string(),
        DomainCustomization {
            a: vec![Ipv4Addr::new(104, 155, 144, 4)],
            ..DomainCustomization::default()
        },
    );
    // CNAMEs for DKIM signing
    for (dkim, target) in [
        (
            "protonmail._domainkey.sslip.io.",
            "protonmail.domainkey.dw4gykv5i2brtkjglrf34wf6kbxpa5hgtmg2xqopinhgxn5axo73a.domains.proton.ch.",
        ),
        (
            "protonmail2._domainkey.sslip.io.",
            "protonmail2.domainkey.dw4gykv5i2brtkjglrf34wf6kbxpa5hgtmg2xqopinhgxn5axo73a.domains.proton.ch.",
        ),
        (
            "protonmail3._domainkey.sslip.io.",
            "protonmail3.domainkey.dw4gykv5i2brtkjglrf34wf6kbxpa5hgtmg2xqopinhgxn5axo73a.domains.proton.ch.",
        ),
    ] {
        customizations.insert(
            dkim.to_string(),
            DomainCustomization {
                cname: Some(record_name(target)),
                ..DomainCustomization::default()
            },
        );
    }
    // Special-purpose TXT resolvers
    customizations.insert(
        "ip.sslip.io.".to_string(),
        DomainCustomization {
            txt: Some(TxtProducer::SourceIp),
            ..DomainCustomization::default()
        },
    );
    customizations.insert(
        "version.status.sslip.io.".to_string(),
        DomainCustomization {
            txt: Some(TxtProducer::Version),
            ..DomainCustomization::default()
        },
    );
    customizations.insert(
        "metrics.status.sslip.io.".to_string(),
        DomainCustomization {
            txt: Some(TxtProducer::Metrics),
            ..DomainCustomization::default()
        },
    );
    customizations
}

/// Returns the A records for `fqdn`: the customized set when `allow_custom` finds one,
/// otherwise zero-or-one records synthesized from the embedded IPv4 literal.
pub fn name_to_a(
    customizations: &DomainCustomizations,
    fqdn: &str,
    allow_custom: bool,
) -> Vec<Ipv4Addr> {
    if allow_custom {
        if let Some(domain) = customizations.get(&fqdn.to_ascii_lowercase()) {
            if !domain.a.is_empty() {
                return domain.a.clone();
            }
        }
    }
    name::embedded_ipv4(fqdn).into_iter().collect()
}

/// Returns the AAAA records for `fqdn`; see [`name_to_a`].
pub fn name_to_aaaa(
    customizations: &DomainCustomizations,
    fqdn: &str,
    allow_custom: bool,
) -> Vec<Ipv6Addr> {
    if allow_custom {
        if let Some(domain) = customizations.get(&fqdn.to_ascii_lowercase()) {
            if !domain.aaaa.is_empty() {
                return domain.aaaa.clone();
            }
        }
    }
    name::embedded_ipv6(fqdn).into_iter().collect()
}

/// Returns the customized CNAME for `fqdn`, if there is one. There is never more than one.
pub fn cname_resource(customizations: &DomainCustomizations, fqdn: &str) -> Option<Name> {
    customizations
        .get(&fqdn.to_ascii_lowercase())
        .and_then(|domain| domain.cname.clone())
}

/// Returns the customized MX set for `fqdn`, or a single pref-0 MX pointing at the queried
/// name itself.
pub fn mx_resources(
    customizations: &DomainCustomizations,
    fqdn: &str,
    qname: &Name,
) -> Vec<MX> {
    if let Some(domain) = customizations.get(&fqdn.to_ascii_lowercase()) {
        if !domain.mx.is_empty() {
            return domain.mx.clone();
        }
    }
    vec![MX::new(0, qname.clone())]
}
