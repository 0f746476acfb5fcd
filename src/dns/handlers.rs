use crate::config::Config;
use crate::dns::blocklist::{self, SharedBlocklist};
use crate::dns::customizations::{self, DomainCustomizations, TxtProducer};
use crate::error::Error;
use crate::kv_store::DynKvStore;
use crate::metrics::{bump, read, Metrics};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use time::format_description::FormatItem;
use time::macros::format_description;
use tracing::{error, info};
use trust_dns_proto::rr::rdata::SOA;
use trust_dns_server::authority::MessageResponseBuilder;
use trust_dns_server::client::op::{Header, MessageType, OpCode, ResponseCode};
use trust_dns_server::client::rr::rdata::TXT;
use trust_dns_server::client::rr::{DNSClass, LowerName, Name, RData, Record, RecordType};
use trust_dns_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

/// TTL for records derived from the name itself and for the fixed customizations: one week,
/// these don't change.
const STATIC_TTL: u32 = 604_800;
/// TTL for dynamic TXT answers: three minutes, so key-value updates propagate quickly.
const TXT_TTL: u32 = 180;

const SOA_SERIAL: u32 = 2_022_020_800;
const SINK_HOST: &str = "ns-aws.sslip.io.";
const ACME_CHALLENGE_LABEL: &str = "_acme-challenge.";
const KV_SUFFIX: &str = ".k-v.io.";

/// Replaced at build time via `XIPD_BUILD_DATE` / `XIPD_GIT_HASH`.
pub const VERSION_SEMANTIC: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_DATE: &str = match option_env!("XIPD_BUILD_DATE") {
    Some(date) => date,
    None => "0001/01/01-00:00:00-0000",
};
pub const VERSION_GIT_HASH: &str = match option_env!("XIPD_GIT_HASH") {
    Some(hash) => hash,
    None => "cafexxx",
};

lazy_static! {
    static ref SOA_MBOX: Name = Name::from_ascii("briancunnie.gmail.com.").unwrap();
    static ref BLOCKLIST_TIME_FORMAT: &'static [FormatItem<'static>] = format_description!(
        version = 2,
        "[year]-[month]-[day] [hour]:[minute]:[second][offset_hour sign:mandatory]"
    );
}

/// The server's question handler. One instance lives for the whole process and is shared by
/// every in-flight query task.
pub struct Handler {
    customizations: DomainCustomizations,
    kv_store: DynKvStore,
    blocklist: SharedBlocklist,
    metrics: Arc<Metrics>,
    nameservers: Vec<Name>,
    delegated_domains: HashMap<String, Vec<Name>>,
}

/// One assembled response: the record sections plus the header decisions that depend on
/// them. Handlers fill this in and it is serialized exactly once, so flags like
/// `authoritative` can be settled after the content is known.
#[derive(Debug)]
pub struct QueryAnswer {
    pub authoritative: bool,
    pub response_code: ResponseCode,
    pub answers: Vec<Record>,
    pub name_servers: Vec<Record>,
    pub soa: Vec<Record>,
    pub additionals: Vec<Record>,
}

impl QueryAnswer {
    fn new() -> Self {
        QueryAnswer {
            // always authoritative unless we end up delegating
            authoritative: true,
            response_code: ResponseCode::NoError,
            answers: Vec::new(),
            name_servers: Vec::new(),
            soa: Vec::new(),
            additionals: Vec::new(),
        }
    }
}

impl Handler {
    pub fn new(
        config: &Config,
        kv_store: DynKvStore,
        blocklist: SharedBlocklist,
        metrics: Arc<Metrics>,
    ) -> Self {
        let nameservers = config
            .nameservers
            .iter()
            .filter_map(|nameserver| fully_qualified(nameserver))
            .collect();
        Handler {
            customizations: customizations::default_customizations(),
            kv_store,
            blocklist,
            metrics,
            nameservers,
            delegated_domains: parse_delegates(&config.delegates),
        }
    }

    /// Answers a single question. This is the whole server: everything else is transport.
    pub async fn answer_question(
        &self,
        qname: &LowerName,
        qtype: RecordType,
        src_ip: IpAddr,
    ) -> Result<QueryAnswer, Error> {
        bump(&self.metrics.queries);
        let name = Name::from(qname);
        let fqdn = query_key(&name);
        let mut answer = QueryAnswer::new();

        let detail = if self.delegated_ns(&fqdn).is_some() {
            answer.authoritative = false;
            self.ns_response(&name, &fqdn, &mut answer).await
        } else if self.is_acme_challenge(&fqdn) && !self.blocklisted(&fqdn).await {
            // delegate to the stripped (sans "_acme-challenge.") name, e.g.
            // dig _acme-challenge.127-0-0-1.sslip.io mx → NS 127-0-0-1.sslip.io
            answer.authoritative = false;
            self.ns_response(&name, &fqdn, &mut answer).await
        } else {
            match qtype {
                RecordType::A => self.answer_a(&name, &fqdn, &mut answer).await,
                RecordType::AAAA => self.answer_aaaa(&name, &fqdn, &mut answer).await,
                // ANY is not implemented, matching Cloudflare (RFC 8482)
                RecordType::ANY => {
                    answer.response_code = ResponseCode::NotImp;
                    "NotImplemented".to_string()
                }
                RecordType::CNAME => self.answer_cname(&name, &fqdn, &mut answer),
                RecordType::MX => self.answer_mx(&name, &fqdn, &mut answer)?,
                RecordType::NS => self.ns_response(&name, &fqdn, &mut answer).await,
                RecordType::SOA => self.answer_soa(&name, &mut answer),
                RecordType::TXT => self.answer_txt(&name, &fqdn, src_ip, &mut answer).await?,
                // an unhandled type behaves like a name with no records: no answers, SOA
                // authority
                _ => {
                    answer.soa.push(soa_record(&name));
                    format!("nil, SOA {}", soa_log(&name))
                }
            }
        };
        info!(src = %src_ip, "{} {} ? {}", qtype, fqdn, detail);
        Ok(answer)
    }

    async fn answer_a(&self, name: &Name, fqdn: &str, answer: &mut QueryAnswer) -> String {
        let addrs = self.name_to_a(fqdn, true);
        if addrs.is_empty() {
            answer.soa.push(soa_record(name));
            return format!("nil, SOA {}", soa_log(name));
        }
        bump(&self.metrics.answered);
        if self.blocklisted(fqdn).await {
            bump(&self.metrics.answered_blocked);
            let sink = self.sink_a();
            answer
                .answers
                .push(Record::from_rdata(name.clone(), STATIC_TTL, RData::A(sink)));
            return sink.to_string();
        }
        bump(&self.metrics.answered_a);
        for addr in &addrs {
            answer
                .answers
                .push(Record::from_rdata(name.clone(), STATIC_TTL, RData::A(*addr)));
        }
        join_display(&addrs)
    }

    async fn answer_aaaa(&self, name: &Name, fqdn: &str, answer: &mut QueryAnswer) -> String {
        let addrs = self.name_to_aaaa(fqdn, true);
        if addrs.is_empty() {
            answer.soa.push(soa_record(name));
            return format!("nil, SOA {}", soa_log(name));
        }
        bump(&self.metrics.answered);
        if self.blocklisted(fqdn).await {
            bump(&self.metrics.answered_blocked);
            let sink = self.sink_aaaa();
            answer
                .answers
                .push(Record::from_rdata(name.clone(), STATIC_TTL, RData::AAAA(sink)));
            return sink.to_string();
        }
        bump(&self.metrics.answered_aaaa);
        for addr in &addrs {
            answer
                .answers
                .push(Record::from_rdata(name.clone(), STATIC_TTL, RData::AAAA(*addr)));
        }
        join_display(&addrs)
    }

    fn answer_cname(&self, name: &Name, fqdn: &str, answer: &mut QueryAnswer) -> String {
        // if there is a CNAME there is exactly one, and only via a customization
        match customizations::cname_resource(&self.customizations, fqdn) {
            None => {
                answer.soa.push(soa_record(name));
                format!("nil, SOA {}", soa_log(name))
            }
            Some(cname) => {
                bump(&self.metrics.answered);
                let detail = cname.to_string();
                answer
                    .answers
                    .push(Record::from_rdata(name.clone(), STATIC_TTL, RData::CNAME(cname)));
                detail
            }
        }
    }

    fn answer_mx(
        &self,
        name: &Name,
        fqdn: &str,
        answer: &mut QueryAnswer,
    ) -> Result<String, Error> {
        let exchangers = customizations::mx_resources(&self.customizations, fqdn, name);
        // mx_resources never returns an empty set, but we check anyway
        if exchangers.is_empty() {
            return Err(Error::NoMxRecords(fqdn.to_string()));
        }
        bump(&self.metrics.answered);
        let detail = exchangers
            .iter()
            .map(|mx| format!("{} {}", mx.preference(), mx.exchange()))
            .collect::<Vec<_>>()
            .join(", ");
        for mx in exchangers {
            answer
                .answers
                .push(Record::from_rdata(name.clone(), STATIC_TTL, RData::MX(mx)));
        }
        Ok(detail)
    }

    fn answer_soa(&self, name: &Name, answer: &mut QueryAnswer) -> String {
        bump(&self.metrics.answered);
        answer.answers.push(soa_record(name));
        soa_log(name)
    }

    async fn answer_txt(
        &self,
        name: &Name,
        fqdn: &str,
        src_ip: IpAddr,
        answer: &mut QueryAnswer,
    ) -> Result<String, Error> {
        // an "_acme-challenge." TXT only lands here when the name is blocklisted (anything
        // else was already delegated); reply with who is authoritative, not with answers
        if self.is_acme_challenge(fqdn) {
            answer.authoritative = false;
            let nameservers = self.ns_resources(fqdn).await;
            for nameserver in &nameservers {
                answer.name_servers.push(Record::from_rdata(
                    name.clone(),
                    STATIC_TTL,
                    RData::NS(nameserver.clone()),
                ));
            }
            return Ok(format!("nil, NS {}", join_display(&nameservers)));
        }
        let txts = self.txt_resources(fqdn, src_ip).await?;
        if txts.is_empty() {
            answer.soa.push(soa_record(name));
            return Ok(format!("nil, SOA {}", soa_log(name)));
        }
        bump(&self.metrics.answered);
        let detail = txts.iter().map(txt_log).collect::<Vec<_>>().join(", ");
        for txt in txts {
            answer
                .answers
                .push(Record::from_rdata(name.clone(), TXT_TTL, RData::TXT(txt)));
        }
        Ok(detail)
    }

    /// Fills in an NS response: answers when we're authoritative, authorities when we're
    /// delegating. Either way the additionals carry the nameservers' glue A/AAAA records.
    async fn ns_response(&self, name: &Name, fqdn: &str, answer: &mut QueryAnswer) -> String {
        let nameservers = self.ns_resources(fqdn).await;
        let records: Vec<Record> = nameservers
            .iter()
            .map(|nameserver| {
                Record::from_rdata(name.clone(), STATIC_TTL, RData::NS(nameserver.clone()))
            })
            .collect();
        let mut detail = String::new();
        if answer.authoritative {
            answer.answers.extend(records);
        } else {
            answer.name_servers.extend(records);
            // we're not supplying an answer; we're supplying who's authoritative
            detail.push_str("nil, NS ");
        }
        for nameserver in &nameservers {
            let nameserver_fqdn = query_key(nameserver);
            for addr in self.name_to_a(&nameserver_fqdn, true) {
                answer.additionals.push(Record::from_rdata(
                    nameserver.clone(),
                    STATIC_TTL,
                    RData::A(addr),
                ));
            }
            for addr in self.name_to_aaaa(&nameserver_fqdn, true) {
                answer.additionals.push(Record::from_rdata(
                    nameserver.clone(),
                    STATIC_TTL,
                    RData::AAAA(addr),
                ));
            }
        }
        detail + &join_display(&nameservers)
    }

    /// The NS names for `fqdn`: the default set, the delegated set, or (for an ACME
    /// challenge with an embedded IP) the challenge name sans `_acme-challenge.`.
    async fn ns_resources(&self, fqdn: &str) -> Vec<Name> {
        if self.blocklisted(fqdn).await {
            bump(&self.metrics.answered);
            bump(&self.metrics.answered_blocked);
            return self.nameservers.clone();
        }
        if let Some(delegated) = self.delegated_ns(fqdn) {
            return delegated.to_vec();
        }
        if self.is_acme_challenge(fqdn) {
            bump(&self.metrics.answered_dns01_ns);
            let stripped = fqdn.replace(ACME_CHALLENGE_LABEL, "");
            if let Ok(nameserver) = Name::from_ascii(&stripped) {
                return vec![nameserver];
            }
        }
        bump(&self.metrics.answered);
        self.nameservers.clone()
    }

    /// TXT resolution order: the `k-v.io` protocol, then a customization's resolver, then
    /// nothing.
    async fn txt_resources(&self, fqdn: &str, src_ip: IpAddr) -> Result<Vec<TXT>, Error> {
        if fqdn.ends_with(KV_SUFFIX) {
            return self.kv_txt_resources(fqdn).await;
        }
        match self
            .customizations
            .get(&fqdn.to_ascii_lowercase())
            .and_then(|domain| domain.txt.as_ref())
        {
            Some(producer) => Ok(self.produce_txt(producer, src_ip).await),
            None => Ok(Vec::new()),
        }
    }

    async fn produce_txt(&self, producer: &TxtProducer, src_ip: IpAddr) -> Vec<TXT> {
        match producer {
            TxtProducer::Fixed(values) => values
                .iter()
                .map(|value| TXT::new(vec![value.clone()]))
                .collect(),
            TxtProducer::SourceIp => {
                bump(&self.metrics.answered_src_ip_txt);
                vec![TXT::new(vec![src_ip.to_string()])]
            }
            TxtProducer::Version => {
                bump(&self.metrics.answered_version_txt);
                [VERSION_SEMANTIC, VERSION_DATE, VERSION_GIT_HASH]
                    .iter()
                    .map(|value| TXT::new(vec![(*value).to_string()]))
                    .collect()
            }
            TxtProducer::Metrics => {
                self.metrics.amplification_token().await;
                self.metrics_txt().await
            }
        }
    }

    async fn metrics_txt(&self) -> Vec<TXT> {
        let uptime = self.metrics.uptime().as_secs_f64();
        let mut lines = vec![
            format!("Uptime (seconds): {uptime:.0}"),
            format!("Key-value store: {}", self.kv_store.read().await.backend()),
        ];
        {
            let blocklist = self.blocklist.read().await;
            let updated = blocklist
                .updated
                .and_then(|at| at.format(&BLOCKLIST_TIME_FORMAT).ok())
                .unwrap_or_else(|| "never".to_string());
            lines.push(format!(
                "Blocklist: {updated} {},{}",
                blocklist.strings.len(),
                blocklist.cidrs.len()
            ));
        }
        let queries = read(&self.metrics.queries);
        let answered = read(&self.metrics.answered);
        lines.push(format!("Queries: {queries}"));
        lines.push(format!("Queries/second: {:.1}", queries as f64 / uptime));
        lines.push(format!("AnsQueries: {answered}"));
        lines.push(format!("AnsQueries/second: {:.1}", answered as f64 / uptime));
        lines.push(format!("AnsA: {}", read(&self.metrics.answered_a)));
        lines.push(format!("AnsAAAA: {}", read(&self.metrics.answered_aaaa)));
        lines.push(format!(
            "Source IP TXT: {}",
            read(&self.metrics.answered_src_ip_txt)
        ));
        lines.push(format!(
            "Version TXT: {}",
            read(&self.metrics.answered_version_txt)
        ));
        lines.push(format!(
            "DNS-01 challenge: {}",
            read(&self.metrics.answered_dns01_ns)
        ));
        lines.push(format!("Key-value errors: {}", read(&self.metrics.kv_errors)));
        lines.push(format!("Blocked: {}", read(&self.metrics.answered_blocked)));
        lines.into_iter().map(|line| TXT::new(vec![line])).collect()
    }

    /// The `k-v.io` TXT protocol: `[verb.[value.]]key.k-v.io`. The rightmost label under the
    /// apex is the key, the leftmost is the verb, anything between is the value re-joined
    /// with dots.
    async fn kv_txt_resources(&self, fqdn: &str) -> Result<Vec<TXT>, Error> {
        let mut labels: Vec<&str> = fqdn.split('.').collect();
        // drop "k-v", "io" and the empty root label
        labels.truncate(labels.len().saturating_sub(3));
        let key = match labels.last() {
            Some(key) => key.to_ascii_lowercase(),
            None => return Ok(Vec::new()),
        };
        let verb = if labels.len() >= 2 {
            labels[0].to_ascii_lowercase()
        } else {
            // only the key is present; default action
            "get".to_string()
        };
        let result = match verb.as_str() {
            "get" => self.kv_get(&key).await,
            "put" => {
                if labels.len() == 2 {
                    return Ok(vec![TXT::new(vec![
                        "422: missing a value: put.value.key.k-v.io".to_string(),
                    ])]);
                }
                // concatenate the middle labels to form the value; handy for version
                // numbers, e.g. "put.94.0.2.firefox-version.k-v.io"
                self.kv_put(&key, labels[1..labels.len() - 1].join(".")).await
            }
            "delete" => self.kv_delete(&key).await,
            _ => {
                return Ok(vec![TXT::new(vec![
                    "422: valid verbs are get, put, delete".to_string(),
                ])])
            }
        };
        result.map_err(|err| {
            bump(&self.metrics.kv_errors);
            err
        })
    }

    async fn kv_get(&self, key: &str) -> Result<Vec<TXT>, Error> {
        Ok(match self.kv_store.read().await.get(key).await? {
            Some(value) => vec![TXT::new(vec![value])],
            None => Vec::new(),
        })
    }

    async fn kv_put(&self, key: &str, mut value: String) -> Result<Vec<TXT>, Error> {
        // too-long TXT answers make good amplification payloads; truncate
        value.truncate(63);
        self.kv_store.write().await.put(key, &value).await?;
        Ok(vec![TXT::new(vec![value])])
    }

    async fn kv_delete(&self, key: &str) -> Result<Vec<TXT>, Error> {
        self.kv_store.write().await.delete(key).await?;
        Ok(Vec::new())
    }

    fn name_to_a(&self, fqdn: &str, allow_custom: bool) -> Vec<Ipv4Addr> {
        customizations::name_to_a(&self.customizations, fqdn, allow_custom)
    }

    fn name_to_aaaa(&self, fqdn: &str, allow_custom: bool) -> Vec<Ipv6Addr> {
        customizations::name_to_aaaa(&self.customizations, fqdn, allow_custom)
    }

    /// An ACME DNS-01 challenge we can delegate: the `_acme-challenge.` label plus an
    /// embedded IP to delegate to.
    fn is_acme_challenge(&self, fqdn: &str) -> bool {
        fqdn.to_ascii_lowercase().contains(ACME_CHALLENGE_LABEL)
            && (!self.name_to_a(fqdn, true).is_empty()
                || !self.name_to_aaaa(fqdn, true).is_empty())
    }

    fn delegated_ns(&self, fqdn: &str) -> Option<&[Name]> {
        self.delegated_domains.iter().find_map(|(apex, nameservers)| {
            if fqdn == apex || fqdn.ends_with(&format!(".{apex}")) {
                Some(nameservers.as_slice())
            } else {
                None
            }
        })
    }

    /// A hostname is blocked when its embedded address is public and either a blocked
    /// substring occurs in the name or the address falls in a blocked CIDR. Private
    /// addresses can't phish anyone and bypass the list entirely.
    async fn blocklisted(&self, fqdn: &str) -> bool {
        let mut ip = self
            .name_to_a(fqdn, false)
            .first()
            .map(|addr| IpAddr::V4(*addr));
        if let Some(addr) = self.name_to_aaaa(fqdn, false).first() {
            ip = Some(IpAddr::V6(*addr));
        }
        let ip = match ip {
            Some(ip) => ip,
            None => return false,
        };
        if !blocklist::is_public(ip) {
            return false;
        }
        self.blocklist.read().await.matches(fqdn, ip)
    }

    fn sink_a(&self) -> Ipv4Addr {
        self.customizations
            .get(SINK_HOST)
            .and_then(|domain| domain.a.first().copied())
            .expect("the sink customization is always present")
    }

    fn sink_aaaa(&self) -> Ipv6Addr {
        self.customizations
            .get(SINK_HOST)
            .and_then(|domain| domain.aaaa.first().copied())
            .expect("the sink customization is always present")
    }

    async fn dispatch_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response: R,
    ) -> Result<ResponseInfo, Error> {
        // If it isn't a query, return NOTIMPL.
        if request.op_code() != OpCode::Query || request.message_type() != MessageType::Query {
            return self.handle_notimpl(request, response).await;
        }
        // We only speak class INET; anything else gets an empty answer.
        if request.query().query_class() != DNSClass::IN {
            return self.handle_other_class(request, response).await;
        }
        let answer = self
            .answer_question(
                request.query().name(),
                request.query().query_type(),
                request.src().ip(),
            )
            .await?;
        self.send_answer(request, response, answer).await
    }

    async fn handle_notimpl<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> Result<ResponseInfo, Error> {
        let response = MessageResponseBuilder::from_message_request(request);
        Ok(response_handle
            .send_response(response.error_msg(request.header(), ResponseCode::NotImp))
            .await?)
    }

    async fn handle_other_class<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> Result<ResponseInfo, Error> {
        let header = Header::response_from_request(request.header());
        let builder = MessageResponseBuilder::from_message_request(request);
        Ok(response_handle
            .send_response(builder.build_no_records(header))
            .await?)
    }

    async fn send_answer<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
        answer: QueryAnswer,
    ) -> Result<ResponseInfo, Error> {
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(answer.authoritative);
        // we never recurse; advertising otherwise invites DDoS reflection
        header.set_recursion_available(false);
        header.set_response_code(answer.response_code);
        let builder = MessageResponseBuilder::from_message_request(request);
        let response = builder.build(
            header,
            answer.answers.iter(),
            answer.name_servers.iter(),
            answer.soa.iter(),
            answer.additionals.iter(),
        );
        Ok(response_handle.send_response(response).await?)
    }
}

#[async_trait::async_trait]
impl RequestHandler for Handler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        match self.dispatch_request(request, response_handle).await {
            Ok(info) => info,
            Err(error) => {
                error!("error in RequestHandler: {:?}", error);
                let mut header = Header::new();
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}

/// Lowercase, trailing-dot form of a name, the shape every lookup table is keyed by.
fn query_key(name: &Name) -> String {
    let mut key = name.to_ascii().to_ascii_lowercase();
    if !key.ends_with('.') {
        key.push('.');
    }
    key
}

fn fully_qualified(name: &str) -> Option<Name> {
    let mut fqdn = name.to_string();
    if !fqdn.ends_with('.') {
        fqdn.push('.');
    }
    match Name::from_ascii(&fqdn) {
        Ok(name) => Some(name),
        Err(err) => {
            error!(%name, %err, "skipping malformed nameserver");
            None
        }
    }
}

fn parse_delegates(delegates: &[String]) -> HashMap<String, Vec<Name>> {
    let mut delegated = HashMap::new();
    for entry in delegates {
        match entry.split_once('=') {
            None => error!(
                %entry,
                "delegation entries should take the form \"delegatedDomain=nameserver\""
            ),
            Some((apex, nameserver)) => {
                let mut apex = apex.to_ascii_lowercase();
                if !apex.ends_with('.') {
                    apex.push('.');
                }
                if let Some(nameserver) = fully_qualified(nameserver) {
                    info!("adding delegated NS record \"{apex}={nameserver}\"");
                    delegated
                        .entry(apex)
                        .or_insert_with(Vec::new)
                        .push(nameserver);
                }
            }
        }
    }
    delegated
}

/// The SOA for any name we're authoritative for: the queried name is the MNAME, everything
/// else is fixed. MinTTL is 180 rather than the classic 300 for faster key-value
/// propagation.
fn soa_record(name: &Name) -> Record {
    let soa = SOA::new(name.clone(), SOA_MBOX.clone(), SOA_SERIAL, 900, 900, 1800, 180);
    Record::from_rdata(name.clone(), STATIC_TTL, RData::SOA(soa))
}

fn soa_log(name: &Name) -> String {
    format!("{} {} {} 900 900 1800 180", name, *SOA_MBOX, SOA_SERIAL)
}

fn txt_log(txt: &TXT) -> String {
    let strings: Vec<String> = txt
        .txt_data()
        .iter()
        .map(|chars| format!("\"{}\"", String::from_utf8_lossy(chars)))
        .collect();
    format!("[{}]", strings.join(", "))
}

fn join_display<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::blocklist::Blocklist;
    use crate::kv_store::InMemoryKvStore;
    use std::time::Duration;
    use tokio::sync::RwLock;

    fn test_config(delegates: &[&str]) -> Config {
        Config {
            nameservers: vec![
                "ns-aws.sslip.io.".to_string(),
                "ns-azure.sslip.io.".to_string(),
                "ns-gce.sslip.io.".to_string(),
            ],
            delegates: delegates.iter().map(ToString::to_string).collect(),
            blocklist_url: String::new(),
            etcd_endpoint: None,
            dns_udp_bind_addr: "127.0.0.1:0".parse().unwrap(),
            dns_tcp_bind_addr: "127.0.0.1:0".parse().unwrap(),
            dns_tcp_timeout: Duration::from_secs(5),
        }
    }

    fn test_handler(config: &Config) -> Handler {
        Handler::new(
            config,
            Arc::new(RwLock::new(InMemoryKvStore::default())),
            Arc::new(RwLock::new(Blocklist::default())),
            Arc::new(Metrics::new()),
        )
    }

    async fn ask(handler: &Handler, name: &str, qtype: RecordType) -> QueryAnswer {
        ask_from(handler, name, qtype, "9.9.9.9".parse().unwrap()).await
    }

    async fn ask_from(
        handler: &Handler,
        name: &str,
        qtype: RecordType,
        src_ip: IpAddr,
    ) -> QueryAnswer {
        let qname = LowerName::from(Name::from_ascii(name).unwrap());
        handler.answer_question(&qname, qtype, src_ip).await.unwrap()
    }

    fn a_addrs(records: &[Record]) -> Vec<Ipv4Addr> {
        records
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::A(addr)) => Some(*addr),
                _ => None,
            })
            .collect()
    }

    fn aaaa_addrs(records: &[Record]) -> Vec<Ipv6Addr> {
        records
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::AAAA(addr)) => Some(*addr),
                _ => None,
            })
            .collect()
    }

    fn ns_names(records: &[Record]) -> Vec<Name> {
        records
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::NS(nameserver)) => Some(nameserver.clone()),
                _ => None,
            })
            .collect()
    }

    fn txt_strings(records: &[Record]) -> Vec<String> {
        records
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::TXT(txt)) => Some(
                    txt.txt_data()
                        .iter()
                        .map(|chars| String::from_utf8_lossy(chars).to_string())
                        .collect::<Vec<_>>()
                        .join(""),
                ),
                _ => None,
            })
            .collect()
    }

    fn name(fqdn: &str) -> Name {
        Name::from_ascii(fqdn).unwrap()
    }

    #[tokio::test]
    async fn a_answers_with_the_embedded_dashed_address() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, "127-0-0-1.sslip.io.", RecordType::A).await;
        assert!(answer.authoritative);
        assert_eq!(answer.response_code, ResponseCode::NoError);
        assert_eq!(a_addrs(&answer.answers), vec![Ipv4Addr::new(127, 0, 0, 1)]);
        assert_eq!(answer.answers[0].ttl(), 604_800);
        assert!(answer.soa.is_empty());
        assert_eq!(read(&handler.metrics.answered_a), 1);
    }

    #[tokio::test]
    async fn a_is_case_insensitive() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, "127-0-0-1.SSLIP.IO.", RecordType::A).await;
        assert_eq!(a_addrs(&answer.answers), vec![Ipv4Addr::new(127, 0, 0, 1)]);
    }

    #[tokio::test]
    async fn a_without_an_embedded_address_returns_soa_authority() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, "non-existent.sslip.io.", RecordType::A).await;
        assert!(answer.answers.is_empty());
        assert_eq!(answer.soa.len(), 1);
        match answer.soa[0].data() {
            Some(RData::SOA(soa)) => {
                assert_eq!(soa.mname(), &name("non-existent.sslip.io."));
                assert_eq!(soa.rname(), &name("briancunnie.gmail.com."));
                assert_eq!(soa.serial(), 2_022_020_800);
                assert_eq!(soa.minimum(), 180);
            }
            other => panic!("expected SOA, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn a_customization_preempts_synthesis() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, "ns.sslip.io.", RecordType::A).await;
        assert_eq!(
            a_addrs(&answer.answers),
            vec![
                Ipv4Addr::new(52, 0, 56, 137),
                Ipv4Addr::new(52, 187, 42, 158),
                Ipv4Addr::new(104, 155, 144, 4),
            ]
        );
    }

    #[tokio::test]
    async fn aaaa_answers_with_the_embedded_address() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, "2001-4860-4860--8888.sslip.io.", RecordType::AAAA).await;
        assert_eq!(
            aaaa_addrs(&answer.answers),
            vec!["2001:4860:4860::8888".parse::<Ipv6Addr>().unwrap()]
        );
        assert_eq!(read(&handler.metrics.answered_aaaa), 1);
    }

    #[tokio::test]
    async fn blocklisted_a_gets_the_sink_address() {
        let handler = test_handler(&test_config(&[]));
        *handler.blocklist.write().await = Blocklist::parse("raiffeisen");
        let answer = ask(&handler, "raiffeisen.94.228.116.18.sslip.io.", RecordType::A).await;
        assert_eq!(a_addrs(&answer.answers), vec![Ipv4Addr::new(52, 0, 56, 137)]);
        assert_eq!(read(&handler.metrics.answered_blocked), 1);
    }

    #[tokio::test]
    async fn blocklisted_cidr_gets_the_sink_address() {
        let handler = test_handler(&test_config(&[]));
        *handler.blocklist.write().await = Blocklist::parse("43.134.66.0/24");
        let answer = ask(&handler, "43-134-66-67.sslip.io.", RecordType::A).await;
        assert_eq!(a_addrs(&answer.answers), vec![Ipv4Addr::new(52, 0, 56, 137)]);
    }

    #[tokio::test]
    async fn blocklisted_aaaa_gets_the_sink_address() {
        let handler = test_handler(&test_config(&[]));
        *handler.blocklist.write().await = Blocklist::parse("raiffeisen");
        let answer = ask(&handler, "raiffeisen.2600--1.sslip.io.", RecordType::AAAA).await;
        assert_eq!(
            aaaa_addrs(&answer.answers),
            vec!["2600:1f18:aaf:6900::a".parse::<Ipv6Addr>().unwrap()]
        );
    }

    #[tokio::test]
    async fn private_addresses_bypass_the_blocklist() {
        let handler = test_handler(&test_config(&[]));
        *handler.blocklist.write().await = Blocklist::parse("raiffeisen");
        let answer = ask(&handler, "raiffeisen.10-9-9-30.sslip.io.", RecordType::A).await;
        assert_eq!(a_addrs(&answer.answers), vec![Ipv4Addr::new(10, 9, 9, 30)]);
        assert_eq!(read(&handler.metrics.answered_blocked), 0);
    }

    #[tokio::test]
    async fn any_is_not_implemented() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, "127-0-0-1.sslip.io.", RecordType::ANY).await;
        assert_eq!(answer.response_code, ResponseCode::NotImp);
        assert!(answer.answers.is_empty());
    }

    #[tokio::test]
    async fn unhandled_types_behave_like_missing_records() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, "127-0-0-1.sslip.io.", RecordType::HINFO).await;
        assert_eq!(answer.response_code, ResponseCode::NoError);
        assert!(answer.answers.is_empty());
        assert_eq!(answer.soa.len(), 1);
    }

    #[tokio::test]
    async fn cname_is_customization_only() {
        let handler = test_handler(&test_config(&[]));
        let missing = ask(&handler, "www.sslip.io.", RecordType::CNAME).await;
        assert!(missing.answers.is_empty());
        assert_eq!(missing.soa.len(), 1);

        let dkim = ask(&handler, "protonmail._domainkey.sslip.io.", RecordType::CNAME).await;
        assert_eq!(dkim.answers.len(), 1);
        match dkim.answers[0].data() {
            Some(RData::CNAME(target)) => assert!(target
                .to_ascii()
                .to_ascii_lowercase()
                .contains("domains.proton.ch")),
            other => panic!("expected CNAME, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mx_customization_and_default() {
        let handler = test_handler(&test_config(&[]));
        let custom = ask(&handler, "sslip.io.", RecordType::MX).await;
        let mx: Vec<(u16, Name)> = custom
            .answers
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::MX(mx)) => Some((mx.preference(), mx.exchange().clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            mx,
            vec![
                (10, name("mail.protonmail.ch.")),
                (20, name("mailsec.protonmail.ch.")),
            ]
        );

        let fallback = ask(&handler, "127-0-0-1.sslip.io.", RecordType::MX).await;
        match fallback.answers[0].data() {
            Some(RData::MX(mx)) => {
                assert_eq!(mx.preference(), 0);
                assert_eq!(mx.exchange(), &name("127-0-0-1.sslip.io."));
            }
            other => panic!("expected MX, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn soa_answers_with_the_queried_name_as_mname() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, "www.example.com.", RecordType::SOA).await;
        assert_eq!(answer.answers.len(), 1);
        match answer.answers[0].data() {
            Some(RData::SOA(soa)) => {
                assert_eq!(soa.mname(), &name("www.example.com."));
                assert_eq!(soa.refresh(), 900);
                assert_eq!(soa.retry(), 900);
                assert_eq!(soa.expire(), 1800);
                assert_eq!(soa.minimum(), 180);
            }
            other => panic!("expected SOA, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ns_answers_with_the_default_nameservers_and_glue() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, "foo.sslip.io.", RecordType::NS).await;
        assert!(answer.authoritative);
        assert_eq!(
            ns_names(&answer.answers),
            vec![
                name("ns-aws.sslip.io."),
                name("ns-azure.sslip.io."),
                name("ns-gce.sslip.io."),
            ]
        );
        // glue: ns-aws has A + AAAA, ns-azure and ns-gce have one A each
        assert_eq!(answer.additionals.len(), 4);
        assert!(a_addrs(&answer.additionals).contains(&Ipv4Addr::new(52, 0, 56, 137)));
        assert_eq!(aaaa_addrs(&answer.additionals).len(), 1);
    }

    #[tokio::test]
    async fn acme_challenge_ns_is_a_delegating_referral() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(
            &handler,
            "_acme-challenge.10-9-9-30.sslip.io.",
            RecordType::NS,
        )
        .await;
        assert!(!answer.authoritative);
        assert!(answer.answers.is_empty());
        assert_eq!(ns_names(&answer.name_servers), vec![name("10-9-9-30.sslip.io.")]);
        // glue for the stripped name comes from its embedded address
        assert_eq!(a_addrs(&answer.additionals), vec![Ipv4Addr::new(10, 9, 9, 30)]);
        assert_eq!(read(&handler.metrics.answered_dns01_ns), 1);
    }

    #[tokio::test]
    async fn acme_challenge_delegates_every_type() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(
            &handler,
            "_acme-challenge.127-0-0-1.sslip.io.",
            RecordType::A,
        )
        .await;
        assert!(!answer.authoritative);
        assert!(answer.answers.is_empty());
        assert_eq!(
            ns_names(&answer.name_servers),
            vec![name("127-0-0-1.sslip.io.")]
        );
    }

    #[tokio::test]
    async fn acme_challenge_with_random_capitalization_still_delegates() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(
            &handler,
            "_AcMe-ChAlLeNgE.127-0-0-1.sslip.io.",
            RecordType::NS,
        )
        .await;
        assert!(!answer.authoritative);
        assert_eq!(
            ns_names(&answer.name_servers),
            vec![name("127-0-0-1.sslip.io.")]
        );
    }

    #[tokio::test]
    async fn acme_challenge_without_an_embedded_ip_is_not_special() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, "_acme-challenge.sslip.io.", RecordType::NS).await;
        assert!(answer.authoritative);
        assert_eq!(ns_names(&answer.answers).len(), 3);
    }

    #[tokio::test]
    async fn blocklisted_acme_challenge_txt_names_the_site_nameservers() {
        let handler = test_handler(&test_config(&[]));
        *handler.blocklist.write().await = Blocklist::parse("raiffeisen");
        let answer = ask(
            &handler,
            "_acme-challenge.raiffeisen.52-0-56-137.sslip.io.",
            RecordType::TXT,
        )
        .await;
        assert!(!answer.authoritative);
        assert!(answer.answers.is_empty());
        assert_eq!(ns_names(&answer.name_servers).len(), 3);
        assert!(answer.additionals.is_empty());
        assert_eq!(read(&handler.metrics.answered_blocked), 1);
    }

    #[tokio::test]
    async fn txt_ip_echoes_the_source_address() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask_from(
            &handler,
            "ip.sslip.io.",
            RecordType::TXT,
            "1.1.1.1".parse().unwrap(),
        )
        .await;
        assert_eq!(txt_strings(&answer.answers), vec!["1.1.1.1"]);
        assert_eq!(answer.answers[0].ttl(), 180);
        assert_eq!(read(&handler.metrics.answered_src_ip_txt), 1);
    }

    #[tokio::test]
    async fn txt_apex_returns_the_mail_records() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, "sslip.io.", RecordType::TXT).await;
        let txts = txt_strings(&answer.answers);
        assert_eq!(txts.len(), 2);
        assert!(txts[0].starts_with("protonmail-verification="));
        assert!(txts[1].starts_with("v=spf1"));
    }

    #[tokio::test]
    async fn txt_version_reports_the_build() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, "version.status.sslip.io.", RecordType::TXT).await;
        let txts = txt_strings(&answer.answers);
        assert_eq!(txts.len(), 3);
        assert_eq!(txts[0], env!("CARGO_PKG_VERSION"));
        assert_eq!(read(&handler.metrics.answered_version_txt), 1);
    }

    #[tokio::test]
    async fn txt_metrics_reports_counters_and_store_kind() {
        let handler = test_handler(&test_config(&[]));
        ask(&handler, "127-0-0-1.sslip.io.", RecordType::A).await;
        let answer = ask(&handler, "metrics.status.sslip.io.", RecordType::TXT).await;
        let txts = txt_strings(&answer.answers);
        assert!(txts.iter().any(|line| line == "Key-value store: builtin"));
        assert!(txts.iter().any(|line| line == "Queries: 2"));
        assert!(txts.iter().any(|line| line == "AnsA: 1"));
        assert!(txts.iter().any(|line| line.starts_with("Blocklist: ")));
    }

    #[tokio::test]
    async fn txt_for_an_uncustomized_name_returns_soa_authority() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, "random.example.com.", RecordType::TXT).await;
        assert!(answer.answers.is_empty());
        assert_eq!(answer.soa.len(), 1);
    }

    #[tokio::test]
    async fn kv_put_get_delete_round_trip() {
        let handler = test_handler(&test_config(&[]));
        let put = ask(&handler, "put.myvalue.mykey.k-v.io.", RecordType::TXT).await;
        assert_eq!(txt_strings(&put.answers), vec!["myvalue"]);
        assert_eq!(put.answers[0].ttl(), 180);

        let got = ask(&handler, "mykey.k-v.io.", RecordType::TXT).await;
        assert_eq!(txt_strings(&got.answers), vec!["myvalue"]);

        let deleted = ask(&handler, "delete.mykey.k-v.io.", RecordType::TXT).await;
        assert!(deleted.answers.is_empty());
        assert_eq!(deleted.soa.len(), 1);

        let gone = ask(&handler, "mykey.k-v.io.", RecordType::TXT).await;
        assert!(gone.answers.is_empty());
        assert_eq!(gone.soa.len(), 1);
    }

    #[tokio::test]
    async fn kv_value_labels_are_rejoined_with_dots() {
        let handler = test_handler(&test_config(&[]));
        let put = ask(
            &handler,
            "put.94.0.2.firefox-version.k-v.io.",
            RecordType::TXT,
        )
        .await;
        assert_eq!(txt_strings(&put.answers), vec!["94.0.2"]);
        let got = ask(&handler, "firefox-version.k-v.io.", RecordType::TXT).await;
        assert_eq!(txt_strings(&got.answers), vec!["94.0.2"]);
    }

    #[tokio::test]
    async fn kv_get_verb_is_the_default_and_also_explicit() {
        let handler = test_handler(&test_config(&[]));
        ask(&handler, "put.hello.greeting.k-v.io.", RecordType::TXT).await;
        let explicit = ask(&handler, "get.greeting.k-v.io.", RecordType::TXT).await;
        assert_eq!(txt_strings(&explicit.answers), vec!["hello"]);
    }

    #[tokio::test]
    async fn kv_put_without_a_value_is_an_unprocessable_entity() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, "put.mykey.k-v.io.", RecordType::TXT).await;
        assert_eq!(
            txt_strings(&answer.answers),
            vec!["422: missing a value: put.value.key.k-v.io"]
        );
    }

    #[tokio::test]
    async fn kv_unknown_verb_is_an_unprocessable_entity() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, "propfind.mykey.k-v.io.", RecordType::TXT).await;
        assert_eq!(
            txt_strings(&answer.answers),
            vec!["422: valid verbs are get, put, delete"]
        );
    }

    #[tokio::test]
    async fn kv_put_truncates_the_value_to_63_bytes() {
        let handler = test_handler(&test_config(&[]));
        let sixty_a = "a".repeat(60);
        let put_name = format!("put.{sixty_a}.bbbbbbbbbb.trunc.k-v.io.");
        let full_value = format!("{sixty_a}.bbbbbbbbbb");
        let expected = &full_value[..63];

        let put = ask(&handler, &put_name, RecordType::TXT).await;
        assert_eq!(txt_strings(&put.answers), vec![expected]);

        let got = ask(&handler, "trunc.k-v.io.", RecordType::TXT).await;
        assert_eq!(txt_strings(&got.answers), vec![expected]);
    }

    #[tokio::test]
    async fn delegated_domains_are_referred_for_every_type() {
        let handler = test_handler(&test_config(&[
            "example-delegated.com=ns-ext.example.com",
        ]));
        let answer = ask(&handler, "foo.example-delegated.com.", RecordType::A).await;
        assert!(!answer.authoritative);
        assert!(answer.answers.is_empty());
        assert_eq!(
            ns_names(&answer.name_servers),
            vec![name("ns-ext.example.com.")]
        );

        let apex = ask(&handler, "example-delegated.com.", RecordType::TXT).await;
        assert!(!apex.authoritative);
        assert_eq!(ns_names(&apex.name_servers), vec![name("ns-ext.example.com.")]);
    }

    #[tokio::test]
    async fn delegation_entries_get_trailing_dots_appended() {
        let handler = test_handler(&test_config(&["a=b"]));
        let nameservers = handler.ns_resources("a.").await;
        assert_eq!(nameservers, vec![name("b.")]);
    }

    #[tokio::test]
    async fn delegation_entries_without_an_equals_sign_are_skipped() {
        let handler = test_handler(&test_config(&["noEquals"]));
        assert!(handler.delegated_domains.is_empty());
    }

    #[tokio::test]
    async fn a_similarly_named_domain_is_not_delegated() {
        let handler = test_handler(&test_config(&["a.com=b.com"]));
        assert!(handler.delegated_ns("aa.com.").is_none());
        assert!(handler.delegated_ns("a.com.").is_some());
        assert!(handler.delegated_ns("b.a.com.").is_some());
    }

    #[tokio::test]
    async fn overridden_nameservers_are_returned_in_order() {
        let mut config = test_config(&[]);
        config.nameservers = vec![
            "mickey".to_string(),
            "minn.ie.".to_string(),
            "goo.fy".to_string(),
        ];
        let handler = test_handler(&config);
        let nameservers = handler.ns_resources("random.example.com.").await;
        assert_eq!(
            nameservers,
            vec![name("mickey."), name("minn.ie."), name("goo.fy.")]
        );
    }

    #[tokio::test]
    async fn the_root_name_answers_with_soa_authority() {
        let handler = test_handler(&test_config(&[]));
        let answer = ask(&handler, ".", RecordType::A).await;
        assert!(answer.answers.is_empty());
        assert_eq!(answer.soa.len(), 1);
    }
}
