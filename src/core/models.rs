// src/core/models.rs

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use url::{Host, Url};

use crate::error::ReconError;

// --- Inbound Events ---

/// A single domain, host or URL under investigation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub value: String,
}

impl Target {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }

    /// Parses the target as a URL (adding a scheme when missing) and returns its host.
    fn parsed_host(&self) -> Option<Host<String>> {
        let raw = self.value.trim();
        if raw.is_empty() {
            return None;
        }
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        };
        Url::parse(&with_scheme).ok()?.host().map(|h| h.to_owned())
    }

    /// The lowercase domain name of the target, or `None` for IP literals and unparsable values.
    pub fn domain(&self) -> Option<String> {
        match self.parsed_host()? {
            Host::Domain(domain) => {
                let domain = domain.trim_end_matches('.').to_lowercase();
                // `Url` accepts bare dotted quads as domains for non-special schemes.
                if domain.is_empty() || domain.parse::<IpAddr>().is_ok() {
                    None
                } else {
                    Some(domain)
                }
            }
            Host::Ipv4(_) | Host::Ipv6(_) => None,
        }
    }
}

/// Payload of the scan-started subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStartedEvent {
    pub scan_id: String,
    pub targets: Vec<Target>,
}

impl ScanStartedEvent {
    /// Targets that resolve to a domain name. IP literals and garbage are dropped.
    pub fn domain_targets(&self) -> Vec<Target> {
        self.targets
            .iter()
            .filter(|t| t.domain().is_some())
            .cloned()
            .collect()
    }
}

/// Payload of the scan-cancelled subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanCancelledEvent {
    pub scan_id: String,
}

// --- Techniques & Per-Target Results ---

/// The three reconnaissance techniques run for every scan.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TechniqueName {
    Whois,
    DnsLookup,
    Harvester,
}

/// Technique-specific payload stored against a target. Opaque to the dispatcher.
///
/// The payload structs deny unknown fields so an untagged payload reads back as the
/// variant it was written from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TechniquePayload {
    Whois(Box<WhoisInfo>),
    Dns(DnsLookupResult),
    Harvester(HarvesterResult),
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetResult {
    pub target: Target,
    pub results: HashMap<TechniqueName, TechniquePayload>,
}

impl TargetResult {
    pub fn new(target: Target, technique: TechniqueName, payload: TechniquePayload) -> Self {
        Self {
            target,
            results: HashMap::from([(technique, payload)]),
        }
    }
}

/// What an engine hands back: whatever it managed to produce plus an aggregate error.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub results: Vec<TargetResult>,
    pub error: Option<ReconError>,
}

/// One technique's output for one scan, as handed from a handler to the dispatcher.
#[derive(Debug)]
pub struct ServiceResult {
    pub scan_id: String,
    pub technique: TechniqueName,
    pub results: Vec<TargetResult>,
    pub error: Option<ReconError>,
}

// --- DNS Lookup Models ---

/// The fixed set of record types queried for every target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[allow(clippy::upper_case_acronyms)]
pub enum DnsRecordType {
    A,
    AAAA,
    CNAME,
    TXT,
    NS,
    MX,
    SOA,
    DNSKEY,
}

/// Type-specific record payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    MailExchange {
        host: String,
        priority: u16,
    },
    StartOfAuthority {
        primary_ns: String,
        admin_email: String,
        serial: u32,
        refresh: i32,
        retry: i32,
        expire: i32,
        minimum_ttl: u32,
    },
    DnsKey {
        flags: u16,
        protocol: u8,
        algorithm: u8,
    },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    #[serde(rename = "type")]
    pub record_type: DnsRecordType,
    pub name: String,
    /// Seconds, as reported by the resolver.
    pub ttl: u32,
    pub value: RecordValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DnsLookupResult {
    pub domain: String,
    pub dns_records: Vec<DnsRecord>,
    pub dnssec_enabled: bool,
    pub lookup_duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl DnsLookupResult {
    /// Assembles a result; `dnssec_enabled` is always derived from the records.
    pub fn new(domain: String, dns_records: Vec<DnsRecord>, lookup_duration_ms: u64) -> Self {
        let dnssec_enabled = has_dnskey_record(&dns_records);
        Self {
            domain,
            dns_records,
            dnssec_enabled,
            lookup_duration_ms,
            created_at: Utc::now(),
        }
    }
}

pub fn has_dnskey_record(records: &[DnsRecord]) -> bool {
    records
        .iter()
        .any(|r| r.record_type == DnsRecordType::DNSKEY)
}

// --- WHOIS Models ---

/// Structured view of a WHOIS response. Missing fields stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhoisInfo {
    pub domain: Option<WhoisDomain>,
    pub registrar: Option<WhoisContact>,
    pub registrant: Option<WhoisContact>,
    pub administrative: Option<WhoisContact>,
    pub technical: Option<WhoisContact>,
    pub billing: Option<WhoisContact>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoisDomain {
    pub id: String,
    pub domain: String,
    pub name: String,
    pub extension: String,
    pub whois_server: String,
    pub status: Vec<String>,
    pub name_servers: Vec<String>,
    pub dnssec: bool,
    pub created_date: String,
    pub updated_date: String,
    pub expiration_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoisContact {
    pub id: String,
    pub name: String,
    pub organization: String,
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
    pub fax: String,
    pub email: String,
    pub referral_url: String,
}

// --- Harvester Models ---

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarvesterResult {
    pub emails: BTreeSet<String>,
    pub subdomains: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- Outbound Events ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventError {
    pub code: String,
    pub message: String,
}

impl From<&ReconError> for EventError {
    fn from(err: &ReconError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Body published on a technique's result subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechniqueEvent {
    pub scan_id: String,
    pub error: Option<EventError>,
    pub timestamp: i64,
    pub results: Vec<TargetResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    ParsingError,
    ServiceError,
}

/// Body published on the scan-failed subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFailedEvent {
    pub scan_id: String,
    pub code: FailureCode,
    pub message: String,
    pub timestamp: i64,
}
