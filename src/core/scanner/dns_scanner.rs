// src/core/scanner/dns_scanner.rs

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::rr::{RData, Record, RecordType};
use hickory_resolver::proto::serialize::binary::BinEncodable;
use strum::IntoEnumIterator;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ReconEngine;
use crate::config::DnsConfig;
use crate::core::models::{
    DnsLookupResult, DnsRecord, DnsRecordType, RecordValue, ScanOutcome, Target, TargetResult,
    TechniqueName, TechniquePayload,
};
use crate::error::ReconError;

/// Answers one record-type query for one domain.
///
/// `Ok(vec![])` means the name exists but has no records of that type; `Err` carries the
/// reason the query itself failed.
#[async_trait]
pub trait RecordLookup: Send + Sync {
    async fn lookup(
        &self,
        domain: &str,
        record_type: DnsRecordType,
    ) -> Result<Vec<DnsRecord>, String>;
}

/// `RecordLookup` backed by a hickory resolver pointed at a single name server.
pub struct ResolverLookup {
    resolver: TokioAsyncResolver,
}

impl ResolverLookup {
    pub fn new(config: &DnsConfig) -> Self {
        let name_servers = NameServerConfigGroup::from_ips_clear(
            &[config.resolver.ip()],
            config.resolver.port(),
            true,
        );
        let resolver_config = ResolverConfig::from_parts(None, Vec::new(), name_servers);
        Self {
            resolver: TokioAsyncResolver::tokio(resolver_config, ResolverOpts::default()),
        }
    }
}

#[async_trait]
impl RecordLookup for ResolverLookup {
    async fn lookup(
        &self,
        domain: &str,
        record_type: DnsRecordType,
    ) -> Result<Vec<DnsRecord>, String> {
        debug!(target = %domain, %record_type, "Looking up record type.");
        match self.resolver.lookup(domain, to_wire_type(record_type)).await {
            Ok(lookup) => Ok(lookup
                .record_iter()
                .filter_map(|record| record_from_answer(record, record_type))
                .collect()),
            // An empty answer is a normal outcome, not a failed query.
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
                debug!(target = %domain, %record_type, "No records found.");
                Ok(Vec::new())
            }
            Err(e) => {
                warn!(target = %domain, %record_type, error = %e, "Record lookup failed.");
                Err(e.to_string())
            }
        }
    }
}

/// DNS record enumeration: every record type, for every target, in parallel.
#[derive(Clone)]
pub struct DnsScanner {
    lookup: Arc<dyn RecordLookup>,
}

impl DnsScanner {
    pub fn new(config: &DnsConfig) -> Self {
        Self::with_lookup(Arc::new(ResolverLookup::new(config)))
    }

    pub fn with_lookup(lookup: Arc<dyn RecordLookup>) -> Self {
        Self { lookup }
    }

    /// Queries all eight record types for `domain` in parallel.
    ///
    /// # Arguments
    /// * `domain` - The domain name to enumerate, without scheme or path.
    ///
    /// # Returns
    /// The lookup result, which is always present, and an error listing every record
    /// type whose query failed, if any did.
    pub async fn lookup_domain(&self, domain: &str) -> (DnsLookupResult, Option<ReconError>) {
        info!(target = %domain, "Starting DNS lookup.");
        let started = Instant::now();

        let mut queries: FuturesUnordered<_> = DnsRecordType::iter()
            .map(|record_type| async move {
                (record_type, self.lookup.lookup(domain, record_type).await)
            })
            .collect();

        let mut answers = Vec::new();
        while let Some(answer) = queries.next().await {
            answers.push(answer);
        }
        let duration = started.elapsed();

        let (result, error) = fold_answers(
            domain,
            answers,
            duration.as_millis().try_into().unwrap_or(u64::MAX),
        );
        info!(
            target = %domain,
            records = result.dns_records.len(),
            dnssec = result.dnssec_enabled,
            failed = error.is_some(),
            duration = ?duration,
            "DNS lookup finished."
        );
        (result, error)
    }
}

/// Merges per-record-type answers, in arrival order, into one result for `domain`.
///
/// Failed types contribute nothing to the records and are listed in the error.
pub fn fold_answers(
    domain: &str,
    answers: Vec<(DnsRecordType, Result<Vec<DnsRecord>, String>)>,
    lookup_duration_ms: u64,
) -> (DnsLookupResult, Option<ReconError>) {
    let mut records = Vec::new();
    let mut failures = Vec::new();
    for (record_type, answer) in answers {
        match answer {
            Ok(found) => records.extend(found),
            Err(reason) => failures.push((record_type.to_string(), reason)),
        }
    }

    let result = DnsLookupResult::new(domain.to_string(), records, lookup_duration_ms);
    let error = (!failures.is_empty()).then(|| ReconError::DnsLookup {
        domain: domain.to_string(),
        failures,
    });
    (result, error)
}

#[async_trait]
impl ReconEngine for DnsScanner {
    fn technique(&self) -> TechniqueName {
        TechniqueName::DnsLookup
    }

    async fn run_scan(&self, cancel: &CancellationToken, targets: &[Target]) -> ScanOutcome {
        info!(targets = targets.len(), "Starting DNS scan.");

        let results = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = JoinSet::new();

        for target in targets.iter().cloned() {
            let Some(domain) = target.domain() else {
                errors.lock().await.push(ReconError::DomainDerivation {
                    target: target.value.clone(),
                    reason: "not a domain name".to_string(),
                });
                continue;
            };
            let scanner = self.clone();
            let cancel = cancel.clone();
            let results = Arc::clone(&results);
            let errors = Arc::clone(&errors);

            tasks.spawn(async move {
                if cancel.is_cancelled() {
                    warn!(target = %domain, "Scan cancelled before DNS lookup started.");
                    return;
                }
                let (lookup, error) = tokio::select! {
                    _ = cancel.cancelled() => {
                        warn!(target = %domain, "DNS lookup abandoned on cancellation.");
                        return;
                    }
                    outcome = scanner.lookup_domain(&domain) => outcome,
                };
                results.lock().await.push(TargetResult::new(
                    target,
                    TechniqueName::DnsLookup,
                    TechniquePayload::Dns(lookup),
                ));
                if let Some(e) = error {
                    errors.lock().await.push(e);
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(panic = %e, "DNS task panicked.");
            }
        }

        let results = std::mem::take(&mut *results.lock().await);
        let errors = std::mem::take(&mut *errors.lock().await);
        info!(found = results.len(), failed = errors.len(), "DNS scan finished.");

        ScanOutcome {
            results,
            error: ReconError::aggregate(errors),
        }
    }
}

fn to_wire_type(record_type: DnsRecordType) -> RecordType {
    match record_type {
        DnsRecordType::A => RecordType::A,
        DnsRecordType::AAAA => RecordType::AAAA,
        DnsRecordType::CNAME => RecordType::CNAME,
        DnsRecordType::TXT => RecordType::TXT,
        DnsRecordType::NS => RecordType::NS,
        DnsRecordType::MX => RecordType::MX,
        DnsRecordType::SOA => RecordType::SOA,
        DnsRecordType::DNSKEY => RecordType::DNSKEY,
    }
}

/// Converts one answer record into the model, skipping records of other types
/// (e.g. the CNAME chain that precedes an A answer).
fn record_from_answer(record: &Record, record_type: DnsRecordType) -> Option<DnsRecord> {
    if record.record_type() != to_wire_type(record_type) {
        return None;
    }
    let value = record_value(record.data()?, record_type)?;
    Some(DnsRecord {
        record_type,
        name: record.name().to_utf8(),
        ttl: record.ttl(),
        value,
    })
}

fn record_value(rdata: &RData, record_type: DnsRecordType) -> Option<RecordValue> {
    let value = match rdata {
        RData::MX(mx) => RecordValue::MailExchange {
            host: mx.exchange().to_utf8(),
            priority: mx.preference(),
        },
        RData::SOA(soa) => RecordValue::StartOfAuthority {
            primary_ns: soa.mname().to_utf8(),
            admin_email: soa.rname().to_utf8(),
            serial: soa.serial(),
            refresh: soa.refresh(),
            retry: soa.retry(),
            expire: soa.expire(),
            minimum_ttl: soa.minimum(),
        },
        // DNSKEY is decoded from its wire form so it works with or without DNSSEC support.
        other if record_type == DnsRecordType::DNSKEY => parse_dnskey(&other.to_bytes().ok()?)?,
        other => RecordValue::Text(other.to_string()),
    };
    Some(value)
}

/// DNSKEY RDATA: flags (2 bytes), protocol (1), algorithm (1), public key.
fn parse_dnskey(rdata: &[u8]) -> Option<RecordValue> {
    match rdata {
        [f0, f1, protocol, algorithm, ..] => Some(RecordValue::DnsKey {
            flags: u16::from_be_bytes([*f0, *f1]),
            protocol: *protocol,
            algorithm: *algorithm,
        }),
        _ => None,
    }
}
