// src/core/scanner/whois_scanner.rs

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ReconEngine;
use super::whois_client::WhoisClient;
use super::whois_parser::parse_whois;
use crate::config::WhoisConfig;
use crate::core::models::{ScanOutcome, Target, TargetResult, TechniqueName, TechniquePayload};
use crate::error::ReconError;

/// Registration lookup: one concurrent WHOIS query per target.
#[derive(Debug, Clone)]
pub struct WhoisScanner {
    client: WhoisClient,
}

impl WhoisScanner {
    pub fn new(config: &WhoisConfig) -> Self {
        Self {
            client: WhoisClient::new(config),
        }
    }

    async fn scan_target(&self, target: &Target) -> Result<TargetResult, ReconError> {
        let domain = registrable_domain(&target.value)?;
        debug!(target = %target.value, domain = %domain, "Querying WHOIS.");

        let raw = self.client.lookup(&domain).await?;
        let info = parse_whois(&domain, &raw)?;

        Ok(TargetResult::new(
            target.clone(),
            TechniqueName::Whois,
            TechniquePayload::Whois(Box::new(info)),
        ))
    }
}

#[async_trait]
impl ReconEngine for WhoisScanner {
    fn technique(&self) -> TechniqueName {
        TechniqueName::Whois
    }

    async fn run_scan(&self, cancel: &CancellationToken, targets: &[Target]) -> ScanOutcome {
        info!(targets = targets.len(), "Starting WHOIS scan.");

        let results = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = JoinSet::new();

        for target in targets.iter().cloned() {
            let scanner = self.clone();
            let cancel = cancel.clone();
            let results = Arc::clone(&results);
            let errors = Arc::clone(&errors);

            tasks.spawn(async move {
                if cancel.is_cancelled() {
                    warn!(target = %target.value, "Scan cancelled before WHOIS lookup started.");
                    return;
                }
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => {
                        warn!(target = %target.value, "WHOIS lookup abandoned on cancellation.");
                        return;
                    }
                    outcome = scanner.scan_target(&target) => outcome,
                };
                match outcome {
                    Ok(result) => results.lock().await.push(result),
                    Err(e) => {
                        error!(target = %target.value, error = %e, "WHOIS lookup failed, skipping target.");
                        errors.lock().await.push(e);
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(panic = %e, "WHOIS task panicked.");
            }
        }

        let results = std::mem::take(&mut *results.lock().await);
        let errors = std::mem::take(&mut *errors.lock().await);
        info!(found = results.len(), failed = errors.len(), "WHOIS scan finished.");

        ScanOutcome {
            results,
            error: ReconError::aggregate(errors),
        }
    }
}

/// Reduces a hostname or URL to its registrable domain (effective TLD + 1 label).
///
/// # Arguments
/// * `raw` - A target value: bare host, or URL with scheme, path and query.
///
/// # Returns
/// The lowercase registrable domain, e.g. `google.co.uk` for `https://www.google.co.uk`,
/// or `DomainDerivation` for IP literals, bare suffixes and unparsable values.
pub fn registrable_domain(raw: &str) -> Result<String, ReconError> {
    let fail = |reason: &str| ReconError::DomainDerivation {
        target: raw.to_string(),
        reason: reason.to_string(),
    };

    let host = Target::new(raw)
        .domain()
        .ok_or_else(|| fail("not a domain name"))?;
    let domain = psl::domain_str(&host).ok_or_else(|| fail("no registrable domain"))?;

    // A bare unlisted label (e.g. "localhost") falls under the wildcard rule and has no +1.
    if !domain.contains('.') {
        return Err(fail("no registrable domain"));
    }
    Ok(domain.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registrable_domain_follows_public_suffix_rules() {
        let cases = [
            ("http://www.google.com", "google.com"),
            ("https://www.example.com", "example.com"),
            ("www.bing.com", "bing.com"),
            ("https://subdomain.google.com", "google.com"),
            ("https://www.google.co.uk", "google.co.uk"),
            ("Example.ORG/path?q=1", "example.org"),
        ];
        for (input, expected) in cases {
            assert_eq!(registrable_domain(input).unwrap(), expected, "input {input}");
        }
    }

    #[test]
    fn values_without_a_registrable_domain_are_rejected() {
        for input in ["invalid_url", "localhost", "192.168.0.1", "", "com"] {
            let err = registrable_domain(input).unwrap_err();
            assert_eq!(err.code(), "domain_derivation_error", "input {input}");
        }
    }

    #[tokio::test]
    async fn cancelled_scan_skips_every_target() {
        let scanner = WhoisScanner::new(&WhoisConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = scanner
            .run_scan(&cancel, &[Target::new("example.com"), Target::new("example.org")])
            .await;

        assert!(outcome.results.is_empty());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn underivable_targets_are_collected_as_errors() {
        let scanner = WhoisScanner::new(&WhoisConfig::default());
        let outcome = scanner
            .run_scan(
                &CancellationToken::new(),
                &[Target::new("invalid_url"), Target::new("10.0.0.1")],
            )
            .await;

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.error.unwrap().code(), "partial_failure");
    }
}
