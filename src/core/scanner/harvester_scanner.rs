// src/core/scanner/harvester_scanner.rs

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::ReconEngine;
use super::email_extractor::{extract_emails_from_html, extract_search_links};
use super::subdomain_prober::{SubdomainProber, read_wordlist};
use super::web_client::WebClient;
use crate::config::HarvesterConfig;
use crate::core::models::{
    HarvesterResult, ScanOutcome, Target, TargetResult, TechniqueName, TechniquePayload,
};
use crate::error::ReconError;

/// Open-source harvesting: domain emails scraped from search results, and subdomains
/// brute-forced from a wordlist.
///
/// Targets are handled one after another to keep the request burst against the search
/// engine small; each target's link processing and probing are concurrent internally.
#[derive(Clone)]
pub struct HarvesterScanner {
    client: Arc<dyn WebClient>,
    prober: SubdomainProber,
    config: HarvesterConfig,
}

impl HarvesterScanner {
    pub fn new(client: Arc<dyn WebClient>, config: HarvesterConfig) -> Self {
        let prober = SubdomainProber::new(Arc::clone(&client), config.probe_concurrency);
        Self {
            client,
            prober,
            config,
        }
    }

    /// Emails of `domain` found on pages the search engine links to.
    ///
    /// # Arguments
    /// * `cancel` - The scan's token; no further page is fetched once it fires.
    /// * `domain` - The domain whose addresses are collected.
    ///
    /// # Returns
    /// The deduplicated addresses, or `LinkDiscovery` when both searches failed.
    pub async fn harvest_emails(
        &self,
        cancel: &CancellationToken,
        domain: &str,
    ) -> Result<BTreeSet<String>, ReconError> {
        let started = Instant::now();
        info!(target = %domain, "Harvesting emails.");

        let links = self.scrape_links(cancel, domain).await?;
        let emails = self.process_links(cancel, domain, links).await;

        info!(
            target = %domain,
            email_count = emails.len(),
            duration = ?started.elapsed(),
            "Completed email harvesting."
        );
        Ok(emails)
    }

    /// Hosts under `domain` that answer HTTP 200, from the configured wordlist.
    pub async fn harvest_subdomains(
        &self,
        cancel: &CancellationToken,
        domain: &str,
    ) -> Result<BTreeSet<String>, ReconError> {
        let started = Instant::now();
        info!(target = %domain, "Harvesting subdomains.");

        let words = read_wordlist(&self.config.wordlist_path).await?;
        let subdomains = self.prober.probe_all(cancel, domain, &words).await;

        info!(
            target = %domain,
            candidates = words.len(),
            subdomain_count = subdomains.len(),
            duration = ?started.elapsed(),
            "Completed subdomain harvesting."
        );
        Ok(subdomains)
    }

    /// Runs the general and the professional-network search, with a random pause between.
    async fn scrape_links(
        &self,
        cancel: &CancellationToken,
        domain: &str,
    ) -> Result<Vec<String>, ReconError> {
        debug!(target = %domain, "Scraping search engine links.");

        let general = self.search(cancel, domain).await;
        if let Err(e) = &general {
            warn!(target = %domain, error = %e, "General search scraping failed.");
        }

        let delay = self.random_search_delay();
        tokio::select! {
            _ = cancel.cancelled() => return Err(ReconError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        let professional = self
            .search(cancel, &format!("site:linkedin.com {domain}"))
            .await;
        if let Err(e) = &professional {
            warn!(target = %domain, error = %e, "Professional-network search scraping failed.");
        }

        let links = match (general, professional) {
            (Err(first), Err(second)) => {
                return Err(ReconError::LinkDiscovery {
                    domain: domain.to_string(),
                    reason: format!("{first}; {second}"),
                });
            }
            (general, professional) => {
                let mut links = general.unwrap_or_default();
                for link in professional.unwrap_or_default() {
                    if !links.contains(&link) {
                        links.push(link);
                    }
                }
                links
            }
        };

        debug!(target = %domain, link_count = links.len(), "Scraped links.");
        Ok(links)
    }

    async fn search(
        &self,
        cancel: &CancellationToken,
        query: &str,
    ) -> Result<Vec<String>, ReconError> {
        let url = search_url(&self.config.search_base_url, query)?;
        let page = tokio::select! {
            _ = cancel.cancelled() => return Err(ReconError::Cancelled),
            page = self.client.fetch_page(&url) => page?,
        };
        Ok(extract_search_links(&page))
    }

    fn random_search_delay(&self) -> Duration {
        let range = &self.config.search_delay_secs;
        let secs = if range.start() >= range.end() {
            *range.start()
        } else {
            rand::thread_rng().gen_range(range.clone())
        };
        Duration::from_secs(secs)
    }

    /// Spreads `links` over a fixed pool of workers and merges every email they find.
    async fn process_links(
        &self,
        cancel: &CancellationToken,
        domain: &str,
        links: Vec<String>,
    ) -> BTreeSet<String> {
        if links.is_empty() {
            return BTreeSet::new();
        }

        let (job_tx, job_rx) = mpsc::channel::<String>(links.len());
        for link in links {
            // Capacity equals the number of links, so this never waits.
            let _ = job_tx.send(link).await;
        }
        drop(job_tx);

        let jobs = Arc::new(Mutex::new(job_rx));
        let emails = Arc::new(Mutex::new(BTreeSet::new()));
        let mut workers = JoinSet::new();

        for worker_id in 0..self.config.workers.max(1) {
            let jobs = Arc::clone(&jobs);
            let emails = Arc::clone(&emails);
            let client = Arc::clone(&self.client);
            let cancel = cancel.clone();
            let domain = domain.to_string();

            workers.spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        debug!(worker_id, "Worker stopping on cancellation.");
                        return;
                    }
                    let Some(link) = jobs.lock().await.recv().await else {
                        return;
                    };

                    let page = tokio::select! {
                        _ = cancel.cancelled() => return,
                        page = client.fetch_page(&link) => page,
                    };
                    match page {
                        Ok(html) => {
                            let found = extract_emails_from_html(&domain, &html);
                            if !found.is_empty() {
                                debug!(worker_id, link = %link, count = found.len(), "Emails found on page.");
                                emails.lock().await.extend(found);
                            }
                        }
                        Err(e) => debug!(worker_id, link = %link, error = %e, "Error processing link."),
                    }
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(panic = %e, "Link worker panicked.");
            }
        }

        std::mem::take(&mut *emails.lock().await)
    }

    async fn scan_target(
        &self,
        cancel: &CancellationToken,
        target: &Target,
        domain: &str,
    ) -> (TargetResult, Option<ReconError>) {
        let mut result = HarvesterResult::default();
        let mut failures = Vec::new();

        match self.harvest_emails(cancel, domain).await {
            Ok(emails) => result.emails = emails,
            Err(e) => {
                error!(target = %domain, error = %e, "Error harvesting emails.");
                failures.push(e);
            }
        }

        // Subdomains are independent of link discovery and run even when it failed.
        match self.harvest_subdomains(cancel, domain).await {
            Ok(subdomains) => result.subdomains = subdomains,
            Err(e) => {
                error!(target = %domain, error = %e, "Error harvesting subdomains.");
                failures.push(e);
            }
        }

        if !failures.is_empty() {
            result.error = Some(
                failures
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            );
        }

        let target_result = TargetResult::new(
            target.clone(),
            TechniqueName::Harvester,
            TechniquePayload::Harvester(result),
        );
        (target_result, ReconError::aggregate(failures))
    }
}

#[async_trait]
impl ReconEngine for HarvesterScanner {
    fn technique(&self) -> TechniqueName {
        TechniqueName::Harvester
    }

    async fn run_scan(&self, cancel: &CancellationToken, targets: &[Target]) -> ScanOutcome {
        info!(targets = targets.len(), "Starting harvester scan.");
        let mut outcome = ScanOutcome::default();
        let mut errors = Vec::new();

        for target in targets {
            if cancel.is_cancelled() {
                warn!(target = %target.value, "Harvester scan cancelled, remaining targets skipped.");
                break;
            }
            let Some(domain) = target.domain() else {
                errors.push(ReconError::DomainDerivation {
                    target: target.value.clone(),
                    reason: "not a domain name".to_string(),
                });
                continue;
            };

            let (result, error) = self.scan_target(cancel, target, &domain).await;
            outcome.results.push(result);
            errors.extend(error);
        }

        if !errors.is_empty() {
            warn!(failed = errors.len(), "Some targets failed during the harvester scan.");
        }
        outcome.error = ReconError::aggregate(errors);
        outcome
    }
}

/// `<base>?num=100&q=<query>`, with the query form-encoded.
pub fn search_url(base: &str, query: &str) -> Result<String, ReconError> {
    Url::parse_with_params(base, &[("num", "100"), ("q", query)])
        .map(|url| url.to_string())
        .map_err(|e| ReconError::Http {
            url: base.to_string(),
            reason: format!("invalid search URL: {e}"),
        })
}
