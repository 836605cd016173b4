// src/core/scanner/mod.rs

// Public interface of the `scanner` module: one engine per reconnaissance technique
// plus the helpers they share.
pub mod dns_scanner;
pub mod email_extractor;
pub mod harvester_scanner;
pub mod subdomain_prober;
pub mod web_client;
pub mod whois_client;
pub mod whois_parser;
pub mod whois_scanner;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::models::{ScanOutcome, Target, TechniqueName};

/// A reconnaissance technique that can be run over a batch of targets.
///
/// Implementations never fail as a whole: per-target failures are folded into
/// `ScanOutcome::error` and whatever was produced is returned in `results`.
/// The token is shared by every task spawned for the scan; once it fires no new
/// unit of work starts and in-flight network calls are abandoned.
#[async_trait]
pub trait ReconEngine: Send + Sync {
    fn technique(&self) -> TechniqueName;

    async fn run_scan(&self, cancel: &CancellationToken, targets: &[Target]) -> ScanOutcome;
}
