// src/core/scanner/subdomain_prober.rs

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use reqwest::StatusCode;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::web_client::WebClient;
use crate::error::ReconError;

/// Reads a line-delimited wordlist. Blank lines and `#` comments are skipped.
pub async fn read_wordlist(path: &Path) -> Result<Vec<String>, ReconError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ReconError::Wordlist {
            path: path.display().to_string(),
            source,
        })?;

    Ok(contents
        .lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect())
}

/// Brute-forces `http://<word>.<domain>` with at most `concurrency` probes in flight.
#[derive(Clone)]
pub struct SubdomainProber {
    client: Arc<dyn WebClient>,
    concurrency: usize,
}

impl SubdomainProber {
    pub fn new(client: Arc<dyn WebClient>, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    /// Probes every wordlist candidate under `domain`.
    ///
    /// Any status other than 200, or a transport error, just means "does not exist".
    /// When the token fires no further probe is launched and in-flight probes are dropped.
    ///
    /// # Arguments
    /// * `cancel` - The scan's token.
    /// * `domain` - The parent domain the labels are prefixed to.
    /// * `words` - Candidate labels, as read by [`read_wordlist`].
    ///
    /// # Returns
    /// Every `<word>.<domain>` host that answered 200 before completion or cancellation.
    pub async fn probe_all(
        &self,
        cancel: &CancellationToken,
        domain: &str,
        words: &[String],
    ) -> BTreeSet<String> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (found_tx, mut found_rx) = mpsc::channel::<String>(self.concurrency * 2);

        let collector = tokio::spawn(async move {
            let mut found = BTreeSet::new();
            while let Some(host) = found_rx.recv().await {
                found.insert(host);
            }
            found
        });

        let mut probes = JoinSet::new();
        for word in words {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(domain, "Subdomain harvest cancelled, no further probes launched.");
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let host = format!("{word}.{domain}");
            let client = Arc::clone(&self.client);
            let cancel = cancel.clone();
            let found_tx = found_tx.clone();

            probes.spawn(async move {
                let _permit = permit;
                let url = format!("http://{host}");
                let status = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    status = client.probe(&url) => status,
                };
                match status {
                    Ok(StatusCode::OK) => {
                        info!(subdomain = %host, "Found subdomain.");
                        let _ = found_tx.send(host).await;
                    }
                    Ok(status) => debug!(url = %url, %status, "Subdomain does not exist."),
                    Err(e) => debug!(url = %url, error = %e, "Subdomain does not exist."),
                }
            });
        }
        drop(found_tx);

        while probes.join_next().await.is_some() {}

        collector.await.unwrap_or_default()
    }
}
