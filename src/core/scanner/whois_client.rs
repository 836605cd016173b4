// src/core/scanner/whois_client.rs

//! WHOIS over TCP port 43 (RFC 3912).
//!
//! The bootstrap server is asked which server is authoritative for the TLD, that
//! server is asked about the domain, and a thin-registry referral to the registrar's
//! own WHOIS server is followed once.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::WhoisConfig;
use crate::error::ReconError;

/// Responses larger than this are truncated; real WHOIS answers are a few KiB.
const MAX_RESPONSE_BYTES: u64 = 256 * 1024;

#[derive(Debug, Clone)]
pub struct WhoisClient {
    bootstrap_server: String,
    port: u16,
    timeout: Duration,
}

impl WhoisClient {
    pub fn new(config: &WhoisConfig) -> Self {
        Self {
            bootstrap_server: config.bootstrap_server.clone(),
            port: config.port,
            timeout: config.timeout,
        }
    }

    /// Fetches the raw WHOIS text for a registrable domain.
    pub async fn lookup(&self, domain: &str) -> Result<String, ReconError> {
        let tld = domain.rsplit('.').next().unwrap_or(domain);
        let bootstrap = self.query(&self.bootstrap_server, tld).await?;

        let server = match find_field(&bootstrap, &["refer", "whois"]) {
            Some(server) => server,
            None => {
                debug!(tld, "Bootstrap server gave no referral, asking it directly.");
                self.bootstrap_server.clone()
            }
        };

        let registry_answer = self.query(&server, domain).await?;

        // Thin registries (.com, .net) only point at the registrar.
        match find_field(&registry_answer, &["registrar whois server"]) {
            Some(registrar) if !registrar.eq_ignore_ascii_case(&server) => {
                debug!(domain, registrar = %registrar, "Following registrar referral.");
                match self.query(&registrar, domain).await {
                    Ok(answer) if !answer.trim().is_empty() => Ok(answer),
                    Ok(_) => Ok(registry_answer),
                    Err(e) => {
                        warn!(domain, error = %e, "Registrar WHOIS failed, keeping registry answer.");
                        Ok(registry_answer)
                    }
                }
            }
            _ => Ok(registry_answer),
        }
    }

    /// Sends a single query line to `server` and reads until the server closes.
    async fn query(&self, server: &str, query: &str) -> Result<String, ReconError> {
        let address = format!("{server}:{}", self.port);
        debug!(server = %address, query, "Sending WHOIS query.");

        let exchange = async {
            let mut stream = TcpStream::connect(&address).await?;
            stream.write_all(format!("{query}\r\n").as_bytes()).await?;

            let mut buffer = Vec::new();
            stream
                .take(MAX_RESPONSE_BYTES)
                .read_to_end(&mut buffer)
                .await?;
            Ok::<_, std::io::Error>(buffer)
        };

        let bytes = timeout(self.timeout, exchange)
            .await
            .map_err(|_| ReconError::WhoisNetwork {
                server: server.to_string(),
                reason: format!("timed out after {:?}", self.timeout),
            })?
            .map_err(|e| ReconError::WhoisNetwork {
                server: server.to_string(),
                reason: e.to_string(),
            })?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Returns the first non-empty value of any of `keys` (case-insensitive) in a WHOIS answer.
fn find_field(response: &str, keys: &[&str]) -> Option<String> {
    response.lines().find_map(|line| {
        let (key, value) = line.trim().split_once(':')?;
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if keys.contains(&key.as_str()) && !value.is_empty() {
            Some(strip_whois_scheme(value))
        } else {
            None
        }
    })
}

/// Some registries publish the referral as `whois://host` or with a trailing path.
fn strip_whois_scheme(value: &str) -> String {
    let value = value
        .strip_prefix("whois://")
        .or_else(|| value.strip_prefix("rwhois://"))
        .unwrap_or(value);
    value
        .split(['/', ' '])
        .next()
        .unwrap_or(value)
        .to_lowercase()
}
