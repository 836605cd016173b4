// src/config.rs

//! Runtime configuration.
//!
//! Only the event-bus location comes from the environment; everything else is a typed
//! default that tests and the binary can override field by field.

use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

pub const NATS_HOST_ENV: &str = "NATS_HOST";
pub const NATS_PORT_ENV: &str = "NATS_PORT";

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub nats_host: String,
    pub nats_port: String,
    pub subjects: SubjectConfig,
    pub dns: DnsConfig,
    pub whois: WhoisConfig,
    pub harvester: HarvesterConfig,
}

impl Config {
    /// Builds the configuration from `NATS_HOST` / `NATS_PORT`, with defaults for the rest.
    pub fn from_env() -> Self {
        Self {
            nats_host: fetch_env(NATS_HOST_ENV, "localhost"),
            nats_port: fetch_env(NATS_PORT_ENV, "4222"),
            subjects: SubjectConfig::default(),
            dns: DnsConfig::default(),
            whois: WhoisConfig::default(),
            harvester: HarvesterConfig::default(),
        }
    }

    pub fn nats_url(&self) -> String {
        format!("nats://{}:{}", self.nats_host, self.nats_port)
    }
}

fn fetch_env(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

/// Names of every subject the service listens on or publishes to.
#[derive(Debug, Clone)]
pub struct SubjectConfig {
    pub scan_started: String,
    pub scan_cancelled: String,
    pub scan_failed: String,
    pub whois_result: String,
    pub dns_lookup_result: String,
    pub harvester_result: String,
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            scan_started: "scan-started".to_string(),
            scan_cancelled: "scan-cancelled".to_string(),
            scan_failed: "scan-failed".to_string(),
            whois_result: "whois-result".to_string(),
            dns_lookup_result: "dns-lookup-result".to_string(),
            harvester_result: "harvester-result".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DnsConfig {
    /// The single resolver every record-type query is sent to.
    pub resolver: SocketAddr,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            resolver: SocketAddr::from(([8, 8, 8, 8], 53)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WhoisConfig {
    /// Bootstrap server asked for the authoritative server of a TLD.
    pub bootstrap_server: String,
    pub port: u16,
    pub timeout: Duration,
}

impl Default for WhoisConfig {
    fn default() -> Self {
        Self {
            bootstrap_server: "whois.iana.org".to_string(),
            port: 43,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarvesterConfig {
    /// Number of link-processing workers per target.
    pub workers: usize,
    /// Maximum simultaneous subdomain probes per target.
    pub probe_concurrency: usize,
    pub http_timeout: Duration,
    /// Pause between the two search queries, in whole seconds.
    pub search_delay_secs: RangeInclusive<u64>,
    pub wordlist_path: PathBuf,
    pub search_base_url: String,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            probe_concurrency: 5,
            http_timeout: Duration::from_secs(2),
            search_delay_secs: 2..=5,
            wordlist_path: PathBuf::from("wordlists").join("subdomains.txt"),
            search_base_url: "https://www.google.com/search".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nats_url_uses_host_and_port() {
        let config = Config {
            nats_host: "bus.internal".into(),
            nats_port: "4333".into(),
            ..Config::from_env()
        };
        assert_eq!(config.nats_url(), "nats://bus.internal:4333");
    }

    #[test]
    fn harvester_defaults_cap_outbound_concurrency_at_five() {
        let harvester = HarvesterConfig::default();
        assert_eq!(harvester.workers, 5);
        assert_eq!(harvester.probe_concurrency, 5);
        assert_eq!(harvester.http_timeout, Duration::from_secs(2));
    }

    #[test]
    fn fetch_env_falls_back_when_unset() {
        assert_eq!(
            fetch_env("VANGUARD_RECON_SURELY_UNSET_VARIABLE", "fallback"),
            "fallback"
        );
    }
}
