// src/error.rs

//! Error type shared by the engines, handlers and the dispatcher.

use thiserror::Error;

/// Every failure the reconnaissance pipeline can produce below the binary.
///
/// None of these are fatal to the process: the dispatcher turns them into
/// `error` fields on outbound events or into scan-failed events.
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("failed to parse inbound event: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("could not derive a registrable domain from `{target}`: {reason}")]
    DomainDerivation { target: String, reason: String },

    #[error("whois query to {server} failed: {reason}")]
    WhoisNetwork { server: String, reason: String },

    #[error("whois response for {domain} could not be parsed: {reason}")]
    WhoisParse { domain: String, reason: String },

    #[error("dns lookup for {domain} failed for {}", format_failures(.failures))]
    DnsLookup {
        domain: String,
        failures: Vec<(String, String)>,
    },

    #[error("http request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("link discovery for {domain} returned nothing usable: {reason}")]
    LinkDiscovery { domain: String, reason: String },

    #[error("could not read wordlist {path}: {source}")]
    Wordlist {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no subject configured for technique `{0}`")]
    UnknownTechnique(String),

    #[error("publishing to `{subject}` failed: {reason}")]
    Publish { subject: String, reason: String },

    #[error("scan {0} is already in progress")]
    DuplicateScan(String),

    #[error("no valid targets")]
    NoValidTargets,

    #[error("scan cancelled")]
    Cancelled,

    #[error("completed with {} failed target(s): {}", .0.len(), join_errors(.0))]
    Partial(Vec<ReconError>),
}

impl ReconError {
    /// Stable machine-readable code used in the `error.code` field of outbound events.
    pub fn code(&self) -> &'static str {
        match self {
            ReconError::Parse(_) => "parsing_error",
            ReconError::DomainDerivation { .. } => "domain_derivation_error",
            ReconError::WhoisNetwork { .. } | ReconError::Http { .. } => "network_error",
            ReconError::WhoisParse { .. } => "whois_parse_error",
            ReconError::DnsLookup { .. } => "dns_lookup_error",
            ReconError::LinkDiscovery { .. } => "link_discovery_error",
            ReconError::Wordlist { .. } => "wordlist_error",
            ReconError::NoValidTargets => "no_valid_targets",
            ReconError::Cancelled => "cancelled",
            ReconError::Partial(_) => "partial_failure",
            ReconError::UnknownTechnique(_)
            | ReconError::Publish { .. }
            | ReconError::DuplicateScan(_) => "service_error",
        }
    }

    /// Folds a list of per-target failures into one aggregate error, or `None` when empty.
    pub fn aggregate(mut errors: Vec<ReconError>) -> Option<ReconError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ReconError::Partial(errors)),
        }
    }
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(record_type, reason)| format!("{record_type} ({reason})"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_errors(errors: &[ReconError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
