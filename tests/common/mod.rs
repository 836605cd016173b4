//! In-process fakes shared by the integration tests. Nothing here touches the network.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use vanguard_recon::config::SubjectConfig;
use vanguard_recon::core::bus::EventBus;
use vanguard_recon::core::dispatcher::{Dispatcher, EventRoutes, ScanManager};
use vanguard_recon::core::handlers::ScanHandler;
use vanguard_recon::core::models::{
    HarvesterResult, ScanOutcome, Target, TargetResult, TechniqueName, TechniquePayload,
};
use vanguard_recon::core::scanner::ReconEngine;
use vanguard_recon::core::scanner::web_client::WebClient;
use vanguard_recon::error::ReconError;

// --- Event Bus ---

/// Records every publication; publishing to a subject in `failing` returns an error.
#[derive(Default)]
pub struct RecordingBus {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    failing: HashSet<String>,
}

impl RecordingBus {
    pub fn failing_on(subject: &str) -> Self {
        Self {
            failing: HashSet::from([subject.to_string()]),
            ..Self::default()
        }
    }

    pub fn subjects(&self) -> Vec<String> {
        let published = self.published.lock().unwrap();
        published.iter().map(|(subject, _)| subject.clone()).collect()
    }

    pub fn events_on(&self, subject: &str) -> Vec<Value> {
        let published = self.published.lock().unwrap();
        published
            .iter()
            .filter(|(s, _)| s == subject)
            .map(|(_, payload)| serde_json::from_slice(payload).unwrap())
            .collect()
    }
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), ReconError> {
        if self.failing.contains(subject) {
            return Err(ReconError::Publish {
                subject: subject.to_string(),
                reason: "bus unavailable".to_string(),
            });
        }
        self.published
            .lock()
            .unwrap()
            .push((subject.to_string(), payload));
        Ok(())
    }
}

// --- Engines ---

/// Engine that waits `delay` (or until cancelled) and returns one result per target.
pub struct FakeEngine {
    pub technique: TechniqueName,
    pub delay: Duration,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeEngine {
    pub fn new(technique: TechniqueName) -> Self {
        Self {
            technique,
            delay: Duration::from_millis(10),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn slow(technique: TechniqueName) -> Self {
        Self {
            delay: Duration::from_secs(30),
            ..Self::new(technique)
        }
    }

    pub fn failing(technique: TechniqueName) -> Self {
        Self {
            fail: true,
            ..Self::new(technique)
        }
    }
}

#[async_trait]
impl ReconEngine for FakeEngine {
    fn technique(&self) -> TechniqueName {
        self.technique
    }

    async fn run_scan(&self, cancel: &CancellationToken, targets: &[Target]) -> ScanOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = cancel.cancelled() => return ScanOutcome::default(),
            _ = tokio::time::sleep(self.delay) => {}
        }

        if self.fail {
            return ScanOutcome {
                results: Vec::new(),
                error: Some(ReconError::Http {
                    url: "https://unreachable.test".to_string(),
                    reason: "connection refused".to_string(),
                }),
            };
        }

        ScanOutcome {
            results: targets
                .iter()
                .map(|t| {
                    TargetResult::new(
                        t.clone(),
                        self.technique,
                        TechniquePayload::Harvester(HarvesterResult::default()),
                    )
                })
                .collect(),
            error: None,
        }
    }
}

pub fn dispatcher_with(
    bus: Arc<RecordingBus>,
    engines: Vec<Arc<FakeEngine>>,
    routes: EventRoutes,
) -> Dispatcher {
    let handlers = engines
        .into_iter()
        .map(|engine| ScanHandler::new(engine as Arc<dyn ReconEngine>))
        .collect();
    Dispatcher::new(bus, Arc::new(ScanManager::new()), handlers, routes)
}

pub fn default_routes() -> EventRoutes {
    EventRoutes::from(&SubjectConfig::default())
}

pub fn all_techniques(make: fn(TechniqueName) -> FakeEngine) -> Vec<Arc<FakeEngine>> {
    vec![
        Arc::new(make(TechniqueName::Whois)),
        Arc::new(make(TechniqueName::DnsLookup)),
        Arc::new(make(TechniqueName::Harvester)),
    ]
}

pub fn scan_started(scan_id: &str, targets: &[&str]) -> Vec<u8> {
    let targets: Vec<Value> = targets
        .iter()
        .map(|t| serde_json::json!({ "value": t }))
        .collect();
    serde_json::to_vec(&serde_json::json!({ "scan_id": scan_id, "targets": targets })).unwrap()
}

pub fn scan_cancelled(scan_id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({ "scan_id": scan_id })).unwrap()
}

/// Polls until `manager` holds `count` scopes, or panics after two seconds.
pub async fn wait_for_scopes(manager: &ScanManager, count: usize) {
    for _ in 0..200 {
        if manager.len().await == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scan manager never reached {count} scope(s)");
}

// --- Web Client ---

/// Serves canned pages and probe answers, tracking how many probes overlap.
#[derive(Default)]
pub struct FakeWebClient {
    pages: HashMap<String, String>,
    live_urls: HashSet<String>,
    probe_delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub probes: AtomicUsize,
}

impl FakeWebClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_live_url(mut self, url: &str) -> Self {
        self.live_urls.insert(url.to_string());
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }
}

#[async_trait]
impl WebClient for FakeWebClient {
    async fn fetch_page(&self, url: &str) -> Result<String, ReconError> {
        self.pages.get(url).cloned().ok_or_else(|| ReconError::Http {
            url: url.to_string(),
            reason: "non-OK HTTP status: 404 Not Found".to_string(),
        })
    }

    async fn probe(&self, url: &str) -> Result<StatusCode, ReconError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.probe_delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.live_urls.contains(url) {
            Ok(StatusCode::OK)
        } else {
            Ok(StatusCode::NOT_FOUND)
        }
    }
}
