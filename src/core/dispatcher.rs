// src/core/dispatcher.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SubjectConfig;
use crate::core::bus::EventBus;
use crate::core::handlers::ScanHandler;
use crate::core::models::{
    EventError, FailureCode, ScanCancelledEvent, ScanFailedEvent, ScanStartedEvent,
    ServiceResult, TechniqueEvent, TechniqueName,
};
use crate::error::ReconError;

// --- Scan Manager ---

/// The cancellation handle of one running scan.
#[derive(Debug, Clone)]
pub struct ScanScope {
    pub scan_id: String,
    pub generation: u64,
    pub token: CancellationToken,
}

/// Owns the live cancellation scopes, keyed by scan id.
///
/// Each scope carries a generation number so that a scan finishing late can never remove
/// the scope of a newer scan that reused its id.
#[derive(Debug, Default)]
pub struct ScanManager {
    scopes: Mutex<HashMap<String, (u64, CancellationToken)>>,
    next_generation: AtomicU64,
}

impl ScanManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a scope for `scan_id`. Fails if the id already has a live scope.
    pub async fn register(&self, scan_id: &str) -> Result<ScanScope, ReconError> {
        let mut scopes = self.scopes.lock().await;
        if scopes.contains_key(scan_id) {
            return Err(ReconError::DuplicateScan(scan_id.to_string()));
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        scopes.insert(scan_id.to_string(), (generation, token.clone()));
        Ok(ScanScope {
            scan_id: scan_id.to_string(),
            generation,
            token,
        })
    }

    /// Fires and removes the scope of `scan_id`. Returns `false` when there is none.
    pub async fn cancel(&self, scan_id: &str) -> bool {
        let removed = self.scopes.lock().await.remove(scan_id);
        match removed {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Removes the scope if it still belongs to `scope`. Returns whether it removed anything.
    pub async fn release(&self, scope: &ScanScope) -> bool {
        let mut scopes = self.scopes.lock().await;
        match scopes.get(&scope.scan_id) {
            Some((generation, _)) if *generation == scope.generation => {
                scopes.remove(&scope.scan_id);
                true
            }
            _ => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.scopes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

// --- Fan-in ---

/// Merges several streams into one. Items keep their order within each input stream;
/// the output closes once every input is exhausted.
pub fn fan_in<T: Send + 'static>(inputs: Vec<mpsc::Receiver<T>>) -> mpsc::Receiver<T> {
    let (tx, rx) = mpsc::channel(inputs.len().max(1));
    for mut input in inputs {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(item) = input.recv().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
    }
    rx
}

// --- Dispatcher ---

/// Outbound subjects, one per technique plus the failure subject.
#[derive(Debug, Clone)]
pub struct EventRoutes {
    pub results: HashMap<TechniqueName, String>,
    pub scan_failed: String,
}

impl From<&SubjectConfig> for EventRoutes {
    fn from(subjects: &SubjectConfig) -> Self {
        Self {
            results: HashMap::from([
                (TechniqueName::Whois, subjects.whois_result.clone()),
                (TechniqueName::DnsLookup, subjects.dns_lookup_result.clone()),
                (TechniqueName::Harvester, subjects.harvester_result.clone()),
            ]),
            scan_failed: subjects.scan_failed.clone(),
        }
    }
}

/// Owns the scan lifecycle: fans a start event out to every handler, publishes one
/// event per technique and honours cancellation requests.
pub struct Dispatcher {
    bus: Arc<dyn EventBus>,
    manager: Arc<ScanManager>,
    handlers: Vec<ScanHandler>,
    routes: EventRoutes,
}

impl Dispatcher {
    pub fn new(
        bus: Arc<dyn EventBus>,
        manager: Arc<ScanManager>,
        handlers: Vec<ScanHandler>,
        routes: EventRoutes,
    ) -> Self {
        Self {
            bus,
            manager,
            handlers,
            routes,
        }
    }

    pub fn manager(&self) -> &Arc<ScanManager> {
        &self.manager
    }

    /// Handles one scan-started payload, returning once every technique has published.
    pub async fn on_scan_started(&self, payload: &[u8]) {
        let event: ScanStartedEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                let raw = String::from_utf8_lossy(payload);
                warn!(error = %e, "Malformed scan-started event.");
                let err = ReconError::from(e);
                self.publish_scan_failed(
                    &scan_id_hint(payload),
                    FailureCode::ParsingError,
                    format!("{err}; payload: {raw}"),
                )
                .await;
                return;
            }
        };

        let scope = match self.manager.register(&event.scan_id).await {
            Ok(scope) => scope,
            Err(e) => {
                warn!(scan_id = %event.scan_id, error = %e, "Refusing scan.");
                self.publish_scan_failed(&event.scan_id, FailureCode::ServiceError, e.to_string())
                    .await;
                return;
            }
        };

        info!(
            scan_id = %event.scan_id,
            targets = event.targets.len(),
            techniques = self.handlers.len(),
            "Scan started."
        );

        let event = Arc::new(event);
        let streams = self
            .handlers
            .iter()
            .map(|handler| handler.run_scan(scope.token.clone(), Arc::clone(&event)))
            .collect();

        let mut results = fan_in(streams);
        while let Some(result) = results.recv().await {
            let technique = result.technique;
            if let Err(e) = self.process_service_result(result).await {
                error!(scan_id = %event.scan_id, %technique, error = %e, "Failed to publish technique result.");
                self.publish_scan_failed(&event.scan_id, FailureCode::ServiceError, e.to_string())
                    .await;
            }
        }

        if self.manager.release(&scope).await {
            info!(scan_id = %event.scan_id, "Scan completed.");
        } else {
            debug!(scan_id = %event.scan_id, "Scan finished after its scope was cancelled.");
        }
    }

    /// Handles one scan-cancelled payload. An unknown scan id is a no-op.
    pub async fn on_scan_cancelled(&self, payload: &[u8]) {
        let event: ScanCancelledEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Malformed scan-cancelled event ignored.");
                return;
            }
        };

        if self.manager.cancel(&event.scan_id).await {
            info!(scan_id = %event.scan_id, "Scan cancelled.");
        } else {
            info!(scan_id = %event.scan_id, "No active scan to cancel.");
        }
    }

    async fn process_service_result(&self, result: ServiceResult) -> Result<(), ReconError> {
        let subject = self
            .routes
            .results
            .get(&result.technique)
            .ok_or_else(|| ReconError::UnknownTechnique(result.technique.to_string()))?;

        if let Some(e) = &result.error {
            warn!(scan_id = %result.scan_id, technique = %result.technique, code = e.code(), error = %e, "Technique reported an error.");
        }

        let event = TechniqueEvent {
            scan_id: result.scan_id,
            error: result.error.as_ref().map(EventError::from),
            timestamp: Utc::now().timestamp(),
            results: result.results,
        };
        let payload = serde_json::to_vec(&event).map_err(|e| ReconError::Publish {
            subject: subject.clone(),
            reason: e.to_string(),
        })?;

        self.bus.publish(subject, payload).await?;
        info!(scan_id = %event.scan_id, subject = %subject, results = event.results.len(), "Published technique result.");
        Ok(())
    }

    async fn publish_scan_failed(&self, scan_id: &str, code: FailureCode, message: String) {
        let event = ScanFailedEvent {
            scan_id: scan_id.to_string(),
            code,
            message,
            timestamp: Utc::now().timestamp(),
        };
        let subject = &self.routes.scan_failed;
        let published = match serde_json::to_vec(&event) {
            Ok(payload) => self.bus.publish(subject, payload).await,
            Err(e) => Err(ReconError::Publish {
                subject: subject.clone(),
                reason: e.to_string(),
            }),
        };
        if let Err(e) = published {
            error!(scan_id, error = %e, "Failed to publish scan-failed event.");
        }
    }
}

/// Best-effort scan id from a payload that did not match the event schema.
fn scan_id_hint(payload: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(payload)
        .ok()
        .and_then(|value| value.get("scan_id")?.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_id_hint_reads_partial_payloads() {
        assert_eq!(scan_id_hint(br#"{"scan_id":"s-1","targets":"oops"}"#), "s-1");
        assert_eq!(scan_id_hint(b"not json"), "");
        assert_eq!(scan_id_hint(br#"{"scan_id":7}"#), "");
    }

    #[test]
    fn every_technique_has_a_default_route() {
        let routes = EventRoutes::from(&SubjectConfig::default());
        assert_eq!(routes.results[&TechniqueName::Whois], "whois-result");
        assert_eq!(routes.results[&TechniqueName::DnsLookup], "dns-lookup-result");
        assert_eq!(routes.results[&TechniqueName::Harvester], "harvester-result");
        assert_eq!(routes.scan_failed, "scan-failed");
    }

    #[tokio::test]
    async fn release_ignores_a_newer_scope_with_the_same_id() {
        let manager = ScanManager::new();
        let old = manager.register("scan").await.unwrap();
        assert!(manager.cancel("scan").await);
        assert!(old.token.is_cancelled());

        let new = manager.register("scan").await.unwrap();
        assert!(!manager.release(&old).await);
        assert_eq!(manager.len().await, 1);
        assert!(manager.release(&new).await);
        assert!(manager.is_empty().await);
    }
}
