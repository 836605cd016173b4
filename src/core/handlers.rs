// src/core/handlers.rs

//! Per-technique adapters between a scan-started event and an engine.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::models::{ScanStartedEvent, ServiceResult, TechniqueName};
use crate::core::scanner::ReconEngine;
use crate::error::ReconError;

/// Runs one engine for a scan and reports exactly one `ServiceResult` on its stream.
#[derive(Clone)]
pub struct ScanHandler {
    engine: Arc<dyn ReconEngine>,
}

impl ScanHandler {
    pub fn new(engine: Arc<dyn ReconEngine>) -> Self {
        Self { engine }
    }

    pub fn technique(&self) -> TechniqueName {
        self.engine.technique()
    }

    /// Starts the technique in the background and returns its result stream.
    ///
    /// The stream yields one item and then closes. A scan without any domain target
    /// yields a `NoValidTargets` error and never reaches the engine.
    pub fn run_scan(
        &self,
        cancel: CancellationToken,
        event: Arc<ScanStartedEvent>,
    ) -> mpsc::Receiver<ServiceResult> {
        let (tx, rx) = mpsc::channel(1);
        let engine = Arc::clone(&self.engine);

        tokio::spawn(async move {
            let technique = engine.technique();
            let targets = event.domain_targets();

            let result = if targets.is_empty() {
                warn!(scan_id = %event.scan_id, %technique, "No valid targets in scan.");
                ServiceResult {
                    scan_id: event.scan_id.clone(),
                    technique,
                    results: Vec::new(),
                    error: Some(ReconError::NoValidTargets),
                }
            } else {
                info!(scan_id = %event.scan_id, %technique, targets = targets.len(), "Running technique.");
                let outcome = engine.run_scan(&cancel, &targets).await;
                let error = if cancel.is_cancelled() {
                    Some(ReconError::Cancelled)
                } else {
                    outcome.error
                };
                ServiceResult {
                    scan_id: event.scan_id.clone(),
                    technique,
                    results: outcome.results,
                    error,
                }
            };

            if tx.send(result).await.is_err() {
                warn!(scan_id = %event.scan_id, %technique, "Result stream closed before delivery.");
            }
        });

        rx
    }
}
