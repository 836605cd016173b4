// src/main.rs

use std::sync::Arc;

use color_eyre::eyre::Result;
use futures::StreamExt;
use tracing::{info, warn};

use vanguard_recon::config::Config;
use vanguard_recon::core::bus::{EventBus, NatsEventBus};
use vanguard_recon::core::dispatcher::{Dispatcher, EventRoutes, ScanManager};
use vanguard_recon::core::handlers::ScanHandler;
use vanguard_recon::core::scanner::ReconEngine;
use vanguard_recon::core::scanner::dns_scanner::DnsScanner;
use vanguard_recon::core::scanner::harvester_scanner::HarvesterScanner;
use vanguard_recon::core::scanner::web_client::HttpWebClient;
use vanguard_recon::core::scanner::whois_scanner::WhoisScanner;
use vanguard_recon::logging::initialize_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Setup ---
    color_eyre::install()?;
    initialize_logging()?;

    let config = Config::from_env();
    info!(nats = %config.nats_url(), "Starting reconnaissance service.");

    let bus = Arc::new(NatsEventBus::connect(&config.nats_url()).await?);
    let web_client = Arc::new(HttpWebClient::new(config.harvester.http_timeout)?);

    let engines: Vec<Arc<dyn ReconEngine>> = vec![
        Arc::new(WhoisScanner::new(&config.whois)),
        Arc::new(DnsScanner::new(&config.dns)),
        Arc::new(HarvesterScanner::new(web_client, config.harvester.clone())),
    ];
    let handlers = engines.into_iter().map(ScanHandler::new).collect();

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&bus) as Arc<dyn EventBus>,
        Arc::new(ScanManager::new()),
        handlers,
        EventRoutes::from(&config.subjects),
    ));

    let mut started = bus.subscribe(&config.subjects.scan_started).await?;
    let mut cancelled = bus.subscribe(&config.subjects.scan_cancelled).await?;

    // --- Serve ---
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(message) = started.next() => {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    dispatcher.on_scan_started(&message.payload).await;
                });
            }
            Some(message) = cancelled.next() => {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    dispatcher.on_scan_cancelled(&message.payload).await;
                });
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
            else => {
                warn!("Event bus subscriptions closed.");
                break;
            }
        }
    }

    // --- Teardown ---
    if let Err(e) = bus.flush().await {
        warn!(error = %e, "Failed to flush pending events.");
    }
    info!(active_scans = dispatcher.manager().len().await, "Service stopped.");
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable.");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
