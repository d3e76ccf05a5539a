//! corewatch - mobile-core telemetry aggregator with rogue-IP remediation
//!
//! Environment:
//!   COREWATCH_HOST / COREWATCH_PORT  - read API bind address (default 0.0.0.0:8080)
//!   SMF_STREAM_ADDR / AMF_STREAM_ADDR - NF event stream endpoints
//!   DETECTOR_URL, DETECTOR_USER, DETECTOR_PASS, DETECTOR_POLL_SECS
//!   DIRECTORY_URL                     - enterprise/site/SIM directory

use std::net::SocketAddr;
use std::sync::Arc;

use corewatch::api::{create_router, AppState};
use corewatch::{
    AppConfig, CoreMetrics, DetectorPoller, DirectoryClient, HttpSender, MetricStore,
    RemediationWorker, TcpEventSource,
};
use eyre::Result;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Capacity of the detector -> remediation queue
const ROGUE_QUEUE_CAPACITY: usize = 100;

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    let config = AppConfig::from_env();
    info!("corewatch v{} starting", env!("CARGO_PKG_VERSION"));

    let metrics = Arc::new(CoreMetrics::new()?);
    let store = Arc::new(MetricStore::new(metrics.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // One dispatch task per configured NF stream
    if config.streams.is_empty() {
        warn!("no NF streams configured; the store will stay empty");
    }
    for stream in &config.streams {
        let family = stream.source_family()?;
        let source = TcpEventSource::new(stream.addr.clone(), stream.topic.clone());
        corewatch::dispatch::spawn_dispatcher(store.clone(), source, family);
        info!(
            "stream [{}] at [{}] dispatching as [{}]",
            stream.topic, stream.addr, family
        );
    }

    // Detector poller + remediation worker, when both peers are configured
    let rogue_tx = match (config.detector_url.clone(), config.directory_url.clone()) {
        (Some(detector_url), Some(directory_url)) => {
            let (tx, rx) = mpsc::channel(ROGUE_QUEUE_CAPACITY);
            let sender = HttpSender::new(config.request_timeout)?;

            let poller = DetectorPoller::new(
                sender.clone(),
                detector_url,
                config.detector_user.clone(),
                config.detector_pass.clone(),
                config.poll_interval,
                tx.clone(),
                shutdown_rx.clone(),
            );
            tokio::spawn(poller.run());

            let worker = RemediationWorker::new(
                store.clone(),
                metrics.clone(),
                DirectoryClient::new(sender, directory_url),
                rx,
            );
            tokio::spawn(worker.run());

            info!(
                "remediation loop enabled (poll interval {}s)",
                config.poll_interval.as_secs()
            );
            Some(tx)
        }
        _ => {
            info!("remediation loop disabled: detector/directory not configured");
            None
        }
    };

    // Read API + metrics endpoint
    let state = Arc::new(AppState::new(store, metrics, rogue_tx));
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.api_host, config.api_port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("corewatch API listening on http://{}", addr);
    info!("  GET  /nmetric/subscriber/:imsi");
    info!("  GET  /nmetric/subscribers");
    info!("  GET  /nmetric/nfstatus[/:type]");
    info!("  GET  /nmetric/nfservicestats/:family");
    info!("  POST /nmetric/test/rogueips");
    info!("  GET  /metrics");
    info!("  GET  /health");

    let shutdown_signal = async move {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("failed to install ctrl-c handler; running until killed");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("corewatch shutdown complete");
    Ok(())
}
