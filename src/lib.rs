//! Corewatch Library
//!
//! Real-time mobile-core telemetry aggregation with closed-loop rogue-IP
//! remediation:
//! - Per-NF event streams merged into a concurrent in-memory view
//!   (subscribers, NF liveness, service-message counters)
//! - Detector poll -> subscriber resolution -> directory SIM disable
//! - Snapshot read API and Prometheus export over the same store

pub mod api;
pub mod config;
pub mod detector;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod remediation;
pub mod sender;
pub mod store;

pub use config::{AppConfig, StreamConfig};
pub use detector::{DetectorPoller, RogueIps};
pub use dispatch::{ChannelEventSource, EventSource, TcpEventSource};
pub use errors::{AppError, AppResult, ErrorCode};
pub use events::{
    CoreSubscriber, EventKind, MetricEvent, MobilityState, NfFamily, NfStatusRecord,
    NfStatusState, SessionState, SubscriberOp,
};
pub use metrics::CoreMetrics;
pub use remediation::{DirectoryClient, RemediationOutcome, RemediationWorker};
pub use sender::HttpSender;
pub use store::MetricStore;
