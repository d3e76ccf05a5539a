//! Prometheus export hooks driven by store mutations
//!
//! Metric families:
//! - `core_subscriber`: one labeled series per live subscriber, set on every
//!   observation and retired on delete
//! - `subscriber_events_total`: create/delete event counter
//! - `active_sessions`: gauge tracking the live subscriber count
//! - `nf_status`: per-NF up/down gauge
//! - `nf_svc_stats_total`: per (family, instance, message-type) counter
//! - `remediation_outcomes_total`: terminal state of each remediation attempt
//!
//! The registry is owned, not global; the store and the API server get the
//! same `Arc<CoreMetrics>` at startup.

use prometheus::{Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::events::{CoreSubscriber, NfFamily, NfStatusRecord, NfStatusState};

pub struct CoreMetrics {
    registry: Registry,
    core_subscriber: IntGaugeVec,
    subscriber_events: IntCounterVec,
    active_sessions: IntGauge,
    nf_status: IntGaugeVec,
    nf_svc_stats: IntCounterVec,
    remediation_outcomes: IntCounterVec,
}

impl CoreMetrics {
    pub fn new() -> AppResult<Self> {
        let registry = Registry::new();

        let core_subscriber = IntGaugeVec::new(
            Opts::new("core_subscriber", "core subscriber info"),
            &["imsi", "ip_addr", "state", "dnn", "slice", "upf"],
        )
        .map_err(reg_err)?;

        let subscriber_events = IntCounterVec::new(
            Opts::new("subscriber_events_total", "subscriber create/delete events"),
            &["op"],
        )
        .map_err(reg_err)?;

        let active_sessions = IntGauge::new(
            "active_sessions",
            "number of subscriber sessions currently in the core",
        )
        .map_err(reg_err)?;

        let nf_status = IntGaugeVec::new(
            Opts::new("nf_status", "NF liveness up/down"),
            &["nf_name", "nf_type"],
        )
        .map_err(reg_err)?;

        let nf_svc_stats = IntCounterVec::new(
            Opts::new("nf_svc_stats_total", "inter-NF service message counters"),
            &["family", "instance", "msg_type"],
        )
        .map_err(reg_err)?;

        let remediation_outcomes = IntCounterVec::new(
            Opts::new(
                "remediation_outcomes_total",
                "terminal outcome of rogue-address remediation attempts",
            ),
            &["outcome"],
        )
        .map_err(reg_err)?;

        for collector in [
            Box::new(core_subscriber.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(subscriber_events.clone()),
            Box::new(active_sessions.clone()),
            Box::new(nf_status.clone()),
            Box::new(nf_svc_stats.clone()),
            Box::new(remediation_outcomes.clone()),
        ] {
            registry.register(collector).map_err(reg_err)?;
        }

        Ok(Self {
            registry,
            core_subscriber,
            subscriber_events,
            active_sessions,
            nf_status,
            nf_svc_stats,
            remediation_outcomes,
        })
    }

    /// Publish the current view of one subscriber, retiring the previously
    /// published series when its labels changed.
    pub fn observe_subscriber(&self, prev: Option<&CoreSubscriber>, current: &CoreSubscriber) {
        if let Some(prev) = prev {
            let _ = self
                .core_subscriber
                .remove_label_values(&subscriber_labels(prev));
        }
        self.core_subscriber
            .with_label_values(&subscriber_labels(current))
            .set(1);
    }

    /// Retire one subscriber's series after the final observation
    pub fn retire_subscriber(&self, sub: &CoreSubscriber) {
        let _ = self
            .core_subscriber
            .remove_label_values(&subscriber_labels(sub));
    }

    pub fn inc_subscriber_created(&self) {
        self.subscriber_events.with_label_values(&["created"]).inc();
    }

    pub fn inc_subscriber_deleted(&self) {
        self.subscriber_events.with_label_values(&["deleted"]).inc();
    }

    pub fn set_active_sessions(&self, count: u64) {
        self.active_sessions.set(count as i64);
    }

    /// Forward a liveness report as a binary up/down indicator
    pub fn set_nf_status(&self, record: &NfStatusRecord) {
        let up = match record.nf_status {
            NfStatusState::Connected => 1,
            NfStatusState::Disconnected => 0,
        };
        self.nf_status
            .with_label_values(&[&record.nf_name, record.nf_type.as_str()])
            .set(up);
    }

    pub fn inc_service_stat(&self, family: NfFamily, instance: &str, msg_type: &str) {
        self.nf_svc_stats
            .with_label_values(&[family.as_str(), instance, msg_type])
            .inc();
    }

    pub fn inc_remediation_outcome(&self, outcome: &str) {
        self.remediation_outcomes
            .with_label_values(&[outcome])
            .inc();
    }

    /// Encode the registry in Prometheus text format for the /metrics route
    pub fn encode(&self) -> AppResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(reg_err)?;
        String::from_utf8(buffer)
            .map_err(|e| AppError::new(ErrorCode::MetricsInit, format!("non-utf8 encoding: {e}")))
    }
}

fn reg_err(err: prometheus::Error) -> AppError {
    AppError::with_source(ErrorCode::MetricsInit, "prometheus registry error", err)
}

fn subscriber_labels(sub: &CoreSubscriber) -> [&str; 6] {
    let state = match sub.session_state {
        Some(crate::events::SessionState::Connected) => "Connected",
        Some(crate::events::SessionState::Idle) => "Idle",
        Some(crate::events::SessionState::Disconnected) => "DisConnected",
        None => "",
    };
    [
        &sub.imsi,
        sub.ip_address.as_deref().unwrap_or(""),
        state,
        sub.dnn.as_deref().unwrap_or(""),
        sub.slice.as_deref().unwrap_or(""),
        sub.upf_name.as_deref().unwrap_or(""),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SessionState;

    fn sub(imsi: &str, ip: Option<&str>) -> CoreSubscriber {
        let mut s = CoreSubscriber::new(imsi);
        s.ip_address = ip.map(String::from);
        s.session_state = Some(SessionState::Connected);
        s
    }

    #[test]
    fn test_observe_and_retire_subscriber() {
        let metrics = CoreMetrics::new().unwrap();
        let s = sub("001", Some("10.0.0.1"));

        metrics.observe_subscriber(None, &s);
        let text = metrics.encode().unwrap();
        assert!(text.contains("core_subscriber"));
        assert!(text.contains("imsi=\"001\""));

        metrics.retire_subscriber(&s);
        let text = metrics.encode().unwrap();
        assert!(!text.contains("imsi=\"001\""));
    }

    #[test]
    fn test_label_change_retires_old_series() {
        let metrics = CoreMetrics::new().unwrap();
        let before = sub("001", None);
        let after = sub("001", Some("10.0.0.9"));

        metrics.observe_subscriber(None, &before);
        metrics.observe_subscriber(Some(&before), &after);

        let text = metrics.encode().unwrap();
        assert!(text.contains("ip_addr=\"10.0.0.9\""));
        assert_eq!(text.matches("imsi=\"001\"").count(), 1);
    }

    #[test]
    fn test_active_sessions_gauge() {
        let metrics = CoreMetrics::new().unwrap();
        metrics.set_active_sessions(3);
        assert!(metrics.encode().unwrap().contains("active_sessions 3"));
    }

    #[test]
    fn test_service_stat_counter() {
        let metrics = CoreMetrics::new().unwrap();
        metrics.inc_service_stat(NfFamily::Smf, "smf-01", "smf_pdu_sess_create_req");
        metrics.inc_service_stat(NfFamily::Smf, "smf-01", "smf_pdu_sess_create_req");
        let text = metrics.encode().unwrap();
        assert!(text.contains("nf_svc_stats_total"));
        assert!(text.contains("} 2"));
    }
}
