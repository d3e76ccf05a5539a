//! API request handlers

use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::detector::{validate_ips, RogueIps};
use crate::events::NfFamily;
use crate::metrics::CoreMetrics;
use crate::store::MetricStore;

/// Shared application state
pub struct AppState {
    pub store: Arc<MetricStore>,
    pub metrics: Arc<CoreMetrics>,
    /// Present only when the remediation loop is running
    pub rogue_tx: Option<mpsc::Sender<RogueIps>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<MetricStore>,
        metrics: Arc<CoreMetrics>,
        rogue_tx: Option<mpsc::Sender<RogueIps>>,
    ) -> Self {
        Self {
            store,
            metrics,
            rogue_tx,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[derive(Serialize)]
pub struct HealthData {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub active_sessions: u64,
    pub timestamp: i64,
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({}))).into_response()
}

fn parse_family(raw: &str) -> Option<NfFamily> {
    match raw.to_ascii_uppercase().as_str() {
        "SMF" => Some(NfFamily::Smf),
        "AMF" => Some(NfFamily::Amf),
        "UPF" => Some(NfFamily::Upf),
        "GNB" => Some(NfFamily::Gnb),
        _ => None,
    }
}

// ============================================
// Health
// ============================================

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthData> {
    Json(HealthData {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        active_sessions: state.store.active_sessions(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

// ============================================
// Subscriber reads
// ============================================

pub async fn get_subscriber(
    State(state): State<Arc<AppState>>,
    Path(imsi): Path<String>,
) -> Response {
    match state.store.get_subscriber(&imsi) {
        Ok(sub) => Json(sub).into_response(),
        Err(err) => {
            warn!("get subscriber: {}", err);
            not_found()
        }
    }
}

pub async fn list_subscribers(State(state): State<Arc<AppState>>) -> Response {
    let imsis = state.store.subscriber_imsis();
    if imsis.is_empty() {
        return not_found();
    }
    Json(imsis).into_response()
}

// ============================================
// NF status reads
// ============================================

pub async fn nf_status_all(State(state): State<Arc<AppState>>) -> Response {
    let nfs = state.store.nf_status_all();
    if nfs.is_empty() {
        return not_found();
    }
    Json(nfs).into_response()
}

pub async fn nf_status_by_type(
    State(state): State<Arc<AppState>>,
    Path(nf_type): Path<String>,
) -> Response {
    let Some(family) = parse_family(&nf_type) else {
        return not_found();
    };
    let nfs = state.store.nf_status_by_type(family);
    if nfs.is_empty() {
        return not_found();
    }
    Json(nfs).into_response()
}

// ============================================
// Service statistics
// ============================================

pub async fn service_stats(
    State(state): State<Arc<AppState>>,
    Path(family): Path<String>,
) -> Response {
    let Some(family) = parse_family(&family) else {
        return not_found();
    };
    match state.store.service_stats(family) {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => {
            warn!("service stats: {}", err);
            not_found()
        }
    }
}

// ============================================
// Metrics endpoint
// ============================================

pub async fn metrics_text(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            error!("metrics encode failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ============================================
// Remediation test injection
// ============================================

/// Feed a batch into the remediation queue as if the detector had reported
/// it; used by operators to exercise the disable path end to end.
pub async fn push_test_rogue_ips(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RogueIps>,
) -> Response {
    let Some(tx) = &state.rogue_tx else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "remediation is not enabled"})),
        )
            .into_response();
    };

    let batch = validate_ips(raw);
    if batch.ipaddresses.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "no valid addresses in batch"})),
        )
            .into_response();
    }

    info!("test rogue addresses accepted: {:?}", batch.ipaddresses);
    match tx.try_send(batch) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "remediation queue full"})),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_router;
    use crate::events::{CoreSubscriber, NfStatusRecord, NfStatusState, SessionState};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state(rogue_tx: Option<mpsc::Sender<RogueIps>>) -> Arc<AppState> {
        let metrics = Arc::new(CoreMetrics::new().unwrap());
        let store = Arc::new(MetricStore::new(metrics.clone()));
        Arc::new(AppState::new(store, metrics, rogue_tx))
    }

    async fn get(router: axum::Router, uri: &str) -> (StatusCode, String) {
        let rsp = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = rsp.status();
        let body = axum::body::to_bytes(rsp.into_body(), 1 << 20).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_subscriber_roundtrip_and_404() {
        let state = test_state(None);
        let mut sub = CoreSubscriber::new("001");
        sub.ip_address = Some("10.0.0.1".to_string());
        sub.session_state = Some(SessionState::Connected);
        state.store.add_subscriber(&sub, NfFamily::Smf);

        let (status, body) = get(create_router(state.clone()), "/nmetric/subscriber/001").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("10.0.0.1"));

        let (status, body) = get(create_router(state), "/nmetric/subscriber/404").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "{}");
    }

    #[tokio::test]
    async fn test_empty_collections_answer_404() {
        let state = test_state(None);
        let (status, _) = get(create_router(state.clone()), "/nmetric/subscribers").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get(create_router(state), "/nmetric/nfstatus").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_nf_status_filtering() {
        let state = test_state(None);
        state.store.upsert_nf_status(NfStatusRecord {
            nf_type: NfFamily::Upf,
            nf_status: NfStatusState::Connected,
            nf_name: "upf-1".to_string(),
        });

        let (status, body) = get(create_router(state.clone()), "/nmetric/nfstatus/upf").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("upf-1"));

        let (status, _) = get(create_router(state.clone()), "/nmetric/nfstatus/gnb").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get(create_router(state), "/nmetric/nfstatus/bogus").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_service_stats_unknown_family() {
        let state = test_state(None);
        state
            .store
            .increment_service_stat(NfFamily::Smf, "smf-01", "msg")
            .unwrap();

        let (status, body) = get(create_router(state.clone()), "/nmetric/nfservicestats/smf").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("smf-01"));

        let (status, _) = get(create_router(state), "/nmetric/nfservicestats/upf").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_serves_text() {
        let state = test_state(None);
        state
            .store
            .increment_service_stat(NfFamily::Smf, "smf-01", "msg")
            .unwrap();
        let (status, body) = get(create_router(state), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("nf_svc_stats_total"));
    }

    #[tokio::test]
    async fn test_push_test_ips_validates_and_enqueues() {
        let (tx, mut rx) = mpsc::channel(100);
        let state = test_state(Some(tx));

        let rsp = create_router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/nmetric/test/rogueips")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"ipaddresses":["10.0.0.1","junk"]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(rsp.status(), StatusCode::ACCEPTED);

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.ipaddresses, vec!["10.0.0.1".to_string()]);

        // All-invalid batch is rejected outright
        let rsp = create_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/nmetric/test/rogueips")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"ipaddresses":["junk"]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(rsp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_push_test_ips_without_remediation() {
        let state = test_state(None);
        let rsp = create_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/nmetric/test/rogueips")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"ipaddresses":["10.0.0.1"]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(rsp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
