//! Integration tests for corewatch
//!
//! External peers (detector, directory) are in-process axum servers on
//! ephemeral ports; event streams are fed through the channel source.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use corewatch::{
    ChannelEventSource, CoreMetrics, CoreSubscriber, DirectoryClient, HttpSender, MetricStore,
    NfFamily, RemediationWorker, RogueIps, SessionState,
};

/// Recorded disable POSTs: (path, body)
type PostLog = Arc<Mutex<Vec<(String, Value)>>>;

#[derive(Clone)]
struct MockDirectory {
    targets: Value,
    /// Per-enterprise site answer; Err is an HTTP status to return
    sites: Arc<HashMap<String, Result<Value, u16>>>,
    posts: PostLog,
}

async fn serve_directory(mock: MockDirectory) -> String {
    async fn targets(State(mock): State<MockDirectory>) -> Json<Value> {
        Json(mock.targets.clone())
    }

    async fn sites(State(mock): State<MockDirectory>, Path(enterprise): Path<String>) -> Response {
        match mock.sites.get(&enterprise) {
            Some(Ok(body)) => Json(body.clone()).into_response(),
            Some(Err(status)) => StatusCode::from_u16(*status).unwrap().into_response(),
            None => Json(json!([])).into_response(),
        }
    }

    async fn disable(
        State(mock): State<MockDirectory>,
        Path((enterprise, site_id, sim_id)): Path<(String, String, String)>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        mock.posts.lock().unwrap().push((
            format!("/{enterprise}/site/{site_id}/sim-card/{sim_id}"),
            body,
        ));
        StatusCode::OK
    }

    let router = Router::new()
        .route("/targets", get(targets))
        .route("/:enterprise/site", get(sites))
        .route("/:enterprise/site/:site_id/sim-card/:sim_id", post(disable))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn store_with_subscriber(imsi: &str, ip: &str) -> (Arc<MetricStore>, Arc<CoreMetrics>) {
    let metrics = Arc::new(CoreMetrics::new().unwrap());
    let store = Arc::new(MetricStore::new(metrics.clone()));
    let mut sub = CoreSubscriber::new(imsi);
    sub.ip_address = Some(ip.to_string());
    sub.session_state = Some(SessionState::Connected);
    store.add_subscriber(&sub, NfFamily::Smf);
    (store, metrics)
}

fn sim_entry(sim_id: &str, imsi: &str) -> Value {
    json!({"sim-id": sim_id, "imsi": imsi, "display-name": sim_id, "enable": true})
}

/// Run one batch through a remediation worker and wait for it to drain
async fn remediate_batch(
    store: Arc<MetricStore>,
    metrics: Arc<CoreMetrics>,
    directory_url: String,
    ips: Vec<&str>,
) {
    let (tx, rx) = mpsc::channel(100);
    let sender = HttpSender::new(Duration::from_secs(2)).unwrap();
    let worker = RemediationWorker::new(
        store,
        metrics,
        DirectoryClient::new(sender, directory_url),
        rx,
    );
    let handle = tokio::spawn(worker.run());

    tx.send(RogueIps {
        ipaddresses: ips.into_iter().map(String::from).collect(),
    })
    .await
    .unwrap();
    drop(tx);
    handle.await.unwrap();
}

#[tokio::test]
async fn only_first_matching_sim_is_disabled() {
    let (store, metrics) = store_with_subscriber("001010123456789", "10.0.0.1");

    // Two sites both hold a SIM for the subscriber (prefixed and bare)
    let posts: PostLog = Arc::new(Mutex::new(Vec::new()));
    let sites = json!([
        {"site-id": "site-a", "sim-card": [
            sim_entry("sim-1", "imsi-999999999999999"),
            sim_entry("sim-2", "imsi-001010123456789"),
        ]},
        {"site-id": "site-b", "sim-card": [sim_entry("sim-3", "001010123456789")]},
    ]);
    let base = serve_directory(MockDirectory {
        targets: json!([{"name": "acme"}]),
        sites: Arc::new(HashMap::from([("acme".to_string(), Ok(sites))])),
        posts: posts.clone(),
    })
    .await;

    remediate_batch(store, metrics, base, vec!["10.0.0.1"]).await;

    let posts = posts.lock().unwrap();
    assert_eq!(posts.len(), 1, "exactly one disable POST expected");
    let (path, body) = &posts[0];
    assert_eq!(path, "/acme/site/site-a/sim-card/sim-2");
    assert_eq!(body["enable"], json!(false));
    assert_eq!(body["sim-id"], json!("sim-2"));
}

#[tokio::test]
async fn empty_target_list_issues_no_disable() {
    let (store, metrics) = store_with_subscriber("001", "10.0.0.1");

    let posts: PostLog = Arc::new(Mutex::new(Vec::new()));
    let base = serve_directory(MockDirectory {
        targets: json!([]),
        sites: Arc::new(HashMap::new()),
        posts: posts.clone(),
    })
    .await;

    remediate_batch(store, metrics, base, vec!["10.0.0.1"]).await;
    assert!(posts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_address_is_skipped_and_batch_continues() {
    let (store, metrics) = store_with_subscriber("001", "10.0.0.2");

    let posts: PostLog = Arc::new(Mutex::new(Vec::new()));
    let sites = json!([{"site-id": "site-a", "sim-card": [sim_entry("sim-1", "001")]}]);
    let base = serve_directory(MockDirectory {
        targets: json!([{"name": "acme"}]),
        sites: Arc::new(HashMap::from([("acme".to_string(), Ok(sites))])),
        posts: posts.clone(),
    })
    .await;

    // First address resolves to nothing; the second must still be handled
    remediate_batch(store, metrics, base, vec!["10.9.9.9", "10.0.0.2"]).await;

    let posts = posts.lock().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].0, "/acme/site/site-a/sim-card/sim-1");
}

#[tokio::test]
async fn failing_target_does_not_mask_the_next() {
    let (store, metrics) = store_with_subscriber("001", "10.0.0.1");

    let posts: PostLog = Arc::new(Mutex::new(Vec::new()));
    let sites_b = json!([{"site-id": "site-b", "sim-card": [sim_entry("sim-9", "imsi-001")]}]);
    let base = serve_directory(MockDirectory {
        targets: json!([{"name": "broken"}, {"name": "acme"}]),
        sites: Arc::new(HashMap::from([
            ("broken".to_string(), Err(500)),
            ("acme".to_string(), Ok(sites_b)),
        ])),
        posts: posts.clone(),
    })
    .await;

    remediate_batch(store, metrics, base, vec!["10.0.0.1"]).await;

    let posts = posts.lock().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].0, "/acme/site/site-b/sim-card/sim-9");
}

#[tokio::test]
async fn detector_to_disable_end_to_end() {
    // Detector answers one batch with a malformed entry mixed in
    let detector_router = Router::new().route(
        "/rogue",
        get(|| async { Json(json!({"ipaddresses": ["10.0.0.1", "not-an-ip"]})) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let detector_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, detector_router).await.unwrap();
    });

    let (store, metrics) = store_with_subscriber("001010123456789", "10.0.0.1");
    let posts: PostLog = Arc::new(Mutex::new(Vec::new()));
    let sites = json!([{"site-id": "site-a", "sim-card": [sim_entry("sim-2", "imsi-001010123456789")]}]);
    let directory_url = serve_directory(MockDirectory {
        targets: json!([{"name": "acme"}]),
        sites: Arc::new(HashMap::from([("acme".to_string(), Ok(sites))])),
        posts: posts.clone(),
    })
    .await;

    let (tx, rx) = mpsc::channel(100);
    let sender = HttpSender::new(Duration::from_secs(2)).unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let poller = corewatch::DetectorPoller::new(
        sender.clone(),
        format!("http://{}/rogue", detector_addr),
        None,
        None,
        Duration::from_secs(60),
        tx,
        shutdown_rx,
    );
    tokio::spawn(poller.run());

    let worker = RemediationWorker::new(
        store,
        metrics,
        DirectoryClient::new(sender, directory_url),
        rx,
    );
    tokio::spawn(worker.run());

    // Wait for the single valid address to flow through both tasks
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if posts.lock().unwrap().len() == 1 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "disable POST never arrived"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let recorded = posts.lock().unwrap().clone();
    assert_eq!(recorded[0].0, "/acme/site/site-a/sim-card/sim-2");
    assert_eq!(recorded[0].1["enable"], json!(false));

    shutdown_tx.send(true).unwrap();
}

#[tokio::test]
async fn events_from_both_families_build_one_record() {
    let metrics = Arc::new(CoreMetrics::new().unwrap());
    let store = Arc::new(MetricStore::new(metrics));

    let (smf_tx, smf_rx) = mpsc::channel(8);
    let (amf_tx, amf_rx) = mpsc::channel(8);
    let smf = corewatch::dispatch::spawn_dispatcher(
        store.clone(),
        ChannelEventSource::new("core-events-smf", smf_rx),
        NfFamily::Smf,
    );
    let amf = corewatch::dispatch::spawn_dispatcher(
        store.clone(),
        ChannelEventSource::new("core-events-amf", amf_rx),
        NfFamily::Amf,
    );

    smf_tx
        .send(
            json!({
                "eventType": 0,
                "subscriberData": {
                    "subscriber": {
                        "imsi": "001",
                        "ipaddress": "10.0.0.1",
                        "smfSubState": "Connected"
                    },
                    "subsOp": 1
                }
            })
            .to_string()
            .into_bytes(),
        )
        .await
        .unwrap();
    amf_tx
        .send(
            json!({
                "eventType": 0,
                "subscriberData": {
                    "subscriber": {
                        "imsi": "001",
                        "amfId": "amf-1",
                        "amfSubState": "RegisteredC"
                    },
                    "subsOp": 1
                }
            })
            .to_string()
            .into_bytes(),
        )
        .await
        .unwrap();

    drop(smf_tx);
    drop(amf_tx);
    smf.await.unwrap();
    amf.await.unwrap();

    let sub = store.get_subscriber("001").unwrap();
    assert_eq!(sub.ip_address.as_deref(), Some("10.0.0.1"));
    assert_eq!(sub.amf_id.as_deref(), Some("amf-1"));
    assert_eq!(store.active_sessions(), 1);
}
