//! Rogue-address detector poller
//!
//! One long-running task per detector endpoint. Each cycle fetches the
//! suspect-address list (retrying indefinitely with capped backoff), keeps
//! only syntactically well-formed IP literals, and pushes non-empty batches
//! onto the bounded queue shared with the remediation worker. A full queue
//! blocks the push, which is exactly the backpressure this loop wants.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::errors::ErrorCode;
use crate::sender::HttpSender;

/// One batch of suspect addresses as reported by the detector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RogueIps {
    #[serde(default)]
    pub ipaddresses: Vec<String>,
}

/// Drop entries that are not valid IP literals. Malformed input from the
/// detector is logged and skipped, never fatal.
pub fn validate_ips(raw: RogueIps) -> RogueIps {
    let mut valid = Vec::new();
    for ip in raw.ipaddresses {
        if ip.parse::<IpAddr>().is_ok() {
            valid.push(ip);
        } else {
            error!("detector reported invalid address [{}], discarded", ip);
        }
    }
    debug!("validated rogue addresses: {:?}", valid);
    RogueIps { ipaddresses: valid }
}

pub struct DetectorPoller {
    sender: HttpSender,
    url: String,
    credentials: Option<(String, Option<String>)>,
    poll_interval: Duration,
    tx: mpsc::Sender<RogueIps>,
    shutdown: watch::Receiver<bool>,
}

impl DetectorPoller {
    pub fn new(
        sender: HttpSender,
        url: impl Into<String>,
        user: Option<String>,
        pass: Option<String>,
        poll_interval: Duration,
        tx: mpsc::Sender<RogueIps>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sender,
            url: url.into(),
            credentials: user.map(|u| (u, pass)),
            poll_interval,
            tx,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!("detector poller started for [{}]", self.url);

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let mut builder = self.sender.client().get(self.url.as_str());
            if let Some((user, pass)) = &self.credentials {
                builder = builder.basic_auth(user, pass.as_deref());
            }
            let req = match builder.build() {
                Ok(req) => req,
                Err(err) => {
                    error!("detector request build failed, poller exiting: {}", err);
                    return;
                }
            };

            let rsp = match self.sender.send_with_backoff(req, &mut self.shutdown).await {
                Ok(rsp) => rsp,
                Err(err) if err.code == ErrorCode::Cancelled => break,
                Err(err) => {
                    error!("detector poll failed: {}", err);
                    if self.sleep_cycle().await {
                        break;
                    }
                    continue;
                }
            };

            match rsp.json::<RogueIps>().await {
                Ok(raw) => {
                    let batch = validate_ips(raw);
                    if batch.ipaddresses.is_empty() {
                        debug!("detector reported nothing actionable this cycle");
                    } else {
                        info!("received rogue addresses from detector: {:?}", batch.ipaddresses);
                        // Blocks while the queue is full; that backpressure
                        // also paces the poll loop.
                        if self.tx.send(batch).await.is_err() {
                            warn!("remediation queue closed, poller exiting");
                            return;
                        }
                    }
                }
                Err(err) => {
                    info!("detector response body empty or undecodable: {}", err);
                }
            }

            if self.sleep_cycle().await {
                break;
            }
        }

        info!("detector poller stopped");
    }

    /// Sleep one poll interval; true means shutdown fired
    async fn sleep_cycle(&mut self) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => false,
            _ = self.shutdown.changed() => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};

    #[test]
    fn test_validation_keeps_only_wellformed_addresses() {
        let raw = RogueIps {
            ipaddresses: vec![
                "10.0.0.1".to_string(),
                "not-an-ip".to_string(),
                "256.1.1.1".to_string(),
                "2001:db8::1".to_string(),
            ],
        };
        let valid = validate_ips(raw);
        assert_eq!(
            valid.ipaddresses,
            vec!["10.0.0.1".to_string(), "2001:db8::1".to_string()]
        );
    }

    #[test]
    fn test_validation_of_empty_batch() {
        assert!(validate_ips(RogueIps::default()).ipaddresses.is_empty());
    }

    #[tokio::test]
    async fn test_poller_forwards_validated_batches() {
        let router = Router::new().route(
            "/rogue",
            get(|| async {
                Json(RogueIps {
                    ipaddresses: vec!["10.0.0.1".to_string(), "bogus".to_string()],
                })
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let (tx, mut rx) = mpsc::channel(100);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poller = DetectorPoller::new(
            HttpSender::new(Duration::from_secs(2)).unwrap(),
            format!("http://{}/rogue", addr),
            None,
            None,
            Duration::from_secs(30),
            tx,
            shutdown_rx,
        );
        let handle = tokio::spawn(poller.run());

        let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("poller should produce a batch")
            .unwrap();
        assert_eq!(batch.ipaddresses, vec!["10.0.0.1".to_string()]);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
