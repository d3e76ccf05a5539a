//! Closed-loop remediation: rogue address -> subscriber -> SIM disable
//!
//! One worker drains the batch queue filled by the detector poller. Every
//! address is handled independently; any lookup failure abandons that
//! address only, and an abandoned address is retried only if the detector
//! reports it again on a later cycle. All directory traffic is fail-fast:
//! there is no retry and no compensating action past the disable POST.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::detector::RogueIps;
use crate::errors::AppResult;
use crate::metrics::CoreMetrics;
use crate::sender::HttpSender;
use crate::store::MetricStore;

/// One enterprise known to the external directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "name")]
    pub enterprise_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimCard {
    #[serde(rename = "sim-id")]
    pub sim_id: String,
    #[serde(default)]
    pub imsi: String,
    #[serde(rename = "display-name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteInfo {
    #[serde(rename = "site-id")]
    pub site_id: String,
    #[serde(rename = "sim-card", default)]
    pub sim_cards: Vec<SimCard>,
}

/// SIM identities may carry an `imsi-` prefix the core never uses
pub fn normalize_imsi(imsi: &str) -> &str {
    imsi.strip_prefix("imsi-").unwrap_or(imsi)
}

/// First SIM whose normalized identity matches, in site order then SIM
/// order within a site. Returns the owning site id alongside the SIM.
pub fn find_matching_sim(sites: &[SiteInfo], imsi: &str) -> Option<(String, SimCard)> {
    let wanted = normalize_imsi(imsi);
    for site in sites {
        for sim in &site.sim_cards {
            if normalize_imsi(&sim.imsi) == wanted {
                return Some((site.site_id.clone(), sim.clone()));
            }
        }
    }
    None
}

/// Where an abandoned remediation gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonStage {
    SubscriberLookup,
    TargetFetch,
    SimSearch,
    DisablePost,
}

/// Terminal state of one address's remediation chain
#[derive(Debug, Clone, PartialEq)]
pub enum RemediationOutcome {
    Disabled {
        imsi: String,
        site_id: String,
        sim_id: String,
    },
    Abandoned {
        stage: AbandonStage,
    },
}

impl RemediationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disabled { .. } => "disabled",
            Self::Abandoned { stage } => match stage {
                AbandonStage::SubscriberLookup => "no_subscriber",
                AbandonStage::TargetFetch => "no_targets",
                AbandonStage::SimSearch => "no_sim_match",
                AbandonStage::DisablePost => "disable_failed",
            },
        }
    }
}

/// Fail-fast client for the enterprise -> site -> SIM directory
pub struct DirectoryClient {
    sender: HttpSender,
    base_url: String,
}

impl DirectoryClient {
    pub fn new(sender: HttpSender, base_url: impl Into<String>) -> Self {
        Self {
            sender,
            base_url: base_url.into(),
        }
    }

    pub async fn get_targets(&self) -> AppResult<Vec<Target>> {
        let req = self
            .sender
            .client()
            .get(format!("{}/targets", self.base_url))
            .build()?;
        let rsp = self.sender.send_fail_fast(req).await?;
        Ok(rsp.json().await?)
    }

    pub async fn get_sites(&self, enterprise: &str) -> AppResult<Vec<SiteInfo>> {
        let req = self
            .sender
            .client()
            .get(format!("{}/{}/site", self.base_url, enterprise))
            .build()?;
        let rsp = self.sender.send_fail_fast(req).await?;
        Ok(rsp.json().await?)
    }

    pub async fn disable_sim(
        &self,
        enterprise: &str,
        site_id: &str,
        sim: &SimCard,
    ) -> AppResult<()> {
        let url = format!(
            "{}/{}/site/{}/sim-card/{}",
            self.base_url, enterprise, site_id, sim.sim_id
        );
        let req = self.sender.client().post(url).json(sim).build()?;
        self.sender.send_fail_fast(req).await?;
        Ok(())
    }
}

pub struct RemediationWorker {
    store: Arc<MetricStore>,
    metrics: Arc<CoreMetrics>,
    directory: DirectoryClient,
    rx: mpsc::Receiver<RogueIps>,
}

impl RemediationWorker {
    pub fn new(
        store: Arc<MetricStore>,
        metrics: Arc<CoreMetrics>,
        directory: DirectoryClient,
        rx: mpsc::Receiver<RogueIps>,
    ) -> Self {
        Self {
            store,
            metrics,
            directory,
            rx,
        }
    }

    pub async fn run(mut self) {
        info!("remediation worker started");
        while let Some(batch) = self.rx.recv().await {
            for ip in &batch.ipaddresses {
                let outcome = self.remediate(ip).await;
                self.metrics.inc_remediation_outcome(outcome.label());
                if let RemediationOutcome::Disabled {
                    imsi,
                    site_id,
                    sim_id,
                } = &outcome
                {
                    info!(
                        "disabled sim [{}] in site [{}] for imsi [{}] (rogue address [{}])",
                        sim_id, site_id, imsi, ip
                    );
                }
            }
        }
        info!("remediation worker stopped: queue closed");
    }

    /// Resolve and disable one address; every exit path is terminal for
    /// this address and non-fatal for the batch.
    async fn remediate(&self, ip: &str) -> RemediationOutcome {
        let subscriber = match self.store.find_subscriber_by_ip(ip) {
            Ok(sub) => sub,
            Err(err) => {
                // The session may simply be gone already; nothing to retry.
                warn!("no subscriber for rogue address [{}]: {}", ip, err);
                return RemediationOutcome::Abandoned {
                    stage: AbandonStage::SubscriberLookup,
                };
            }
        };
        info!(
            "rogue address [{}] resolved to subscriber imsi [{}]",
            ip, subscriber.imsi
        );

        let targets = match self.directory.get_targets().await {
            Ok(targets) => targets,
            Err(err) => {
                warn!("target fetch failed: {}", err);
                return RemediationOutcome::Abandoned {
                    stage: AbandonStage::TargetFetch,
                };
            }
        };
        if targets.is_empty() {
            warn!("directory returned no targets");
            return RemediationOutcome::Abandoned {
                stage: AbandonStage::TargetFetch,
            };
        }

        for target in &targets {
            let sites = match self.directory.get_sites(&target.enterprise_id).await {
                Ok(sites) => sites,
                Err(err) => {
                    // One unreachable enterprise must not mask the others
                    warn!(
                        "site fetch failed for target [{}]: {}",
                        target.enterprise_id, err
                    );
                    continue;
                }
            };

            if let Some((site_id, mut sim)) = find_matching_sim(&sites, &subscriber.imsi) {
                info!(
                    "sim [{}] details found in site [{}]",
                    sim.sim_id, site_id
                );
                sim.enable = Some(false);
                return match self
                    .directory
                    .disable_sim(&target.enterprise_id, &site_id, &sim)
                    .await
                {
                    Ok(()) => RemediationOutcome::Disabled {
                        imsi: subscriber.imsi,
                        site_id,
                        sim_id: sim.sim_id,
                    },
                    Err(err) => {
                        error!("disable post for sim [{}] failed: {}", sim.sim_id, err);
                        RemediationOutcome::Abandoned {
                            stage: AbandonStage::DisablePost,
                        }
                    }
                };
            }
        }

        warn!(
            "imsi [{}] not found in any target site",
            subscriber.imsi
        );
        RemediationOutcome::Abandoned {
            stage: AbandonStage::SimSearch,
        }
    }
}
