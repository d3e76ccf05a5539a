//! Outbound HTTP send primitives
//!
//! Two policies share one capped backoff schedule:
//! - fail-fast: exactly one attempt, classified success/failure, used for
//!   every directory call so one slow peer cannot stall the remediation
//!   chain past its timeout
//! - retry-with-backoff: loop until a success status, used only by the
//!   detector poll where the loop owns its own task and a transient outage
//!   must not terminate the process
//!
//! Success means status 200/201/202/204; everything else is an error for
//! both policies.

use std::time::Duration;

use reqwest::{Client, Request, Response, StatusCode};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::errors::{AppError, AppResult, ErrorCode};

/// Base retry interval (seconds)
const BACKOFF_BASE_SECS: u64 = 2;

/// Backoff ceiling (seconds)
const BACKOFF_CAP_SECS: u64 = 10;

/// Attempt-scaled, capped delay: floor(attempt * 2s * 1.5), clamped to 10s.
/// Attempts count from 1 and never reset within one send.
pub fn next_backoff_interval(attempt: u32) -> u64 {
    let next = (attempt as f64 * BACKOFF_BASE_SECS as f64 * 1.5) as u64;
    next.min(BACKOFF_CAP_SECS)
}

fn is_success(status: StatusCode) -> bool {
    matches!(status.as_u16(), 200 | 201 | 202 | 204)
}

/// Shared request-send primitive for the detector and directory peers
#[derive(Clone)]
pub struct HttpSender {
    client: Client,
}

impl HttpSender {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AppError::from)?;
        Ok(Self { client })
    }

    /// Request builder access so callers can attach paths, auth and bodies
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// One attempt, no retry. The caller decides what a failure means.
    pub async fn send_fail_fast(&self, req: Request) -> AppResult<Response> {
        let url = req.url().clone();
        let rsp = self.client.execute(req).await.map_err(|e| {
            warn!("http req send error to [{}]: {}", url, e);
            AppError::from(e)
        })?;

        let status = rsp.status();
        if is_success(status) {
            Ok(rsp)
        } else {
            // Dropping the response releases the connection; the body is
            // not read.
            warn!("http rsp error from [{}]: {}", url, status);
            Err(AppError::bad_status(status))
        }
    }

    /// Retry until a success status is observed or shutdown fires.
    ///
    /// The request body must be fully buffered so every attempt puts
    /// byte-identical bytes on the wire; a streaming body is rejected up
    /// front rather than silently truncated on the second attempt.
    pub async fn send_with_backoff(
        &self,
        req: Request,
        shutdown: &mut watch::Receiver<bool>,
    ) -> AppResult<Response> {
        if req.try_clone().is_none() {
            return Err(AppError::new(
                ErrorCode::UnclonableBody,
                "backoff send requires a buffered request body",
            ));
        }

        let url = req.url().clone();
        let mut attempt: u32 = 0;
        loop {
            if *shutdown.borrow() {
                return Err(AppError::cancelled());
            }

            // Checked non-None above; each clone reuses the same buffer.
            let Some(attempt_req) = req.try_clone() else {
                return Err(AppError::new(
                    ErrorCode::UnclonableBody,
                    "request became unclonable between attempts",
                ));
            };
            attempt += 1;

            match self.client.execute(attempt_req).await {
                Ok(rsp) if is_success(rsp.status()) => {
                    info!("successful response from [{}]: {}", url, rsp.status());
                    return Ok(rsp);
                }
                Ok(rsp) => {
                    let delay = next_backoff_interval(attempt);
                    warn!(
                        "http rsp error [{}] from [{}], retrying after {}s",
                        rsp.status(),
                        url,
                        delay
                    );
                    self.sleep_or_cancel(delay, shutdown).await?;
                }
                Err(err) => {
                    let delay = next_backoff_interval(attempt);
                    warn!(
                        "http req send error [{}] to [{}], retrying after {}s",
                        err, url, delay
                    );
                    self.sleep_or_cancel(delay, shutdown).await?;
                }
            }
        }
    }

    async fn sleep_or_cancel(
        &self,
        secs: u64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> AppResult<()> {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => Ok(()),
            // A closed channel counts as shutdown too
            _ = shutdown.changed() => Err(AppError::cancelled()),
        }
    }
}
