//! Configuration module for corewatch
//! All knobs come from environment variables with sensible defaults;
//! deployment tooling owns the file-to-env translation.

use std::time::Duration;

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::events::NfFamily;

/// Default detector poll interval when unset (seconds)
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Timeout for fail-fast outbound requests
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// One inbound NF event stream
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// host:port of the stream endpoint
    pub addr: String,
    /// Topic name; implies the source NF family
    pub topic: String,
}

impl StreamConfig {
    /// Derive the source family from the topic name.
    /// An unrecognized topic is a deployment mistake, not a runtime event.
    pub fn source_family(&self) -> AppResult<NfFamily> {
        match self.topic.as_str() {
            "core-events-smf" => Ok(NfFamily::Smf),
            "core-events-amf" => Ok(NfFamily::Amf),
            other => Err(AppError::new(
                ErrorCode::InvalidConfig,
                format!("invalid topic name [{}]", other),
            )),
        }
    }
}

/// Configuration for the corewatch process
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind address for the read API + metrics endpoint
    pub api_host: String,
    pub api_port: u16,

    /// Inbound NF event streams
    pub streams: Vec<StreamConfig>,

    /// Rogue-address detector endpoint (absent disables remediation)
    pub detector_url: Option<String>,
    /// Basic-auth credentials for the detector
    pub detector_user: Option<String>,
    pub detector_pass: Option<String>,
    /// Detector poll interval
    pub poll_interval: Duration,

    /// External directory (enterprise -> site -> SIM) base URL
    pub directory_url: Option<String>,

    /// Timeout for fail-fast outbound requests
    pub request_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl AppConfig {
    /// Build configuration from the process environment
    pub fn from_env() -> Self {
        let mut streams = Vec::new();
        if let Ok(addr) = std::env::var("SMF_STREAM_ADDR") {
            streams.push(StreamConfig {
                addr: addr.trim().to_string(),
                topic: std::env::var("SMF_STREAM_TOPIC")
                    .unwrap_or_else(|_| "core-events-smf".to_string()),
            });
        }
        if let Ok(addr) = std::env::var("AMF_STREAM_ADDR") {
            streams.push(StreamConfig {
                addr: addr.trim().to_string(),
                topic: std::env::var("AMF_STREAM_TOPIC")
                    .unwrap_or_else(|_| "core-events-amf".to_string()),
            });
        }

        let poll_secs = std::env::var("DETECTOR_POLL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&v| v > 0)
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

        Self {
            api_host: std::env::var("COREWATCH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: std::env::var("PORT")
                .or_else(|_| std::env::var("COREWATCH_PORT"))
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            streams,
            detector_url: std::env::var("DETECTOR_URL")
                .ok()
                .map(|u| u.trim().to_string()),
            detector_user: std::env::var("DETECTOR_USER").ok(),
            detector_pass: std::env::var("DETECTOR_PASS").ok(),
            poll_interval: Duration::from_secs(poll_secs),
            directory_url: std::env::var("DIRECTORY_URL")
                .ok()
                .map(|u| u.trim().trim_end_matches('/').to_string()),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Remediation runs only when both external peers are configured
    pub fn remediation_enabled(&self) -> bool {
        self.detector_url.is_some() && self.directory_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_family_from_topic() {
        let smf = StreamConfig {
            addr: "127.0.0.1:9561".to_string(),
            topic: "core-events-smf".to_string(),
        };
        assert_eq!(smf.source_family().unwrap(), NfFamily::Smf);

        let amf = StreamConfig {
            addr: "127.0.0.1:9562".to_string(),
            topic: "core-events-amf".to_string(),
        };
        assert_eq!(amf.source_family().unwrap(), NfFamily::Amf);
    }

    #[test]
    fn test_unknown_topic_rejected() {
        let bad = StreamConfig {
            addr: "127.0.0.1:9563".to_string(),
            topic: "core-events-upf".to_string(),
        };
        assert!(bad.source_family().is_err());
    }
}
