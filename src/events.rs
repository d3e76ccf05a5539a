//! Wire model for the NF event streams
//!
//! Every network function publishes the same JSON envelope (`MetricEvent`)
//! onto its own stream; the envelope is discriminated by an integer
//! `eventType` plus the per-kind payload section. Discriminants are decoded
//! once here into closed enums so the dispatcher can match exhaustively
//! instead of string-switching.
//!
//! Field presence matters: an absent field means "not reported by this NF",
//! so everything except the IMSI key is `Option`. A present zero (e.g.
//! `tmsi: 0`) is a legal value and is kept distinct from "absent".

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{AppError, AppResult};

/// Network-function family, also used to tag which stream an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NfFamily {
    #[serde(rename = "SMF")]
    Smf,
    #[serde(rename = "AMF")]
    Amf,
    #[serde(rename = "UPF")]
    Upf,
    #[serde(rename = "GNB")]
    Gnb,
}

impl NfFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Smf => "SMF",
            Self::Amf => "AMF",
            Self::Upf => "UPF",
            Self::Gnb => "GNB",
        }
    }
}

impl fmt::Display for NfFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session state reported by the session-management function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Connected,
    Idle,
    #[serde(rename = "DisConnected")]
    Disconnected,
}

/// Mobility state reported by the mobility-management function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MobilityState {
    #[serde(rename = "RegisteredC")]
    RegisteredConnected,
    #[serde(rename = "RegisteredI")]
    RegisteredIdle,
    #[serde(rename = "DeRegistered")]
    Deregistered,
    Deleted,
}

/// Liveness state of a network function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NfStatusState {
    Connected,
    Disconnected,
}

/// One subscriber as reported on the wire; partial by design.
///
/// SMF and AMF each contribute their own slice of fields. The store merges
/// by presence, so producers only serialize what they actually know.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreSubscriber {
    /// Permanent identity, the cache key
    #[serde(default)]
    pub imsi: String,

    // Session-function fields
    #[serde(rename = "smfId", skip_serializing_if = "Option::is_none")]
    pub smf_id: Option<String>,
    #[serde(rename = "smfIp", skip_serializing_if = "Option::is_none")]
    pub smf_ip: Option<String>,
    #[serde(rename = "smfSubState", skip_serializing_if = "Option::is_none")]
    pub session_state: Option<SessionState>,
    #[serde(rename = "ipaddress", skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dnn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slice: Option<String>,
    #[serde(rename = "upfid", skip_serializing_if = "Option::is_none")]
    pub upf_name: Option<String>,
    #[serde(rename = "upfAddr", skip_serializing_if = "Option::is_none")]
    pub upf_addr: Option<String>,

    // Mobility-function fields
    #[serde(rename = "amfId", skip_serializing_if = "Option::is_none")]
    pub amf_id: Option<String>,
    #[serde(rename = "amfIp", skip_serializing_if = "Option::is_none")]
    pub amf_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guti: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmsi: Option<u32>,
    #[serde(rename = "amfngapId", skip_serializing_if = "Option::is_none")]
    pub amf_ngap_id: Option<i64>,
    #[serde(rename = "ranngapId", skip_serializing_if = "Option::is_none")]
    pub ran_ngap_id: Option<i64>,
    #[serde(rename = "gnbid", skip_serializing_if = "Option::is_none")]
    pub gnb_id: Option<String>,
    #[serde(rename = "tacid", skip_serializing_if = "Option::is_none")]
    pub tac_id: Option<String>,
    #[serde(rename = "amfSubState", skip_serializing_if = "Option::is_none")]
    pub mobility_state: Option<MobilityState>,
}

impl CoreSubscriber {
    pub fn new(imsi: impl Into<String>) -> Self {
        Self {
            imsi: imsi.into(),
            ..Default::default()
        }
    }
}

/// Subscriber lifecycle operation carried alongside the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SubscriberOp {
    Add = 1,
    Mod = 2,
    Del = 3,
}

impl TryFrom<u8> for SubscriberOp {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Add),
            2 => Ok(Self::Mod),
            3 => Ok(Self::Del),
            other => Err(format!("unknown subscriber operation [{}]", other)),
        }
    }
}

impl From<SubscriberOp> for u8 {
    fn from(op: SubscriberOp) -> u8 {
        op as u8
    }
}

/// Envelope discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EventKind {
    Subscriber = 0,
    ServiceMessage = 1,
    NfStatus = 2,
}

impl TryFrom<u8> for EventKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Subscriber),
            1 => Ok(Self::ServiceMessage),
            2 => Ok(Self::NfStatus),
            other => Err(format!("unknown event type [{}]", other)),
        }
    }
}

impl From<EventKind> for u8 {
    fn from(kind: EventKind) -> u8 {
        kind as u8
    }
}

/// Subscriber section of the envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberEventData {
    pub subscriber: CoreSubscriber,
    #[serde(rename = "subsOp")]
    pub op: SubscriberOp,
}

/// Inter-function message counter sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreMsgType {
    #[serde(rename = "msgType")]
    pub msg_type: String,
    #[serde(rename = "sourceNfId")]
    pub source_nf_id: String,
}

/// Liveness report for one network function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NfStatusRecord {
    #[serde(rename = "nfType")]
    pub nf_type: NfFamily,
    #[serde(rename = "nfStatus")]
    pub nf_status: NfStatusState,
    #[serde(rename = "nfName")]
    pub nf_name: String,
}

/// The full stream envelope; exactly one payload section is expected for
/// the declared kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEvent {
    #[serde(rename = "eventType")]
    pub event_type: EventKind,
    #[serde(rename = "subscriberData", skip_serializing_if = "Option::is_none")]
    pub subscriber_data: Option<SubscriberEventData>,
    #[serde(rename = "coreMsgType", skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<CoreMsgType>,
    #[serde(rename = "nfStatusData", skip_serializing_if = "Option::is_none")]
    pub nf_status_data: Option<NfStatusRecord>,
}

impl MetricEvent {
    /// Decode one stream frame.
    ///
    /// A frame that parses but lacks the payload section for its declared
    /// kind is as untrustworthy as unparseable JSON, so both are decode
    /// errors.
    pub fn decode(payload: &[u8]) -> AppResult<Self> {
        let event: MetricEvent = serde_json::from_slice(payload)?;

        let section_present = match event.event_type {
            EventKind::Subscriber => event.subscriber_data.is_some(),
            EventKind::ServiceMessage => event.msg_type.is_some(),
            EventKind::NfStatus => event.nf_status_data.is_some(),
        };
        if !section_present {
            return Err(AppError::decode(format!(
                "event [{:?}] missing its payload section",
                event.event_type
            )));
        }

        Ok(event)
    }
}
