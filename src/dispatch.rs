//! Event dispatch: one long-running task per inbound NF stream
//!
//! The message-bus client itself lives outside this crate; what is fixed
//! here is the consumption contract (`EventSource`) and the routing of each
//! decoded envelope into the store. Transport hiccups are retried, but a
//! frame that fails to decode kills the owning stream task: a corrupt
//! stream cannot be trusted to self-heal, and the other streams keep going.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::events::{EventKind, MetricEvent, NfFamily, SubscriberOp};
use crate::store::MetricStore;

/// Upper bound on one frame; anything larger is a framing error
const MAX_FRAME_LEN: u32 = 1 << 20;

/// Pause before retrying a failed stream read
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Consumption contract for one stream partition/topic
#[async_trait]
pub trait EventSource: Send {
    /// Block until the next frame arrives.
    /// `StreamClosed` means no more frames will ever arrive; any other
    /// error is transient and the dispatcher will call again.
    async fn next_frame(&mut self) -> AppResult<Vec<u8>>;

    fn topic(&self) -> &str;
}

/// Length-delimited frames (u32-BE prefix + JSON payload) over TCP,
/// reconnecting on any transport error.
pub struct TcpEventSource {
    addr: String,
    topic: String,
    conn: Option<TcpStream>,
}

impl TcpEventSource {
    pub fn new(addr: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            topic: topic.into(),
            conn: None,
        }
    }

    async fn read_frame(conn: &mut TcpStream) -> AppResult<Vec<u8>> {
        let len = conn.read_u32().await?;
        if len == 0 || len > MAX_FRAME_LEN {
            return Err(AppError::new(
                ErrorCode::StreamTransport,
                format!("bad frame length [{}]", len),
            ));
        }
        let mut payload = vec![0u8; len as usize];
        conn.read_exact(&mut payload).await?;
        Ok(payload)
    }
}

#[async_trait]
impl EventSource for TcpEventSource {
    async fn next_frame(&mut self) -> AppResult<Vec<u8>> {
        if self.conn.is_none() {
            match TcpStream::connect(&self.addr).await {
                Ok(stream) => {
                    info!("stream [{}] connected to [{}]", self.topic, self.addr);
                    self.conn = Some(stream);
                }
                Err(err) => {
                    return Err(AppError::with_source(
                        ErrorCode::StreamTransport,
                        format!("connect to [{}] failed", self.addr),
                        err,
                    ));
                }
            }
        }

        // Just connected above when it was None
        let Some(conn) = self.conn.as_mut() else {
            return Err(AppError::new(ErrorCode::StreamTransport, "no connection"));
        };

        match Self::read_frame(conn).await {
            Ok(payload) => Ok(payload),
            Err(err) => {
                // Drop the connection so the next call dials fresh
                self.conn = None;
                Err(err)
            }
        }
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

/// In-process source backed by a channel; used by tests and local producers
pub struct ChannelEventSource {
    topic: String,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl ChannelEventSource {
    pub fn new(topic: impl Into<String>, rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            rx,
        }
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn next_frame(&mut self) -> AppResult<Vec<u8>> {
        self.rx.recv().await.ok_or_else(|| {
            AppError::new(ErrorCode::StreamClosed, "event channel closed by producer")
        })
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

/// Spawn the dispatch task for one stream
pub fn spawn_dispatcher<S>(
    store: Arc<MetricStore>,
    mut source: S,
    family: NfFamily,
) -> JoinHandle<()>
where
    S: EventSource + 'static,
{
    tokio::spawn(async move {
        run_dispatcher(store, &mut source, family).await;
    })
}

/// Consume frames until the source closes or a decode failure makes the
/// stream untrustworthy.
pub async fn run_dispatcher(store: Arc<MetricStore>, source: &mut dyn EventSource, family: NfFamily) {
    info!(
        "event dispatcher for topic [{}] initialised as [{}]",
        source.topic(),
        family
    );

    loop {
        let frame = match source.next_frame().await {
            Ok(frame) => frame,
            Err(err) if err.code == ErrorCode::StreamClosed => {
                info!("stream [{}] closed, dispatcher exiting", source.topic());
                return;
            }
            Err(err) => {
                warn!("error reading stream [{}]: {}", source.topic(), err);
                tokio::time::sleep(READ_RETRY_DELAY).await;
                continue;
            }
        };

        let event = match MetricEvent::decode(&frame) {
            Ok(event) => event,
            Err(err) => {
                error!(
                    "fatal decode error on stream [{}], dispatcher exiting: {}",
                    source.topic(),
                    err
                );
                return;
            }
        };

        route_event(&store, event, family);
    }
}

/// Route one decoded envelope to its store mutation.
/// Store-level failures are logged here and never propagate: one bad event
/// must not stop ingestion of the rest of the stream.
fn route_event(store: &MetricStore, event: MetricEvent, family: NfFamily) {
    match event.event_type {
        EventKind::Subscriber => {
            // decode() guarantees the section is present for the kind
            let Some(data) = event.subscriber_data else {
                return;
            };
            debug!(
                "subscriber event op [{:?}] imsi [{}] from [{}]",
                data.op, data.subscriber.imsi, family
            );
            match data.op {
                SubscriberOp::Add => store.add_subscriber(&data.subscriber, family),
                SubscriberOp::Mod => store.update_subscriber(&data.subscriber, family),
                SubscriberOp::Del => {
                    if let Err(err) = store.delete_subscriber(&data.subscriber) {
                        warn!("delete subscriber failed: {}", err);
                    }
                }
            }
        }
        EventKind::ServiceMessage => {
            let Some(msg) = event.msg_type else {
                return;
            };
            if let Err(err) = store.increment_service_stat(family, &msg.source_nf_id, &msg.msg_type)
            {
                error!("service stat dropped: {}", err);
            }
        }
        EventKind::NfStatus => {
            let Some(record) = event.nf_status_data else {
                return;
            };
            store.upsert_nf_status(record);
        }
    }
}
