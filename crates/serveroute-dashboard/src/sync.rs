use crate::{
    api::{ApiError, ControlApi},
    config::Config,
};
use futures_util::StreamExt;
use serveroute_core::{
    events::{parse_stream_message, DecodeReport, SseFrameDecoder, StatusChangeEvent, StreamMessage},
    ControlCommand, ServiceListing,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const SYNC_QUEUE_CAPACITY: usize = 256;

/// Messages delivered to the dashboard's single writer, in arrival order.
#[derive(Debug)]
pub enum SyncEvent {
    Snapshot(ServiceListing),
    SnapshotFailed(String),
    Connected,
    Disconnected(String),
    StatusChange(StatusChangeEvent),
    CommandFailed {
        command: ControlCommand,
        service: String,
        error: String,
    },
}

/// Loads the snapshot, hands it over, and only then starts consuming the
/// event stream. A failed snapshot ends the task without opening the stream.
pub async fn sync_loop(api: ControlApi, config: Config, tx: mpsc::Sender<SyncEvent>) {
    let listing = match load_snapshot(&api, config.snapshot_retries).await {
        Ok(listing) => listing,
        Err(err) => {
            warn!(event = "snapshot_error", error = %err);
            let _ = tx.send(SyncEvent::SnapshotFailed(err.to_string())).await;
            return;
        }
    };
    info!(event = "snapshot_loaded", services = listing.len());
    if tx.send(SyncEvent::Snapshot(listing)).await.is_err() {
        return;
    }
    consume_events(&api, config.reconnect_delay, &tx).await;
}

pub async fn load_snapshot(api: &ControlApi, retries: u32) -> Result<ServiceListing, ApiError> {
    let mut backoff = Duration::from_secs(1);
    let mut attempt = 0u32;
    loop {
        match api.fetch_listing().await {
            Ok(listing) => return Ok(listing),
            Err(err) if attempt < retries => {
                attempt += 1;
                warn!(
                    event = "snapshot_retry",
                    attempt,
                    retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err
                );
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Reads the event stream forever, reopening it after transport failures.
/// Reconnects resume from the last event id and never refetch the snapshot.
pub async fn consume_events(
    api: &ControlApi,
    reconnect_delay: Duration,
    tx: &mpsc::Sender<SyncEvent>,
) {
    let mut delay = reconnect_delay;
    let mut last_event_id: Option<String> = None;

    loop {
        let reason = match api.open_events(last_event_id.as_deref()).await {
            Ok(response) => {
                let mut decoder =
                    SseFrameDecoder::default().with_last_event_id(last_event_id.take());
                let mut body = response.bytes_stream();
                let reason = loop {
                    match body.next().await {
                        Some(Ok(chunk)) => {
                            let report = decoder.push_chunk(&chunk);
                            if let Some(ms) = report.retry_ms {
                                delay = Duration::from_millis(ms);
                            }
                            if !forward_report(report, tx).await {
                                return;
                            }
                        }
                        Some(Err(err)) => break err.to_string(),
                        None => break "stream closed by server".to_string(),
                    }
                };
                for err in decoder.finish().errors {
                    warn!(event = "sse_decode_error", error = %err);
                }
                last_event_id = decoder.last_event_id().map(str::to_string);
                reason
            }
            Err(err) => err.to_string(),
        };

        warn!(
            event = "event_stream_error",
            error = %reason,
            retry_ms = delay.as_millis() as u64
        );
        if tx.send(SyncEvent::Disconnected(reason)).await.is_err() {
            return;
        }
        tokio::time::sleep(delay).await;
    }
}

/// Returns false once the receiving side is gone.
async fn forward_report(report: DecodeReport, tx: &mpsc::Sender<SyncEvent>) -> bool {
    for err in report.errors {
        warn!(event = "sse_decode_error", error = %err);
    }
    for frame in report.frames {
        let message = match parse_stream_message(&frame) {
            Ok(message) => message,
            Err(err) => {
                warn!(event = "sse_decode_error", data = %frame.data, error = %err);
                continue;
            }
        };
        let sync_event = match message {
            StreamMessage::Connected => {
                info!(event = "event_stream_connected");
                SyncEvent::Connected
            }
            StreamMessage::StatusChange(change) => {
                debug!(event = "status_change", kind = %change.kind, service = %change.service);
                SyncEvent::StatusChange(change)
            }
            StreamMessage::Ignored { event: name } => {
                debug!(event = "sse_event_ignored", name = %name);
                continue;
            }
        };
        if tx.send(sync_event).await.is_err() {
            return false;
        }
    }
    true
}

pub fn next_backoff(current: Duration) -> Duration {
    let next = current + current;
    if next > Duration::from_secs(10) {
        Duration::from_secs(10)
    } else {
        next
    }
}
