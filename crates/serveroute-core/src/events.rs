use crate::ServiceStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;
pub const DEFAULT_EVENT_NAME: &str = "message";
pub const CONNECTED_EVENT_NAME: &str = "connected";

/// Kind of a status change notification. Unrecognised kinds are preserved so
/// they can be logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Start,
    Stop,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Start => "start",
            EventKind::Stop => "stop",
            EventKind::Other(raw) => raw.as_str(),
        }
    }

    pub fn target_status(&self) -> Option<ServiceStatus> {
        match self {
            EventKind::Start => Some(ServiceStatus::Started),
            EventKind::Stop => Some(ServiceStatus::Stopped),
            EventKind::Other(_) => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EventKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "start" => EventKind::Start,
            "stop" => EventKind::Stop,
            _ => EventKind::Other(raw),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub service: String,
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    Connected,
    StatusChange(StatusChangeEvent),
    Ignored { event: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("event data exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("line exceeds max size without terminator: {size} > {max}")]
    OversizedLine { size: usize, max: usize },
    #[error("stream ended inside an event ({bytes} bytes discarded)")]
    Truncated { bytes: usize },
    #[error("frame decode failed: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Default)]
pub struct DecodeReport {
    pub frames: Vec<SseFrame>,
    pub errors: Vec<FrameError>,
    /// Reconnection delay requested by the server via a `retry:` field.
    pub retry_ms: Option<u64>,
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes may be pushed in arbitrary chunks; complete events are returned as
/// soon as their terminating blank line has been seen. The last event id
/// survives across events so a reconnecting consumer can resume from it.
pub struct SseFrameDecoder {
    max_frame_bytes: usize,
    pending: Vec<u8>,
    event: Option<String>,
    data: String,
    has_data: bool,
    discarding: bool,
    last_event_id: Option<String>,
}

impl SseFrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            pending: Vec::new(),
            event: None,
            data: String::new(),
            has_data: false,
            discarding: false,
            last_event_id: None,
        }
    }

    pub fn with_last_event_id(mut self, last_event_id: Option<String>) -> Self {
        self.last_event_id = last_event_id;
        self
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> DecodeReport {
        let mut report = DecodeReport::default();
        if !chunk.is_empty() {
            self.pending.extend_from_slice(chunk);
        }

        while let Some(newline_idx) = self.pending.iter().position(|byte| *byte == b'\n') {
            let mut line = self.pending.drain(..=newline_idx).collect::<Vec<u8>>();
            line.pop();
            if line.ends_with(b"\r") {
                line.pop();
            }
            self.process_line(&line, &mut report);
        }

        if self.pending.len() > self.max_frame_bytes {
            report.errors.push(FrameError::OversizedLine {
                size: self.pending.len(),
                max: self.max_frame_bytes,
            });
            self.pending.clear();
            self.discarding = true;
        }

        report
    }

    /// Called at end of stream. An event without its terminating blank line
    /// is incomplete and is dropped.
    pub fn finish(&mut self) -> DecodeReport {
        let mut report = DecodeReport::default();
        let leftover = self.pending.len() + self.data.len();
        if leftover > 0 || self.has_data {
            report.errors.push(FrameError::Truncated { bytes: leftover });
        }
        self.pending.clear();
        self.reset_event();
        report
    }

    fn process_line(&mut self, line: &[u8], report: &mut DecodeReport) {
        if line.is_empty() {
            self.dispatch(report);
            return;
        }
        if self.discarding || line[0] == b':' {
            return;
        }

        let line = match std::str::from_utf8(line) {
            Ok(value) => value,
            Err(err) => {
                report.errors.push(FrameError::Decode(err.to_string()));
                self.discarding = true;
                return;
            }
        };
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
                if self.data.len() > self.max_frame_bytes {
                    report.errors.push(FrameError::OversizedFrame {
                        size: self.data.len(),
                        max: self.max_frame_bytes,
                    });
                    self.data.clear();
                    self.discarding = true;
                }
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = Some(value.to_string());
                }
            }
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    report.retry_ms = Some(ms);
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, report: &mut DecodeReport) {
        if self.discarding || !self.has_data {
            self.reset_event();
            return;
        }
        let event = self
            .event
            .take()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string());
        report.frames.push(SseFrame {
            event,
            data: std::mem::take(&mut self.data),
            id: self.last_event_id.clone(),
        });
        self.reset_event();
    }

    fn reset_event(&mut self) {
        self.event = None;
        self.data.clear();
        self.has_data = false;
        self.discarding = false;
    }
}

impl Default for SseFrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

/// Classifies a dispatched frame from the control API's `/events` stream.
pub fn parse_stream_message(frame: &SseFrame) -> Result<StreamMessage, FrameError> {
    match frame.event.as_str() {
        CONNECTED_EVENT_NAME => Ok(StreamMessage::Connected),
        DEFAULT_EVENT_NAME => serde_json::from_str::<StatusChangeEvent>(&frame.data)
            .map(StreamMessage::StatusChange)
            .map_err(|err| FrameError::Decode(err.to_string())),
        other => Ok(StreamMessage::Ignored {
            event: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &str) -> DecodeReport {
        SseFrameDecoder::default().push_chunk(input.as_bytes())
    }

    #[test]
    fn decodes_connected_and_message_events() {
        let report = decode_all(
            "event:connected\ndata:connected\n\n\
             event:message\ndata:{\"type\":\"start\",\"service\":\"web\"}\n\n",
        );
        assert!(report.errors.is_empty());
        assert_eq!(report.frames.len(), 2);

        assert_eq!(
            parse_stream_message(&report.frames[0]).expect("connected"),
            StreamMessage::Connected
        );
        assert_eq!(
            parse_stream_message(&report.frames[1]).expect("status change"),
            StreamMessage::StatusChange(StatusChangeEvent {
                kind: EventKind::Start,
                service: "web".to_string(),
            })
        );
    }

    #[test]
    fn events_split_across_chunks_are_reassembled() {
        let mut decoder = SseFrameDecoder::default();
        let first = decoder.push_chunk(b"data: {\"type\":\"st");
        assert!(first.frames.is_empty());
        let second = decoder.push_chunk(b"op\",\"service\":\"db\"}\r\n");
        assert!(second.frames.is_empty());
        let third = decoder.push_chunk(b"\r\n");
        assert_eq!(third.frames.len(), 1);
        assert_eq!(third.frames[0].event, DEFAULT_EVENT_NAME);

        let message = parse_stream_message(&third.frames[0]).expect("parse");
        let StreamMessage::StatusChange(event) = message else {
            panic!("expected status change");
        };
        assert_eq!(event.kind, EventKind::Stop);
        assert_eq!(event.service, "db");
        assert_eq!(event.kind.target_status(), Some(ServiceStatus::Stopped));
    }

    #[test]
    fn comments_and_empty_data_blocks_are_not_dispatched() {
        let report = decode_all(": keep-alive\n\nevent: connected\n\nretry: 2500\n\n");
        assert!(report.frames.is_empty());
        assert!(report.errors.is_empty());
        assert_eq!(report.retry_ms, Some(2500));
    }

    #[test]
    fn multi_line_data_is_joined_with_newlines() {
        let report = decode_all("event: note\ndata: a\ndata: b\n\n");
        assert_eq!(report.frames.len(), 1);
        assert_eq!(report.frames[0].data, "a\nb");
        assert_eq!(
            parse_stream_message(&report.frames[0]).expect("ignored"),
            StreamMessage::Ignored {
                event: "note".to_string()
            }
        );
    }

    #[test]
    fn unknown_event_kind_is_preserved() {
        let frame = SseFrame {
            event: DEFAULT_EVENT_NAME.to_string(),
            data: r#"{"type":"restart","service":"web"}"#.to_string(),
            id: None,
        };
        let StreamMessage::StatusChange(event) = parse_stream_message(&frame).expect("parse")
        else {
            panic!("expected status change");
        };
        assert_eq!(event.kind, EventKind::Other("restart".to_string()));
        assert_eq!(event.kind.target_status(), None);
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let frame = SseFrame {
            event: DEFAULT_EVENT_NAME.to_string(),
            data: "{\"type\":".to_string(),
            id: None,
        };
        assert!(matches!(
            parse_stream_message(&frame),
            Err(FrameError::Decode(_))
        ));
    }

    #[test]
    fn last_event_id_carries_over_events() {
        let mut decoder = SseFrameDecoder::default().with_last_event_id(Some("4".to_string()));
        let report = decoder.push_chunk(b"data: x\n\nid: 7\ndata: y\n\ndata: z\n\n");
        let ids: Vec<Option<&str>> = report.frames.iter().map(|f| f.id.as_deref()).collect();
        assert_eq!(ids, vec![Some("4"), Some("7"), Some("7")]);
        assert_eq!(decoder.last_event_id(), Some("7"));
    }

    #[test]
    fn oversized_event_is_dropped_and_decoding_continues() {
        let mut decoder = SseFrameDecoder::new(32);
        let mut input = format!("data: {}\n\n", "x".repeat(64));
        input.push_str("data: ok\n\n");
        let report = decoder.push_chunk(input.as_bytes());

        assert_eq!(report.errors.len(), 1);
        assert!(matches!(
            report.errors[0],
            FrameError::OversizedFrame { .. }
        ));
        assert_eq!(report.frames.len(), 1);
        assert_eq!(report.frames[0].data, "ok");
    }

    #[test]
    fn finish_drops_incomplete_event() {
        let mut decoder = SseFrameDecoder::default();
        let report = decoder.push_chunk(b"data: {\"type\":\"start\",\"service\":\"web\"}\n");
        assert!(report.frames.is_empty());

        let tail = decoder.finish();
        assert!(tail.frames.is_empty());
        assert!(matches!(tail.errors[0], FrameError::Truncated { .. }));
        assert!(decoder.finish().errors.is_empty());
    }
}
