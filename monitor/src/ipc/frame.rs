//! Wire framing for the monitor socket
//!
//! One JSON object per line, newline-terminated, UTF-8. Each frame carries a
//! `type` tag and a `payload` whose schema depends on the type. Frames over
//! the hard ceiling are rejected and the peer is closed.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

/// Hard ceiling on a single frame, newline included (256 KiB)
pub const MAX_FRAME_BYTES: usize = 256 * 1024;

/// Default history replay limit when a request does not set one
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("oversized frame: {size} bytes (max {max})")]
    Oversized { size: usize, max: usize },

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// History replay request payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRequest {
    /// Replay starts strictly after this event id when set
    pub since: Option<String>,
    /// Maximum number of events to replay
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

/// One frame on the socket
///
/// Event payloads stay as raw JSON here; strict event validation happens at
/// ingest (`MonitorEvent::from_value`), not in the framing layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Frame {
    /// A monitor event, producer -> daemon or daemon -> viewer
    Event(serde_json::Value),
    /// Viewer asks for ring-buffer history
    HistoryRequest(HistoryRequest),
    /// Replay delimiter: history follows
    HistoryBegin {},
    /// Replay delimiter: live stream resumes
    HistoryEnd {},
    /// Optional keep-alive; the server ignores it
    Ping {},
}

impl Frame {
    /// Wrap an event for the wire
    pub fn event(event: &crate::events::MonitorEvent) -> Self {
        Frame::Event(event.to_value())
    }
}

/// Encode a frame to its wire line (newline not included)
pub fn encode_frame(frame: &Frame) -> Result<String, FrameError> {
    let line = serde_json::to_string(frame).map_err(|e| FrameError::Malformed(e.to_string()))?;
    if line.len() + 1 > MAX_FRAME_BYTES {
        return Err(FrameError::Oversized {
            size: line.len() + 1,
            max: MAX_FRAME_BYTES,
        });
    }
    Ok(line)
}

/// Decode a frame from one wire line
pub fn decode_frame(line: &str) -> Result<Frame, FrameError> {
    if line.len() > MAX_FRAME_BYTES {
        return Err(FrameError::Oversized {
            size: line.len(),
            max: MAX_FRAME_BYTES,
        });
    }
    serde_json::from_str(line.trim()).map_err(|e| FrameError::Malformed(e.to_string()))
}

/// Read one frame from an async buffered reader
///
/// Returns `Ok(None)` on clean EOF. The size check runs after the read, so
/// an oversized line costs its buffer once and then closes the peer.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, FrameError>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Ok(None);
    }
    if bytes_read > MAX_FRAME_BYTES {
        return Err(FrameError::Oversized {
            size: bytes_read,
            max: MAX_FRAME_BYTES,
        });
    }
    decode_frame(&line).map(Some)
}

/// Write one frame to an async writer, newline-terminated, and flush
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FrameError>
where
    W: AsyncWriteExt + Unpin,
{
    let line = encode_frame(frame)?;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventPayload, MonitorEvent};

    #[test]
    fn test_ping_wire_shape() {
        let json = encode_frame(&Frame::Ping {}).unwrap();
        assert_eq!(json, r#"{"type":"ping","payload":{}}"#);
    }

    #[test]
    fn test_history_begin_end_wire_shape() {
        assert_eq!(
            encode_frame(&Frame::HistoryBegin {}).unwrap(),
            r#"{"type":"history_begin","payload":{}}"#
        );
        assert_eq!(
            encode_frame(&Frame::HistoryEnd {}).unwrap(),
            r#"{"type":"history_end","payload":{}}"#
        );
    }

    #[test]
    fn test_history_request_round_trip() {
        let frame = Frame::HistoryRequest(HistoryRequest {
            since: Some("evt-9".to_string()),
            limit: 25,
        });
        let json = encode_frame(&frame).unwrap();
        assert_eq!(decode_frame(&json).unwrap(), frame);
    }

    #[test]
    fn test_history_request_limit_defaults() {
        let frame = decode_frame(r#"{"type":"history_request","payload":{"since":null}}"#).unwrap();
        match frame {
            Frame::HistoryRequest(req) => {
                assert_eq!(req.since, None);
                assert_eq!(req.limit, DEFAULT_HISTORY_LIMIT);
            }
            other => panic!("expected history_request, got {other:?}"),
        }
    }

    #[test]
    fn test_event_frame_round_trips_canonically() {
        let event = MonitorEvent::new("T1", EventPayload::OrchestratorCompleted);
        let frame = Frame::event(&event);
        let json = encode_frame(&frame).unwrap();
        let decoded = decode_frame(&json).unwrap();
        // encode(decode(frame)) == frame for a valid frame
        assert_eq!(encode_frame(&decoded).unwrap(), json);
        match decoded {
            Frame::Event(value) => {
                assert_eq!(MonitorEvent::from_value(&value).unwrap(), event);
            }
            other => panic!("expected event frame, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_frame_type_is_malformed() {
        let err = decode_frame(r#"{"type":"subscribe","payload":{}}"#).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = decode_frame("{not json").unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let big = "x".repeat(MAX_FRAME_BYTES + 1);
        let err = decode_frame(&big).unwrap_err();
        assert!(matches!(err, FrameError::Oversized { .. }));
    }

    #[test]
    fn test_oversized_event_refuses_to_encode() {
        let event = MonitorEvent::new(
            "T1",
            EventPayload::OrchestratorFailed {
                error: "e".repeat(MAX_FRAME_BYTES),
            },
        );
        let err = encode_frame(&Frame::event(&event)).unwrap_err();
        assert!(matches!(err, FrameError::Oversized { .. }));
    }

    #[tokio::test]
    async fn test_read_write_frame_over_a_duplex_pipe() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, _server_write) = tokio::io::split(server);
        let (client_read, mut client_write) = tokio::io::split(client);

        let event = MonitorEvent::new("T1", EventPayload::OrchestratorCompleted);
        let frame = Frame::event(&event);
        write_frame(&mut client_write, &frame).await.unwrap();
        write_frame(&mut client_write, &Frame::Ping {}).await.unwrap();
        drop(client_write);
        drop(client_read);

        let mut reader = tokio::io::BufReader::new(server_read);
        assert_eq!(read_frame(&mut reader).await.unwrap(), Some(frame));
        assert_eq!(read_frame(&mut reader).await.unwrap(), Some(Frame::Ping {}));
        // Clean EOF
        assert_eq!(read_frame(&mut reader).await.unwrap(), None);
    }
}
