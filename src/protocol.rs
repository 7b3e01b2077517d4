//! Control socket protocol: one JSON document per line.
//!
//! Clients send a `ControlRequest`; the daemon answers every request with
//! exactly one `ok` or `error` frame. After `subscribe` the connection also
//! carries `event` frames, and after `attach_page` it carries `page` frames
//! for the attached presenter.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::error::{Error, Result};
use crate::pages::{PageId, PageRequest};
use crate::service::ServiceEvent;
use crate::task::Task;
use crate::wakeup::WakeUp;

/// Lines longer than this are rejected while reading, before they are
/// buffered in full
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Line stream over one half of a control connection
pub type FrameReader<R> = FramedRead<R, LinesCodec>;

/// Wrap `reader` in a line decoder capped at `MAX_FRAME_BYTES`
///
/// Reading the next line is cancel safe, so it can race pushed frames in a
/// `select!` without losing a partially received request.
pub fn frame_reader<R: AsyncRead>(reader: R) -> FrameReader<R> {
    FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_FRAME_BYTES))
}

/// Map a line decoding failure onto the crate error
pub fn frame_error(err: LinesCodecError) -> Error {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            Error::Protocol(format!("frame too large (max {MAX_FRAME_BYTES} bytes)"))
        }
        LinesCodecError::Io(err) => Error::Io(err),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum ControlRequest {
    SubmitTask {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
    ListActiveTasks,
    RunSelfTest,
    ClearAll,
    Subscribe,
    AttachPage {
        label: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlResponse {
    Ok {
        #[serde(default)]
        payload: serde_json::Value,
    },
    Error {
        kind: String,
        message: String,
    },
    Event {
        event: ServiceEvent,
    },
    Page {
        request: PageRequest,
    },
}

impl ControlResponse {
    pub fn ok<T: Serialize>(payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(payload) => ControlResponse::Ok { payload },
            Err(err) => ControlResponse::error(&Error::Json(err)),
        }
    }

    pub fn error(err: &Error) -> Self {
        ControlResponse::Error {
            kind: err.kind().to_string(),
            message: err.wire_message(),
        }
    }

    pub fn from_result<T: Serialize>(result: Result<T>) -> Self {
        match result {
            Ok(payload) => Self::ok(&payload),
            Err(err) => Self::error(&err),
        }
    }

    /// Whether this frame answers a request (as opposed to a pushed frame)
    pub fn is_reply(&self) -> bool {
        matches!(self, ControlResponse::Ok { .. } | ControlResponse::Error { .. })
    }

    /// Decode the payload of an `ok` frame, or rebuild the error
    pub fn into_payload<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            ControlResponse::Ok { payload } => serde_json::from_value(payload)
                .map_err(|err| Error::Protocol(format!("unexpected reply payload: {err}"))),
            ControlResponse::Error { kind, message } => Err(Error::from_wire(&kind, message)),
            other => Err(Error::Protocol(format!("expected a reply, got {other:?}"))),
        }
    }
}

/// Reply to `list_active_tasks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTasks {
    /// Daemon clock at the time of the listing
    pub now: DateTime<Utc>,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub wake_ups: Vec<WakeUp>,
}

/// Reply to `attach_page`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageAttached {
    pub page_id: PageId,
}

pub fn encode_frame<T: Serialize>(frame: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(frame)?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn decode_frame<T: DeserializeOwned>(line: &str) -> Result<T> {
    if line.len() > MAX_FRAME_BYTES {
        return Err(Error::Protocol(format!(
            "frame too large: {} bytes (max {MAX_FRAME_BYTES})",
            line.len()
        )));
    }
    serde_json::from_str(line.trim_end()).map_err(|err| Error::Protocol(format!("malformed frame: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_format() {
        let frame = encode_frame(&ControlRequest::SubmitTask {
            text: "Call mom".to_string(),
            context: None,
        })
        .unwrap();
        assert_eq!(
            String::from_utf8(frame).unwrap(),
            "{\"request\":\"submit_task\",\"text\":\"Call mom\"}\n"
        );

        let parsed: ControlRequest = decode_frame("{\"request\":\"clear_all\"}\n").unwrap();
        assert_eq!(parsed, ControlRequest::ClearAll);
    }

    #[test]
    fn error_reply_rebuilds_error_kind() {
        let reply = ControlResponse::error(&Error::Parse("no structured block".to_string()));
        let line = String::from_utf8(encode_frame(&reply).unwrap()).unwrap();
        let decoded: ControlResponse = decode_frame(&line).unwrap();

        let err = decoded.into_payload::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, Error::Parse(ref msg) if msg == "no structured block"));
    }

    #[test]
    fn pushed_frames_are_not_replies() {
        assert!(!ControlResponse::Event {
            event: ServiceEvent::TasksChanged
        }
        .is_reply());
        assert!(ControlResponse::ok(&()).is_reply());
    }

    #[test]
    fn active_tasks_reply_decodes_with_wake_ups() {
        let now = Utc::now();
        let listing = ActiveTasks {
            now,
            tasks: Vec::new(),
            wake_ups: vec![WakeUp {
                name: "reminder_a_b".to_string(),
                at: now,
            }],
        };
        let line = String::from_utf8(encode_frame(&ControlResponse::ok(&listing)).unwrap()).unwrap();

        let decoded: ActiveTasks = decode_frame::<ControlResponse>(&line)
            .unwrap()
            .into_payload()
            .unwrap();
        assert_eq!(decoded.now, now);
        assert_eq!(decoded.wake_ups, listing.wake_ups);
    }

    #[tokio::test]
    async fn frame_reader_rejects_oversized_lines() {
        use futures::StreamExt;

        let mut input = b"{\"request\":\"clear_all\"}\n".to_vec();
        input.extend(std::iter::repeat(b'x').take(MAX_FRAME_BYTES + 16));
        let mut frames = frame_reader(input.as_slice());

        let line = frames.next().await.unwrap().unwrap();
        assert_eq!(decode_frame::<ControlRequest>(&line).unwrap(), ControlRequest::ClearAll);

        let err = frame_error(frames.next().await.unwrap().unwrap_err());
        assert!(matches!(err, Error::Protocol(ref msg) if msg.contains("too large")));
    }

    #[test]
    fn malformed_frame_is_protocol_error() {
        let err = decode_frame::<ControlRequest>("{\"request\":\"explode\"}").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
