//! Caller Protocol
//!
//! Request and response messages exchanged with whoever drives the typist
//! (a popup, a script, another process). Each message is one JSON object
//! tagged by `type`:
//!
//! ```text
//! {"type":"TYPE_TEXT","target":"9A1F","text":"Hello","toggles":[],"rate":40}
//! {"type":"TYPE_RAW","target":"9A1F","text":"Ghbdtn"}
//! {"type":"STOP","target":"9A1F"}
//! {"type":"RESUME","target":"9A1F"}
//! {"type":"STATUS","target":"9A1F"}
//! {"type":"LAYOUT_TOGGLE","target":"9A1F"}
//! ```
//!
//! An optional `id` on a request is echoed on its response so callers can
//! match replies when several requests are in flight.
//!
//! Responses:
//!
//! ```text
//! {"ok":true}
//! {"ok":false,"error":"nothing to resume"}
//! {"ok":true,"state":"paused","cursor":3,"length":10}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::scheduler::JobStatus;
use crate::transport::TargetId;

/// Caller request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    /// Type already-corrected text, toggling layout at the given indices
    TypeText {
        /// Target tab
        #[serde(default)]
        target: TargetId,
        /// Characters to type
        text: String,
        /// Character indices preceded by a layout toggle
        #[serde(default)]
        toggles: Vec<usize>,
        /// Characters per second; process default when absent
        #[serde(default)]
        rate: Option<f64>,
    },
    /// Run layout correction first, then type with the computed toggles
    TypeRaw {
        /// Target tab
        #[serde(default)]
        target: TargetId,
        /// Text as entered, possibly in the wrong layout
        text: String,
        /// Characters per second; process default when absent
        #[serde(default)]
        rate: Option<f64>,
    },
    /// Pause a running job, or clear a paused one
    Stop {
        /// Target tab
        #[serde(default)]
        target: TargetId,
    },
    /// Continue a paused job
    Resume {
        /// Target tab
        #[serde(default)]
        target: TargetId,
    },
    /// Report job state
    Status {
        /// Target tab
        #[serde(default)]
        target: TargetId,
    },
    /// Send one layout toggle outside of any job
    LayoutToggle {
        /// Target tab
        #[serde(default)]
        target: TargetId,
    },
}

impl Request {
    /// Every `type` tag the protocol understands
    pub const KINDS: [&'static str; 6] = [
        "TYPE_TEXT",
        "TYPE_RAW",
        "STOP",
        "RESUME",
        "STATUS",
        "LAYOUT_TOGGLE",
    ];

    /// Target the request addresses
    pub fn target(&self) -> &TargetId {
        match self {
            Request::TypeText { target, .. }
            | Request::TypeRaw { target, .. }
            | Request::Stop { target }
            | Request::Resume { target }
            | Request::Status { target }
            | Request::LayoutToggle { target } => target,
        }
    }

    /// Point an unaddressed request at `target`
    pub fn or_target(mut self, fallback: &TargetId) -> Self {
        let target = match &mut self {
            Request::TypeText { target, .. }
            | Request::TypeRaw { target, .. }
            | Request::Stop { target }
            | Request::Resume { target }
            | Request::Status { target }
            | Request::LayoutToggle { target } => target,
        };
        if target.as_str().is_empty() {
            *target = fallback.clone();
        }
        self
    }

    /// Protocol tag of this request
    pub fn kind(&self) -> &'static str {
        match self {
            Request::TypeText { .. } => "TYPE_TEXT",
            Request::TypeRaw { .. } => "TYPE_RAW",
            Request::Stop { .. } => "STOP",
            Request::Resume { .. } => "RESUME",
            Request::Status { .. } => "STATUS",
            Request::LayoutToggle { .. } => "LAYOUT_TOGGLE",
        }
    }
}

/// A decoded request line and its correlation id
#[derive(Debug, Clone, PartialEq)]
pub struct Incoming {
    /// Caller-chosen id to echo back
    pub id: Option<Value>,
    /// The request, or why it was rejected
    pub request: Result<Request>,
}

impl Incoming {
    /// Decode one request line
    ///
    /// Unknown `type` tags yield [`Error::UnknownRequest`]; anything else
    /// that fails to decode yields [`Error::MalformedRequest`].
    pub fn parse(line: &str) -> Self {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                return Self {
                    id: None,
                    request: Err(Error::MalformedRequest(e.to_string())),
                }
            }
        };

        let Value::Object(map) = value else {
            return Self {
                id: None,
                request: Err(Error::MalformedRequest("expected a JSON object".to_string())),
            };
        };

        let id = map.get("id").cloned();

        let request = match map.get("type").and_then(Value::as_str) {
            None => Err(Error::MalformedRequest("missing request type".to_string())),
            Some(kind) if !Request::KINDS.contains(&kind) => {
                Err(Error::UnknownRequest(kind.to_string()))
            }
            Some(_) => serde_json::from_value(Value::Object(map))
                .map_err(|e| Error::MalformedRequest(e.to_string())),
        };

        Self { id, request }
    }
}

/// Reply to one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Echo of the request id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Whether the request succeeded
    pub ok: bool,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Job state, for status replies
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
}

impl Response {
    /// `{"ok":true}`
    pub fn ok() -> Self {
        Self {
            id: None,
            ok: true,
            error: None,
            status: None,
        }
    }

    /// `{"ok":false,"error":...}`
    pub fn error(error: &Error) -> Self {
        Self {
            id: None,
            ok: false,
            error: Some(error.to_string()),
            status: None,
        }
    }

    /// `{"ok":true,"state":...}`
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::ok()
        }
    }

    /// Attach the correlation id
    pub fn with_id(mut self, id: Option<Value>) -> Self {
        self.id = id;
        self
    }

    /// Encode as one line of JSON, without the trailing newline
    pub fn to_line(&self) -> String {
        // Only strings, numbers and caller-supplied JSON values; cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"ok":false,"error":"internal"}"#.to_string())
    }
}

impl From<Result<()>> for Response {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Response::ok(),
            Err(e) => Response::error(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_type_text_defaults() {
        let incoming = Incoming::parse(r#"{"type":"TYPE_TEXT","target":"tab","text":"hi"}"#);

        assert_eq!(incoming.id, None);
        assert_eq!(
            incoming.request.unwrap(),
            Request::TypeText {
                target: TargetId::new("tab"),
                text: "hi".to_string(),
                toggles: vec![],
                rate: None,
            }
        );
    }

    #[test]
    fn test_parse_keeps_id() {
        let incoming = Incoming::parse(r#"{"id":7,"type":"STATUS","target":"tab"}"#);

        assert_eq!(incoming.id, Some(json!(7)));
        assert_eq!(incoming.request.unwrap().kind(), "STATUS");
    }

    #[test]
    fn test_unknown_request_type() {
        let incoming = Incoming::parse(r#"{"id":"x","type":"DANCE","target":"tab"}"#);

        assert_eq!(incoming.id, Some(json!("x")));
        assert_eq!(
            incoming.request,
            Err(Error::UnknownRequest("DANCE".to_string()))
        );
    }

    #[test]
    fn test_malformed_requests() {
        for line in [
            "not json",
            "[1,2]",
            r#"{"target":"tab"}"#,
            r#"{"type":"TYPE_TEXT","target":"tab"}"#,
            r#"{"type":"TYPE_TEXT","text":"x","toggles":"nope"}"#,
        ] {
            let incoming = Incoming::parse(line);
            assert!(
                matches!(incoming.request, Err(Error::MalformedRequest(_))),
                "{line}"
            );
        }
    }

    #[test]
    fn test_missing_target_falls_back() {
        let request = Incoming::parse(r#"{"type":"STOP"}"#)
            .request
            .unwrap()
            .or_target(&TargetId::new("first"));

        assert_eq!(request.target().as_str(), "first");
    }

    #[test]
    fn test_response_encoding() {
        assert_eq!(Response::ok().to_line(), r#"{"ok":true}"#);

        let line = Response::error(&Error::NothingToResume).to_line();
        assert_eq!(line, r#"{"ok":false,"error":"nothing to resume"}"#);

        let value: Value = serde_json::from_str(
            &Response::status(JobStatus::Paused {
                cursor: 3,
                length: 10,
            })
            .with_id(Some(json!(1)))
            .to_line(),
        )
        .unwrap();
        assert_eq!(
            value,
            json!({"id": 1, "ok": true, "state": "paused", "cursor": 3, "length": 10})
        );

        let value: Value =
            serde_json::from_str(&Response::status(JobStatus::Idle).to_line()).unwrap();
        assert_eq!(value, json!({"ok": true, "state": "idle"}));
    }
}
