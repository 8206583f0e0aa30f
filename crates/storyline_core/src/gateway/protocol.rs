//! Realtime wire protocol.
//!
//! # Responsibility
//! - Define client→server and server→client events and their payloads.
//! - Encode/decode the `{"event": <name>, "data": <payload>}` frame.
//!
//! # Invariants
//! - Event names and payload field names are a stable contract.
//! - Clients never send positions or story ids; the server resolves both.

use crate::model::patch::Patch;
use crate::model::story::{Revision, StoryId};
use crate::model::token::{Position, PositionedToken};
use crate::opening::OpeningState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Events a connection may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Join,
    Resync,
    Patch(PatchRequest),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Resync => "resync",
            Self::Patch(_) => "patch",
        }
    }

    /// Decodes one frame.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let frame: Frame = serde_json::from_str(frame).map_err(ProtocolError::Malformed)?;
        match frame.event.as_str() {
            "join" => Ok(Self::Join),
            "resync" => Ok(Self::Resync),
            "patch" => {
                let request = if frame.data.is_null() {
                    PatchRequest::default()
                } else {
                    serde_json::from_value(frame.data).map_err(ProtocolError::Malformed)?
                };
                Ok(Self::Patch(request))
            }
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    /// Encodes this event as one frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let data = match self {
            Self::Join | Self::Resync => Value::Null,
            Self::Patch(request) => serde_json::to_value(request)?,
        };
        serde_json::to_string(&Frame {
            event: self.name().to_string(),
            data,
        })
    }
}

/// Writer intent: plain text only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRequest {
    #[serde(default)]
    pub submit_event: Option<String>,
}

impl PatchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            submit_event: Some(text.into()),
        }
    }
}

/// Events the server pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Resync(ResyncPayload),
    State(StatePayload),
    Opening(OpeningPayload),
    Patch(Patch),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Resync(_) => "resync",
            Self::State(_) => "state",
            Self::Opening(_) => "opening",
            Self::Patch(_) => "patch",
            Self::Error(_) => "error",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(ProtocolError::Malformed)
    }
}

/// Full window plus Opening state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncPayload {
    pub story_id: StoryId,
    pub tokens: Vec<PositionedToken>,
    pub window_start_position: Position,
    #[serde(default)]
    pub revision: Revision,
    pub opening: OpeningState,
}

/// Lightweight state pushed on join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload {
    pub story_id: StoryId,
    pub opening: OpeningState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningPayload {
    pub opening: OpeningState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorPayload {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    data: Value,
}

/// Frame decoding failures.
#[derive(Debug)]
pub enum ProtocolError {
    Malformed(serde_json::Error),
    UnknownEvent(String),
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "malformed frame: {err}"),
            Self::UnknownEvent(name) => write!(f, "unknown event `{name}`"),
        }
    }
}

impl Error for ProtocolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            Self::UnknownEvent(_) => None,
        }
    }
}
