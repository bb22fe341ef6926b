//! Wire envelopes exchanged over every transport.
//!
//! One JSON object per text frame, no version or checksum:
//!
//! - Request: `{ "id": int >= 0, "event": string, "data": any|null }`
//! - Response: `{ "id": int > 0, "success": bool, "data": any|null, "error": string|null }`
//!
//! All fields are always serialized, nulls included.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ParseError;
use crate::ids::CorrelationId;

/// A call (nonzero id) or an event (id 0).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, `0` for fire-and-forget.
    pub id: CorrelationId,
    /// Event name, the routing key on the receiving side.
    pub event: String,
    /// Schema-less payload agreed on per event name.
    #[serde(default)]
    pub data: Value,
}

/// The answer to exactly one prior call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request being answered.
    pub id: CorrelationId,
    /// Whether the call succeeded.
    pub success: bool,
    /// Result payload (null on failure).
    #[serde(default)]
    pub data: Value,
    /// Failure reason (null on success).
    #[serde(default)]
    pub error: Option<String>,
}

/// Either wire shape.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    /// A call or event.
    Request(Request),
    /// An answer to a call.
    Response(Response),
}

impl Request {
    /// Build a call expecting one response.
    pub fn call(id: CorrelationId, event: impl Into<String>, data: Value) -> Self {
        Self {
            id,
            event: event.into(),
            data,
        }
    }

    /// Build a fire-and-forget event.
    pub fn event(event: impl Into<String>, data: Value) -> Self {
        Self::call(CorrelationId::EVENT, event, data)
    }

    /// Whether no response is expected.
    pub fn is_event(&self) -> bool {
        self.id.is_event()
    }

    /// Serialize to a single text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Response {
    /// Build a success response.
    pub fn success(id: CorrelationId, data: Value) -> Self {
        Self {
            id,
            success: true,
            data,
            error: None,
        }
    }

    /// Build a failure response.
    pub fn failure(id: CorrelationId, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            data: Value::Null,
            error: Some(error.into()),
        }
    }

    /// Serialize to a single text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Envelope {
    /// Parse and validate one inbound frame.
    ///
    /// An object carrying a `success` field is a response and needs `id > 0`.
    /// Anything else must be a request with `id >= 0`.
    pub fn parse(frame: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(frame)?;
        let Some(object) = value.as_object() else {
            return Err(ParseError::NotAnObject);
        };

        if object.contains_key("success") {
            let response: Response = serde_json::from_value(value)?;
            if !response.id.is_call() {
                return Err(ParseError::InvalidId(response.id.get()));
            }
            Ok(Self::Response(response))
        } else {
            let request: Request = serde_json::from_value(value)?;
            if request.id.get() < 0 {
                return Err(ParseError::InvalidId(request.id.get()));
            }
            Ok(Self::Request(request))
        }
    }

    /// Correlation id of either shape.
    pub fn id(&self) -> CorrelationId {
        match self {
            Self::Request(r) => r.id,
            Self::Response(r) => r.id,
        }
    }

    /// Serialize to a single text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<Request> for Envelope {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Response> for Envelope {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}
