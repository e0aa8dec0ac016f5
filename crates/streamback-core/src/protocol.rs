//! Streamback wire protocol.
//!
//! One response carries many frames. Each frame is the JSON array
//! `[target, payload, callback_id]`, suffixed with [`STREAM_SEPARATOR`] and
//! wrapped as a `data:` record of a `text/event-stream` response. The target
//! slot holds either a component id or one of the lifecycle tokens.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::callback_id::{CallbackId, parse_connector_reference};
use crate::error::{Result, StreamError};
use crate::types::{ComponentId, PropMap, ResetMap, TriggerPayload};

/// Separator appended to every encoded frame.
pub const STREAM_SEPARATOR: &str = "__concatsep__";

pub const INIT_TOKEN: &str = "[INIT]";
pub const DONE_TOKEN: &str = "[DONE]";
pub const ERROR_TOKEN: &str = "[ERROR]";

/// Request key carrying the callback id (or the connector id wrapping it).
pub const CALLBACK_ID_KEY: &str = "sse_callback_id";

/// Request key carrying ambient trigger metadata, stripped before the generator runs.
pub const CONTEXT_KEY: &str = "callback_context";

pub const DEFAULT_ENDPOINT: &str = "/update_component_sse";

pub const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Target slot of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameTarget {
    Init,
    Done,
    Error,
    Component(ComponentId),
}

impl FrameTarget {
    pub fn is_lifecycle(&self) -> bool {
        !matches!(self, Self::Component(_))
    }
}

/// Error details carried by an `[ERROR]` frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    /// `true` when no custom handler surfaced the fault and the client must alert.
    #[serde(default)]
    pub handle_error: bool,
    #[serde(default)]
    pub reset_props: ResetMap,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    Update(PropMap),
    Error(ErrorPayload),
    Empty,
}

/// One `[target, payload, callback_id]` unit on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireFrame", try_from = "WireFrame")]
pub struct Frame {
    pub target: FrameTarget,
    pub payload: FramePayload,
    pub callback_id: CallbackId,
}

impl Frame {
    pub fn init(callback_id: CallbackId) -> Self {
        Self {
            target: FrameTarget::Init,
            payload: FramePayload::Empty,
            callback_id,
        }
    }

    pub fn done(callback_id: CallbackId) -> Self {
        Self {
            target: FrameTarget::Done,
            payload: FramePayload::Empty,
            callback_id,
        }
    }

    pub fn error(callback_id: CallbackId, payload: ErrorPayload) -> Self {
        Self {
            target: FrameTarget::Error,
            payload: FramePayload::Error(payload),
            callback_id,
        }
    }

    pub fn update(callback_id: CallbackId, target: ComponentId, props: PropMap) -> Self {
        Self {
            target: FrameTarget::Component(target),
            payload: FramePayload::Update(props),
            callback_id,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireFrame(Value, Value, CallbackId);

impl From<Frame> for WireFrame {
    fn from(frame: Frame) -> Self {
        let target = match frame.target {
            FrameTarget::Init => Value::String(INIT_TOKEN.into()),
            FrameTarget::Done => Value::String(DONE_TOKEN.into()),
            FrameTarget::Error => Value::String(ERROR_TOKEN.into()),
            FrameTarget::Component(id) => match id {
                ComponentId::Plain(s) => Value::String(s),
                ComponentId::Pattern(map) => Value::Object(map.into_iter().collect()),
            },
        };
        let payload = match frame.payload {
            FramePayload::Update(props) => Value::Object(props),
            FramePayload::Error(err) => serde_json::to_value(err).unwrap_or_default(),
            FramePayload::Empty => Value::Object(PropMap::new()),
        };
        WireFrame(target, payload, frame.callback_id)
    }
}

impl TryFrom<WireFrame> for Frame {
    type Error = String;

    fn try_from(WireFrame(target, payload, callback_id): WireFrame) -> std::result::Result<Self, String> {
        let target = match target {
            Value::String(s) if s == INIT_TOKEN => FrameTarget::Init,
            Value::String(s) if s == DONE_TOKEN => FrameTarget::Done,
            Value::String(s) if s == ERROR_TOKEN => FrameTarget::Error,
            Value::String(s) => FrameTarget::Component(ComponentId::Plain(s)),
            Value::Object(map) => FrameTarget::Component(ComponentId::Pattern(map.into_iter().collect())),
            other => return Err(format!("invalid frame target: {other}")),
        };

        let payload = match &target {
            FrameTarget::Init | FrameTarget::Done => FramePayload::Empty,
            FrameTarget::Error => FramePayload::Error(
                serde_json::from_value(payload).map_err(|e| format!("invalid error payload: {e}"))?,
            ),
            FrameTarget::Component(_) => match payload {
                Value::Object(props) => FramePayload::Update(props),
                other => return Err(format!("update payload must be an object, got {other}")),
            },
        };

        Ok(Frame {
            target,
            payload,
            callback_id,
        })
    }
}

/// A single server-sent event record.
#[derive(Debug, Clone, Default)]
pub struct ServerSentEvent {
    pub data: String,
    pub event: Option<String>,
    pub id: Option<u64>,
    pub retry: Option<u64>,
}

impl ServerSentEvent {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn encode(&self) -> String {
        let mut message = format!("data: {}", self.data);
        if let Some(event) = &self.event {
            message.push_str(&format!("\nevent: {event}"));
        }
        if let Some(id) = self.id {
            message.push_str(&format!("\nid: {id}"));
        }
        if let Some(retry) = self.retry {
            message.push_str(&format!("\nretry: {retry}"));
        }
        message.push_str("\n\n");
        message
    }
}

/// Trigger request posted by the client to open a stream.
///
/// On the wire: `{"content": {...inputs, "callback_context": ..., "sse_callback_id": ...}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRequest {
    pub callback_id: CallbackId,
    pub inputs: TriggerPayload,
    pub context: Value,
}

impl TriggerRequest {
    pub fn new(callback_id: CallbackId) -> Self {
        Self {
            callback_id,
            inputs: TriggerPayload::new(),
            context: Value::Object(Default::default()),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Build the JSON request body. The id travels as the connector's stringified id.
    pub fn to_body(&self) -> Value {
        let mut content = self.inputs.clone();
        content.insert(CONTEXT_KEY.into(), self.context.clone());
        content.insert(
            CALLBACK_ID_KEY.into(),
            Value::String(self.callback_id.connector_id().to_key()),
        );
        serde_json::json!({ "content": content })
    }

    /// Parse a request body, stripping the context and id keys from the inputs.
    pub fn from_body(body: Value) -> Result<Self> {
        let Value::Object(mut body) = body else {
            return Err(StreamError::BadRequest("request body must be a JSON object".into()));
        };
        let Some(Value::Object(mut content)) = body.remove("content") else {
            return Err(StreamError::BadRequest("missing `content` object".into()));
        };

        let context = content.remove(CONTEXT_KEY).unwrap_or(Value::Null);
        let reference = content
            .remove(CALLBACK_ID_KEY)
            .ok_or_else(|| StreamError::BadRequest(format!("missing `{CALLBACK_ID_KEY}`")))?;
        let callback_id = parse_connector_reference(&reference)
            .ok_or_else(|| StreamError::BadRequest("callback_id is required".into()))?;

        Ok(Self {
            callback_id,
            inputs: content,
            context,
        })
    }
}
