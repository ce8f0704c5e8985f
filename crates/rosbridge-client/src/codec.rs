//! Translation between typed protocol operations and wire envelopes.
//!
//! Outbound envelopes are modelled by [`Operation`], serialised with the
//! `op` discriminator as a serde tag. Inbound envelopes are decoded once into
//! a [`Frame`]; decoding never fails, malformed input becomes
//! [`Frame::Unknown`] carrying the [`ProtocolError`] that explains why.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::ids::{GoalId, RequestId};
use crate::message::Message;

/// An outbound protocol operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Start receiving messages published on `topic`.
    Subscribe {
        /// Subscription id.
        id: String,
        /// Topic name.
        topic: String,
        /// Message type, e.g. `std_msgs/String`.
        #[serde(rename = "type")]
        msg_type: String,
        /// Minimum interval between delivered messages, in milliseconds.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        throttle_rate: Option<u32>,
        /// Number of messages the bridge buffers for this subscription.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        queue_length: Option<u32>,
    },
    /// Stop the subscription `id`.
    Unsubscribe {
        /// Subscription id.
        id: String,
        /// Topic name.
        topic: String,
    },
    /// Declare this client as a publisher of `topic`.
    Advertise {
        /// Advertisement id.
        id: String,
        /// Topic name.
        topic: String,
        /// Message type.
        #[serde(rename = "type")]
        msg_type: String,
    },
    /// Withdraw a publisher advertisement.
    Unadvertise {
        /// Advertisement id.
        id: String,
        /// Topic name.
        topic: String,
    },
    /// Publish one message on `topic`.
    Publish {
        /// Advertisement id, when the topic was advertised.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Topic name.
        topic: String,
        /// Payload.
        msg: Message,
    },
    /// Invoke a remote service.
    CallService {
        /// Request id echoed by the peer's response.
        id: String,
        /// Service name.
        service: String,
        /// Request payload.
        args: Message,
        /// Service type, when known.
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        service_type: Option<String>,
    },
    /// Answer a request addressed to a service this client advertised.
    ServiceResponse {
        /// Request id taken from the inbound `call_service`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Service name.
        service: String,
        /// Response payload, or an error string when `result` is false.
        values: Value,
        /// Whether the handler succeeded.
        result: bool,
    },
    /// Register this client as the provider of `service`.
    AdvertiseService {
        /// Service name.
        service: String,
        /// Service type.
        #[serde(rename = "type")]
        service_type: String,
    },
    /// Withdraw a service advertisement.
    UnadvertiseService {
        /// Service name.
        service: String,
    },
    /// Submit a goal to an action server.
    SendActionGoal {
        /// Goal id.
        id: String,
        /// Action name.
        action: String,
        /// Action type.
        action_type: String,
        /// Goal payload.
        args: Message,
        /// Whether the peer should stream feedback.
        feedback: bool,
    },
    /// Ask the action server to cancel a goal.
    CancelActionGoal {
        /// Goal id.
        id: String,
        /// Action name.
        action: String,
    },
}

impl Operation {
    /// Wire discriminator for this operation.
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Advertise { .. } => "advertise",
            Self::Unadvertise { .. } => "unadvertise",
            Self::Publish { .. } => "publish",
            Self::CallService { .. } => "call_service",
            Self::ServiceResponse { .. } => "service_response",
            Self::AdvertiseService { .. } => "advertise_service",
            Self::UnadvertiseService { .. } => "unadvertise_service",
            Self::SendActionGoal { .. } => "send_action_goal",
            Self::CancelActionGoal { .. } => "cancel_action_goal",
        }
    }

    /// Encodes the envelope as JSON text.
    ///
    /// # Errors
    ///
    /// Returns the serialiser error when the payload cannot be represented
    /// as JSON.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Encodes the envelope as a structured value.
    ///
    /// # Errors
    ///
    /// Returns the serialiser error when the payload cannot be represented
    /// as JSON.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Action goal status codes as reported by `action_msgs/GoalStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoalStatusCode {
    /// Status not known.
    Unknown,
    /// Goal accepted and awaiting execution.
    Accepted,
    /// Goal is being processed.
    Executing,
    /// Cancellation requested, not yet acknowledged.
    Canceling,
    /// Goal completed successfully.
    Succeeded,
    /// Goal cancelled.
    Canceled,
    /// Goal aborted by the server.
    Aborted,
}

impl GoalStatusCode {
    /// Maps a numeric wire code; out-of-range codes read as
    /// [`GoalStatusCode::Unknown`].
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Accepted,
            2 => Self::Executing,
            3 => Self::Canceling,
            4 => Self::Succeeded,
            5 => Self::Canceled,
            6 => Self::Aborted,
            _ => Self::Unknown,
        }
    }

    /// Numeric wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Accepted => 1,
            Self::Executing => 2,
            Self::Canceling => 3,
            Self::Succeeded => 4,
            Self::Canceled => 5,
            Self::Aborted => 6,
        }
    }
}

/// Severity attached to a bridge `status` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusLevel {
    /// The bridge rejected or failed an operation.
    Error,
    /// Something unexpected that the bridge tolerated.
    Warning,
    /// Informational notice.
    Info,
    /// Status reporting disabled.
    None,
}

impl StatusLevel {
    fn parse(level: &str) -> Self {
        match level.to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warning" | "warn" => Self::Warning,
            "none" => Self::None,
            _ => Self::Info,
        }
    }
}

/// A decoded inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A message published on a subscribed topic.
    TopicMessage {
        /// Topic name.
        topic: String,
        /// Payload.
        msg: Message,
    },
    /// The answer to one of this client's service calls.
    ServiceResponse {
        /// Request id of the call being answered.
        id: RequestId,
        /// Service name, when the peer included it.
        service: Option<String>,
        /// Whether the call succeeded.
        result: bool,
        /// Response payload or failure description.
        values: Value,
    },
    /// A request addressed to a service this client advertised.
    ServiceRequest {
        /// Request id to echo in the response.
        id: Option<String>,
        /// Service name.
        service: String,
        /// Request payload.
        args: Message,
    },
    /// Feedback for an active goal.
    ActionFeedback {
        /// Goal id.
        id: GoalId,
        /// Feedback payload.
        values: Message,
    },
    /// The final result for a goal.
    ActionResult {
        /// Goal id.
        id: GoalId,
        /// Terminal status reported by the server.
        status: GoalStatusCode,
        /// Whether the action server reported success.
        result: bool,
        /// Result payload.
        values: Value,
    },
    /// A goal status transition without payload.
    ActionGoalStatus {
        /// Goal id.
        id: GoalId,
        /// Reported status.
        status: GoalStatusCode,
    },
    /// A diagnostic from the bridge itself.
    Status {
        /// Severity.
        level: StatusLevel,
        /// Diagnostic text.
        msg: String,
        /// Id of the operation the diagnostic refers to, if any.
        id: Option<String>,
    },
    /// An envelope that could not be decoded.
    Unknown {
        /// Discriminator, when one was present.
        op: Option<String>,
        /// Why decoding failed.
        reason: ProtocolError,
    },
}

impl Frame {
    /// Decodes raw frame text.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Self::from_value(value),
            Err(error) => Self::Unknown {
                op: None,
                reason: ProtocolError::InvalidJson {
                    message: error.to_string(),
                },
            },
        }
    }

    /// Decodes an already-parsed envelope.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let Value::Object(object) = value else {
            return Self::Unknown {
                op: None,
                reason: ProtocolError::NotAnObject,
            };
        };
        let mut envelope = match Envelope::new(object) {
            Ok(envelope) => envelope,
            Err(reason) => return Self::Unknown { op: None, reason },
        };
        match envelope.decode() {
            Ok(frame) => frame,
            Err(reason) => Self::Unknown {
                op: Some(envelope.op),
                reason,
            },
        }
    }

    /// Short name of the frame kind, used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TopicMessage { .. } => "publish",
            Self::ServiceResponse { .. } => "service_response",
            Self::ServiceRequest { .. } => "call_service",
            Self::ActionFeedback { .. } => "action_feedback",
            Self::ActionResult { .. } => "action_result",
            Self::ActionGoalStatus { .. } => "action_goal_status",
            Self::Status { .. } => "status",
            Self::Unknown { .. } => "unknown",
        }
    }
}

struct Envelope {
    op: String,
    fields: Map<String, Value>,
}

impl Envelope {
    fn new(mut fields: Map<String, Value>) -> Result<Self, ProtocolError> {
        match fields.remove("op") {
            Some(Value::String(op)) => Ok(Self { op, fields }),
            _ => Err(ProtocolError::MissingOp),
        }
    }

    fn decode(&mut self) -> Result<Frame, ProtocolError> {
        match self.op.as_str() {
            "publish" => Ok(Frame::TopicMessage {
                topic: self.string("topic")?,
                msg: Message::from(self.value("msg")),
            }),
            "service_response" => Ok(Frame::ServiceResponse {
                id: RequestId::new(self.id()?),
                service: self.optional_string("service"),
                result: self.flag("result", true),
                values: self.value("values"),
            }),
            "call_service" => Ok(Frame::ServiceRequest {
                id: self.optional_id(),
                service: self.string("service")?,
                args: Message::from(self.value("args")),
            }),
            "action_feedback" => Ok(Frame::ActionFeedback {
                id: GoalId::new(self.id()?),
                values: Message::from(self.value("values")),
            }),
            "action_result" => Ok(Frame::ActionResult {
                id: GoalId::new(self.id()?),
                status: self.status(),
                result: self.flag("result", true),
                values: self.value("values"),
            }),
            "action_goal_status" => Ok(Frame::ActionGoalStatus {
                id: GoalId::new(self.id()?),
                status: self.status(),
            }),
            "status" => Ok(Frame::Status {
                level: StatusLevel::parse(
                    self.optional_string("level").as_deref().unwrap_or("info"),
                ),
                msg: self.optional_string("msg").unwrap_or_default(),
                id: self.optional_id(),
            }),
            other => Err(ProtocolError::UnsupportedOp {
                op: other.to_owned(),
            }),
        }
    }

    fn value(&mut self, field: &str) -> Value {
        self.fields.remove(field).unwrap_or(Value::Null)
    }

    fn optional_string(&mut self, field: &str) -> Option<String> {
        match self.fields.remove(field) {
            Some(Value::String(text)) => Some(text),
            _ => None,
        }
    }

    fn string(&mut self, field: &'static str) -> Result<String, ProtocolError> {
        self.optional_string(field)
            .ok_or_else(|| ProtocolError::missing_field(&self.op, field))
    }

    fn optional_id(&mut self) -> Option<String> {
        match self.fields.remove("id") {
            Some(Value::String(text)) => Some(text),
            Some(Value::Number(number)) => Some(number.to_string()),
            _ => None,
        }
    }

    fn id(&mut self) -> Result<String, ProtocolError> {
        self.optional_id()
            .ok_or_else(|| ProtocolError::missing_field(&self.op, "id"))
    }

    fn flag(&mut self, field: &str, default: bool) -> bool {
        match self.fields.remove(field) {
            Some(Value::Bool(flag)) => flag,
            _ => default,
        }
    }

    fn status(&mut self) -> GoalStatusCode {
        self.fields
            .remove("status")
            .and_then(|status| status.as_i64())
            .map_or(GoalStatusCode::Unknown, GoalStatusCode::from_code)
    }
}
