//! Error types surfaced by the rosbridge client.

use std::io;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::action::GoalPhase;

/// Errors returned to callers of the client API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport could not be established or failed while in use.
    #[error("connection to {endpoint} failed: {source}")]
    Connection {
        /// Endpoint the client was connected or connecting to.
        endpoint: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// The connection closed while a request was outstanding.
    #[error("connection to the bridge was closed")]
    ConnectionClosed,

    /// A frame was sent while the connection was not established.
    #[error("not connected to the bridge")]
    NotConnected,

    /// A local wait exceeded its deadline.
    #[error("{operation} timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// Operation that was waiting, e.g. `call_service /add_two_ints`.
        operation: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// The peer reported a failed service call.
    #[error("service {service} failed: {message}")]
    Service {
        /// Service that was called.
        service: String,
        /// Human-readable failure reported by the peer.
        message: String,
        /// Raw payload reported by the peer.
        values: Value,
    },

    /// An action goal reached a terminal phase other than success.
    #[error("action {action} goal {phase}")]
    Action {
        /// Action the goal was sent to.
        action: String,
        /// Terminal phase the goal reached.
        phase: GoalPhase,
        /// Result payload reported by the peer.
        values: Value,
    },

    /// A second reader tried to drain the same connection.
    #[error("the connection is already being read by another thread")]
    ConcurrentRead,

    /// A blocking call was issued from the connection's reader thread.
    #[error("{operation} would block the connection's reader thread")]
    ReentrantBlockingCall {
        /// Blocking operation that was refused.
        operation: &'static str,
    },

    /// An outbound envelope could not be serialised.
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ClientError {
    /// Wraps a transport failure for the given endpoint.
    pub(crate) fn connection(endpoint: impl ToString, source: TransportError) -> Self {
        Self::Connection {
            endpoint: endpoint.to_string(),
            source,
        }
    }

    /// Builds a timeout error for the named operation.
    pub(crate) fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Builds a service failure from the payload the peer returned.
    pub(crate) fn service(service: impl Into<String>, values: Value) -> Self {
        let message = match &values {
            Value::String(text) => text.clone(),
            Value::Null => String::from("no details reported"),
            other => other.to_string(),
        };
        Self::Service {
            service: service.into(),
            message,
            values,
        }
    }

    /// Returns `true` for failures caused by the connection going away.
    #[must_use]
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::ConnectionClosed)
    }
}

/// Transport-layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error while connecting, reading, or writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// WebSocket protocol or handshake failure.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// The handshake could not complete on a blocking socket.
    #[error("WebSocket handshake was interrupted")]
    HandshakeInterrupted,

    /// The peer closed the session.
    #[error("transport closed by peer")]
    Closed,
}

impl From<tungstenite::Error> for TransportError {
    fn from(error: tungstenite::Error) -> Self {
        match error {
            tungstenite::Error::Io(source) => Self::Io(source),
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::Closed
            }
            other => Self::WebSocket(Box::new(other)),
        }
    }
}

/// Reasons an inbound frame could not be decoded.
///
/// Protocol errors are never returned to callers: the router logs them and
/// drops the frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame was not valid JSON text.
    #[error("frame is not valid JSON: {message}")]
    InvalidJson {
        /// Parser message.
        message: String,
    },

    /// The frame was valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The frame has no string `op` field.
    #[error("frame has no `op` discriminator")]
    MissingOp,

    /// The `op` value is not one the client handles.
    #[error("unsupported op '{op}'")]
    UnsupportedOp {
        /// Discriminator found in the frame.
        op: String,
    },

    /// A field required by the operation is absent or has the wrong type.
    #[error("'{op}' frame is missing required field '{field}'")]
    MissingField {
        /// Discriminator found in the frame.
        op: String,
        /// Field that was missing.
        field: &'static str,
    },
}

impl ProtocolError {
    pub(crate) fn missing_field(op: &str, field: &'static str) -> Self {
        Self::MissingField {
            op: op.to_owned(),
            field,
        }
    }
}
