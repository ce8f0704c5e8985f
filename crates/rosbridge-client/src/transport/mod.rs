//! Transport seam between the connection and the wire.
//!
//! A [`Connector`] opens one session and splits it into a [`FrameSink`]
//! (writer half) and a [`FrameSource`] (reader half), so the single reader
//! can block in [`FrameSource::receive`] while other threads write.

mod websocket;

use rosbridge_config::BridgeEndpoint;

use crate::error::TransportError;

pub use websocket::WebSocketConnector;

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Writer half of an open session.
pub trait FrameSink: Send {
    /// Writes one complete text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the frame cannot be written.
    fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Closes the session and wakes a reader blocked on the paired source.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the close handshake cannot be
    /// written; the session is unusable either way.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Reader half of an open session.
pub trait FrameSource: Send {
    /// Blocks until the next text frame arrives.
    ///
    /// Returns `Ok(None)` once the session has closed cleanly.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the session fails.
    fn receive(&mut self) -> Result<Option<String>, TransportError>;
}

/// Both halves of one session.
pub struct TransportPair {
    /// Writer half.
    pub sink: Box<dyn FrameSink>,
    /// Reader half.
    pub source: Box<dyn FrameSource>,
}

/// Opens sessions to a bridge endpoint.
pub trait Connector: Send + Sync {
    /// Connects and completes the protocol handshake.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] on refusal, DNS failure, or handshake
    /// failure.
    fn connect(&self, endpoint: &BridgeEndpoint) -> Result<TransportPair, TransportError>;
}
