//! Blocking WebSocket transport over a TCP stream.
//!
//! The handshake runs on one stream; the writer half then wraps a clone of
//! the same socket. Both halves share a write lock so a frame written by the
//! sink never interleaves with a pong queued by the reader.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};

use rosbridge_config::BridgeEndpoint;
use tracing::{debug, warn};
use tungstenite::handshake::HandshakeError;
use tungstenite::handshake::client::ClientHandshake;
use tungstenite::protocol::{Role, WebSocket};

use super::{Connector, FrameSink, FrameSource, TRANSPORT_TARGET, TransportPair};
use crate::error::TransportError;

/// Production [`Connector`] speaking WebSocket over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, endpoint: &BridgeEndpoint) -> Result<TransportPair, TransportError> {
        let stream = TcpStream::connect(endpoint.authority())?;
        stream.set_nodelay(true)?;
        let writer_stream = stream.try_clone()?;
        let write_lock = Arc::new(Mutex::new(()));

        let (reader, response) = tungstenite::client(
            endpoint.url(),
            SharedStream::new(stream, Arc::clone(&write_lock)),
        )
        .map_err(handshake_error)?;
        debug!(
            target: TRANSPORT_TARGET,
            endpoint = %endpoint,
            status = response.status().as_u16(),
            "WebSocket handshake complete"
        );

        let writer = WebSocket::from_raw_socket(
            SharedStream::new(writer_stream, write_lock),
            Role::Client,
            None,
        );
        Ok(TransportPair {
            sink: Box::new(WebSocketSink { socket: writer }),
            source: Box::new(WebSocketSource { socket: reader }),
        })
    }
}

fn handshake_error(error: HandshakeError<ClientHandshake<SharedStream>>) -> TransportError {
    match error {
        HandshakeError::Failure(source) => TransportError::from(source),
        HandshakeError::Interrupted(_) => TransportError::HandshakeInterrupted,
    }
}

/// TCP stream whose writes are serialised through a shared lock.
struct SharedStream {
    stream: TcpStream,
    write_lock: Arc<Mutex<()>>,
}

impl SharedStream {
    const fn new(stream: TcpStream, write_lock: Arc<Mutex<()>>) -> Self {
        Self { stream, write_lock }
    }

    fn shutdown(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}

impl Read for SharedStream {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buffer)
    }
}

impl Write for SharedStream {
    fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.stream.write_all(buffer)?;
        Ok(buffer.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

struct WebSocketSink {
    socket: WebSocket<SharedStream>,
}

impl FrameSink for WebSocketSink {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.socket.send(tungstenite::Message::text(text))?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let handshake = self
            .socket
            .close(None)
            .and_then(|()| self.socket.flush());
        // Shutting the socket down unblocks the reader half.
        let shutdown = self.socket.get_ref().shutdown();
        match (handshake, shutdown) {
            (Ok(()) | Err(tungstenite::Error::ConnectionClosed), Ok(())) => Ok(()),
            (Err(error), _) => Err(TransportError::from(error)),
            (_, Err(error)) => Err(TransportError::Io(error)),
        }
    }
}

struct WebSocketSource {
    socket: WebSocket<SharedStream>,
}

impl FrameSource for WebSocketSource {
    fn receive(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.socket.read() {
                Ok(tungstenite::Message::Text(text)) => return Ok(Some(text.as_str().to_owned())),
                Ok(tungstenite::Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Ok(Some(text)),
                    Err(error) => warn!(
                        target: TRANSPORT_TARGET,
                        %error,
                        "dropping binary frame that is not UTF-8"
                    ),
                },
                Ok(tungstenite::Message::Close(frame)) => {
                    debug!(target: TRANSPORT_TARGET, ?frame, "peer closed the session");
                    return Ok(None);
                }
                Ok(_) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Ok(None);
                }
                Err(error) => return Err(TransportError::from(error)),
            }
        }
    }
}
