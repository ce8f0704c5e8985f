//! The connection to a rosbridge server.
//!
//! [`Ros`] owns one transport session, the [`Router`], and the id
//! generator. Any thread may send; exactly one thread reads, through
//! [`Ros::run_forever`] or [`Ros::poll_once`], and user callbacks run on that
//! thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rosbridge_config::{BridgeEndpoint, Config, DEFAULT_CALL_TIMEOUT_MS, DEFAULT_GOAL_TIMEOUT_MS};
use tracing::{debug, info, trace, warn};

use crate::codec::{Frame, Operation};
use crate::error::{ClientError, TransportError};
use crate::ids::IdGenerator;
use crate::reader::ReaderSlot;
use crate::router::{Outbound, Router, lock};
use crate::transport::{Connector, FrameSink, FrameSource, WebSocketConnector};

/// Tracing target for connection lifecycle events.
pub(crate) const CONNECTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::connection");

/// Lifecycle state of a [`Ros`] connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No session is open.
    Disconnected,
    /// A session is being opened.
    Connecting,
    /// Frames may be sent and received.
    Connected,
    /// An explicit close is in progress.
    Closing,
}

/// The reader half together with the session it belongs to.
struct Session {
    epoch: u64,
    source: Box<dyn FrameSource>,
}

/// A connection to a rosbridge server.
pub struct Ros {
    endpoint: BridgeEndpoint,
    connector: Box<dyn Connector>,
    call_timeout: Duration,
    goal_timeout: Duration,
    state: Mutex<ConnectionState>,
    connect_lock: Mutex<()>,
    sink: Mutex<Option<Box<dyn FrameSink>>>,
    source: Mutex<Option<Session>>,
    router: Router,
    ids: IdGenerator,
    reader: ReaderSlot,
    closed: AtomicBool,
    epoch: AtomicU64,
}

impl Ros {
    /// Creates a disconnected client for `endpoint` using the WebSocket
    /// transport.
    #[must_use]
    pub fn new(endpoint: BridgeEndpoint) -> Self {
        Self::with_connector(endpoint, Box::new(WebSocketConnector))
    }

    /// Creates a disconnected client that opens sessions through
    /// `connector`.
    #[must_use]
    pub fn with_connector(endpoint: BridgeEndpoint, connector: Box<dyn Connector>) -> Self {
        Self {
            endpoint,
            connector,
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            goal_timeout: Duration::from_millis(DEFAULT_GOAL_TIMEOUT_MS),
            state: Mutex::new(ConnectionState::Disconnected),
            connect_lock: Mutex::new(()),
            sink: Mutex::new(None),
            source: Mutex::new(None),
            router: Router::new(),
            ids: IdGenerator::new(),
            reader: ReaderSlot::default(),
            closed: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    /// Creates a disconnected client from resolved configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.endpoint()).with_timeouts(config.call_timeout(), config.goal_timeout())
    }

    /// Overrides the default service-call and goal timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, call_timeout: Duration, goal_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self.goal_timeout = goal_timeout;
        self
    }

    /// Endpoint this client connects to.
    #[must_use]
    pub const fn endpoint(&self) -> &BridgeEndpoint {
        &self.endpoint
    }

    /// Timeout used by [`crate::ServiceClient::call_default`].
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Default timeout for waiting on action results.
    #[must_use]
    pub const fn goal_timeout(&self) -> Duration {
        self.goal_timeout
    }

    /// Opens the session. Does nothing when already connected.
    ///
    /// After a reconnect, registered subscriptions and service
    /// advertisements are replayed to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connection`] on refusal, DNS failure, or
    /// handshake failure, and the send failure when replaying a
    /// registration breaks the new session; either way the state returns to
    /// [`ConnectionState::Disconnected`].
    pub fn connect(&self) -> Result<(), ClientError> {
        let _serial = lock(&self.connect_lock);
        {
            let mut state = lock(&self.state);
            if *state == ConnectionState::Connected {
                return Ok(());
            }
            *state = ConnectionState::Connecting;
        }
        info!(target: CONNECTION_TARGET, endpoint = %self.endpoint, "connecting to bridge");

        let pair = match self.connector.connect(&self.endpoint) {
            Ok(pair) => pair,
            Err(source) => {
                self.set_state(ConnectionState::Disconnected);
                warn!(
                    target: CONNECTION_TARGET,
                    endpoint = %self.endpoint,
                    error = %source,
                    "connection attempt failed"
                );
                return Err(ClientError::connection(&self.endpoint, source));
            }
        };

        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        *lock(&self.source) = Some(Session {
            epoch,
            source: pair.source,
        });
        *lock(&self.sink) = Some(pair.sink);
        self.closed.store(false, Ordering::Release);
        self.set_state(ConnectionState::Connected);
        info!(target: CONNECTION_TARGET, endpoint = %self.endpoint, epoch, "connected to bridge");

        self.replay_registrations()
    }

    /// Returns `true` while frames may be sent.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Writes one envelope. Each call completes its write before returning,
    /// so envelopes from one caller keep their order.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] outside
    /// [`ConnectionState::Connected`], [`ClientError::Encode`] when the
    /// payload cannot be serialised, and [`ClientError::Connection`] when
    /// the write fails; a failed write tears the connection down.
    pub fn send(&self, operation: &Operation) -> Result<(), ClientError> {
        let text = operation.encode()?;
        let mut sink = lock(&self.sink);
        if self.state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let Some(writer) = sink.as_mut() else {
            return Err(ClientError::NotConnected);
        };
        trace!(target: CONNECTION_TARGET, op = operation.op(), "sending frame");
        match writer.send_text(text) {
            Ok(()) => Ok(()),
            Err(source) => {
                let broken = sink.take();
                drop(sink);
                self.lose_connection(broken, &source);
                Err(ClientError::connection(&self.endpoint, source))
            }
        }
    }

    /// Reads and dispatches frames until the connection closes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConcurrentRead`] when another thread is
    /// already reading, [`ClientError::NotConnected`] when no session is
    /// open, and [`ClientError::Connection`] when the connection is lost.
    /// Returns `Ok(())` after [`Ros::close`].
    pub fn run_forever(&self) -> Result<(), ClientError> {
        let _lease = self.reader.acquire()?;
        debug!(target: CONNECTION_TARGET, "reader loop started");
        while self.read_frame()? {}
        debug!(target: CONNECTION_TARGET, "reader loop stopped");
        Ok(())
    }

    /// Reads and dispatches one frame, blocking until it arrives.
    ///
    /// Returns `Ok(true)` after a frame was handled and `Ok(false)` once the
    /// connection has been closed with [`Ros::close`].
    ///
    /// The polling thread stays the reader between polls, so blocking calls
    /// made from it fail with [`ClientError::ReentrantBlockingCall`] until
    /// another thread starts reading.
    ///
    /// # Errors
    ///
    /// As [`Ros::run_forever`].
    pub fn poll_once(&self) -> Result<bool, ClientError> {
        let _lease = self.reader.acquire_for_poll()?;
        self.read_frame()
    }

    /// Closes the session.
    ///
    /// A blocked reader wakes and returns; every pending call and goal
    /// resolves with [`ClientError::ConnectionClosed`]. Subscriptions and
    /// service handlers stay registered and are replayed by the next
    /// [`Ros::connect`].
    pub fn close(&self) {
        let _serial = lock(&self.connect_lock);
        self.set_state(ConnectionState::Closing);
        self.closed.store(true, Ordering::Release);
        let sink = lock(&self.sink).take();
        if let Some(mut writer) = sink
            && let Err(error) = writer.close()
        {
            debug!(target: CONNECTION_TARGET, %error, "error while closing transport");
        }
        // A blocked reader holds the source; it drops it on wake-up.
        if let Ok(mut source) = self.source.try_lock() {
            source.take();
        }
        let failed = self.router.fail_all(|| ClientError::ConnectionClosed);
        self.set_state(ConnectionState::Disconnected);
        info!(target: CONNECTION_TARGET, endpoint = %self.endpoint, failed, "connection closed");
    }

    /// Number of service calls awaiting a response.
    #[must_use]
    pub fn pending_call_count(&self) -> usize {
        self.router.pending_call_count()
    }

    /// Number of goals that have not reached a terminal phase.
    #[must_use]
    pub fn active_goal_count(&self) -> usize {
        self.router.active_goal_count()
    }

    /// Number of registered topic subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.router.subscription_count()
    }

    pub(crate) const fn router(&self) -> &Router {
        &self.router
    }

    pub(crate) const fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    /// Session counter, bumped by every successful connect.
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub(crate) fn on_reader_thread(&self) -> bool {
        self.reader.is_current()
    }

    /// Refuses blocking operations on the reader thread, where they could
    /// never be woken.
    pub(crate) fn ensure_not_reader(&self, operation: &'static str) -> Result<(), ClientError> {
        if self.on_reader_thread() {
            return Err(ClientError::ReentrantBlockingCall { operation });
        }
        Ok(())
    }

    fn set_state(&self, next: ConnectionState) {
        *lock(&self.state) = next;
    }

    fn read_frame(&self) -> Result<bool, ClientError> {
        let (epoch, received) = {
            let mut source = lock(&self.source);
            let Some(session) = source.as_mut() else {
                return if self.closed.load(Ordering::Acquire) {
                    Ok(false)
                } else {
                    Err(ClientError::NotConnected)
                };
            };
            (session.epoch, session.source.receive())
        };
        match received {
            Ok(Some(text)) => {
                let frame = Frame::decode(text.as_bytes());
                trace!(target: CONNECTION_TARGET, kind = frame.kind(), "received frame");
                self.router.dispatch(frame, self);
                Ok(true)
            }
            Ok(None) => self.end_session(epoch, TransportError::Closed),
            Err(error) => self.end_session(epoch, error),
        }
    }

    fn end_session(&self, epoch: u64, cause: TransportError) -> Result<bool, ClientError> {
        {
            let mut source = lock(&self.source);
            if source.as_ref().is_some_and(|session| session.epoch == epoch) {
                source.take();
            }
        }
        if self.epoch() != epoch {
            debug!(target: CONNECTION_TARGET, epoch, "superseded session ended");
            return Ok(true);
        }
        if self.closed.load(Ordering::Acquire) {
            debug!(target: CONNECTION_TARGET, "reader observed close");
            return Ok(false);
        }
        let broken = lock(&self.sink).take();
        self.lose_connection(broken, &cause);
        Err(ClientError::connection(&self.endpoint, cause))
    }

    fn lose_connection(&self, sink: Option<Box<dyn FrameSink>>, cause: &TransportError) {
        if let Some(mut writer) = sink
            && let Err(error) = writer.close()
        {
            debug!(target: CONNECTION_TARGET, %error, "error while closing broken transport");
        }
        self.set_state(ConnectionState::Disconnected);
        let failed = self.router.fail_all(|| ClientError::ConnectionClosed);
        warn!(
            target: CONNECTION_TARGET,
            endpoint = %self.endpoint,
            error = %cause,
            failed,
            "connection lost"
        );
    }

    fn replay_registrations(&self) -> Result<(), ClientError> {
        let replay: Vec<Operation> = self
            .router
            .subscription_replay()
            .into_iter()
            .chain(self.router.service_replay())
            .collect();
        if replay.is_empty() {
            return Ok(());
        }
        debug!(
            target: CONNECTION_TARGET,
            count = replay.len(),
            "replaying registrations"
        );
        for operation in &replay {
            if let Err(error) = self.send(operation) {
                warn!(
                    target: CONNECTION_TARGET,
                    op = operation.op(),
                    %error,
                    "failed to replay registration"
                );
                return Err(error);
            }
        }
        Ok(())
    }
}

impl Outbound for Ros {
    fn send_operation(&self, operation: &Operation) -> Result<(), ClientError> {
        self.send(operation)
    }
}

impl Drop for Ros {
    fn drop(&mut self) {
        if self.state() != ConnectionState::Disconnected {
            self.close();
        }
    }
}
