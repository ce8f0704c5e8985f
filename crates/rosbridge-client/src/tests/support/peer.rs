//! In-memory stand-in for a rosbridge server.
//!
//! The [`Peer`] records every envelope the client writes and lets tests push
//! frames back through the session the client currently holds.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use rosbridge_config::BridgeEndpoint;
use serde_json::Value;

use super::PATIENCE;
use crate::error::TransportError;
use crate::router::lock;
use crate::transport::{Connector, FrameSink, FrameSource, TransportPair};

enum Inbound {
    Text(String),
    Closed,
    Reset,
}

/// Inbound half of the session the client currently holds.
struct SessionLink {
    inbound: Sender<Inbound>,
    live: Arc<AtomicBool>,
}

#[derive(Default)]
struct Journal {
    frames: Vec<Value>,
    claimed: Vec<bool>,
}

#[derive(Default)]
struct PeerState {
    journal: Mutex<Journal>,
    arrived: Condvar,
    session: Mutex<Option<SessionLink>>,
    connections: AtomicUsize,
    refusing: AtomicBool,
    failing_writes: AtomicBool,
}

/// Handle to the in-memory bridge. Clones share the same state.
#[derive(Clone, Default)]
pub struct Peer {
    state: Arc<PeerState>,
}

impl Peer {
    /// Creates a bridge that accepts connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector opening sessions to this bridge.
    #[must_use]
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector { peer: self.clone() }
    }

    /// Makes subsequent connection attempts fail with a refusal.
    pub fn refuse_connections(&self, refusing: bool) {
        self.state.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Makes every client write fail as if the socket broke mid-send.
    pub fn fail_writes(&self, failing: bool) {
        self.state.failing_writes.store(failing, Ordering::SeqCst);
    }

    /// Number of sessions opened so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Pushes a JSON frame to the client.
    pub fn inject(&self, frame: &Value) {
        self.inject_text(frame.to_string());
    }

    /// Pushes raw text to the client.
    pub fn inject_text(&self, text: impl Into<String>) {
        let session = lock(&self.state.session);
        let link = session.as_ref().expect("no open session to inject into");
        link.inbound
            .send(Inbound::Text(text.into()))
            .expect("client dropped the session source");
    }

    /// Breaks the current session as if the network failed.
    pub fn drop_connection(&self) {
        if let Some(link) = lock(&self.state.session).take() {
            link.live.store(false, Ordering::SeqCst);
            let _ = link.inbound.send(Inbound::Reset);
        }
    }

    /// Every envelope the client has written, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<Value> {
        lock(&self.state.journal).frames.clone()
    }

    /// The `op` of every envelope the client has written.
    #[must_use]
    pub fn sent_ops(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|frame| frame["op"].as_str().unwrap_or_default().to_owned())
            .collect()
    }

    /// Number of envelopes written with `op`.
    #[must_use]
    pub fn count_op(&self, op: &str) -> usize {
        self.sent().iter().filter(|frame| frame["op"] == op).count()
    }

    /// Waits for the oldest unclaimed envelope with `op` and claims it.
    ///
    /// # Panics
    ///
    /// Panics when none arrives in time.
    pub fn wait_for_op(&self, op: &str) -> Value {
        let deadline = Instant::now() + PATIENCE;
        let mut journal = lock(&self.state.journal);
        loop {
            let found = journal
                .frames
                .iter()
                .zip(&journal.claimed)
                .position(|(frame, claimed)| !claimed && frame["op"] == op);
            if let Some(index) = found {
                journal.claimed[index] = true;
                return journal.frames[index].clone();
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            assert!(
                !remaining.is_zero(),
                "timed out waiting for `{op}`; sent {:?}",
                journal.frames
            );
            journal = self
                .state
                .arrived
                .wait_timeout(journal, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Answers the next `op` envelope with the frame `respond` builds from
    /// it, on a helper thread. Joining yields the request.
    pub fn answer_next<F>(&self, op: &'static str, respond: F) -> JoinHandle<Value>
    where
        F: FnOnce(&Value) -> Value + Send + 'static,
    {
        let peer = self.clone();
        thread::spawn(move || {
            let request = peer.wait_for_op(op);
            peer.inject(&respond(&request));
            request
        })
    }

    fn record(&self, text: &str) {
        let frame = serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()));
        let mut journal = lock(&self.state.journal);
        journal.frames.push(frame);
        journal.claimed.push(false);
        self.state.arrived.notify_all();
    }
}

/// Connector opening in-memory sessions to a [`Peer`].
pub struct MemoryConnector {
    peer: Peer,
}

impl Connector for MemoryConnector {
    fn connect(&self, _endpoint: &BridgeEndpoint) -> Result<TransportPair, TransportError> {
        let state = &self.peer.state;
        if state.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "bridge refused the connection",
            )));
        }
        let (inbound, receiver) = mpsc::channel();
        let live = Arc::new(AtomicBool::new(true));
        *lock(&state.session) = Some(SessionLink {
            inbound: inbound.clone(),
            live: Arc::clone(&live),
        });
        state.connections.fetch_add(1, Ordering::SeqCst);
        Ok(TransportPair {
            sink: Box::new(MemorySink {
                peer: self.peer.clone(),
                inbound,
                live,
            }),
            source: Box::new(MemorySource { inbound: receiver }),
        })
    }
}

struct MemorySink {
    peer: Peer,
    inbound: Sender<Inbound>,
    live: Arc<AtomicBool>,
}

impl FrameSink for MemorySink {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if !self.live.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.peer.state.failing_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "bridge stopped accepting frames",
            )));
        }
        self.peer.record(&text);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.live.store(false, Ordering::SeqCst);
        let _ = self.inbound.send(Inbound::Closed);
        Ok(())
    }
}

struct MemorySource {
    inbound: Receiver<Inbound>,
}

impl FrameSource for MemorySource {
    fn receive(&mut self) -> Result<Option<String>, TransportError> {
        match self.inbound.recv() {
            Ok(Inbound::Text(text)) => Ok(Some(text)),
            Ok(Inbound::Closed) | Err(_) => Ok(None),
            Ok(Inbound::Reset) => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "bridge reset the connection",
            ))),
        }
    }
}
