//! Shared fixtures and helpers for connection tests.

mod peer;
mod world;

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rosbridge_config::BridgeEndpoint;
use rstest::fixture;

use crate::error::ClientError;
use crate::message::Message;
use crate::router::lock;
use crate::Ros;

pub use peer::Peer;
pub use world::TestWorld;

/// How long helpers wait for the client before failing the test.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Call timeout configured on every test connection.
pub const CALL_TIMEOUT: Duration = Duration::from_millis(300);

/// A leaked connection wired to an in-memory peer, plus its reader thread.
pub struct Bridge {
    /// Connection under test.
    pub ros: &'static Ros,
    /// The in-memory bridge on the other end.
    pub peer: Peer,
    reader: Option<JoinHandle<Result<(), ClientError>>>,
}

impl Bridge {
    /// Creates a connection that has not connected yet.
    #[must_use]
    pub fn disconnected() -> Self {
        let peer = Peer::new();
        let ros = Ros::with_connector(
            BridgeEndpoint::new("bridge.test", 9090),
            Box::new(peer.connector()),
        )
        .with_timeouts(CALL_TIMEOUT, Duration::from_secs(2));
        Self {
            ros: Box::leak(Box::new(ros)),
            peer,
            reader: None,
        }
    }

    /// Creates a connected connection with its reader running.
    #[must_use]
    pub fn running() -> Self {
        let mut bridge = Self::disconnected();
        bridge.ros.connect().expect("in-memory connect should succeed");
        bridge.start_reader();
        bridge
    }

    /// Spawns the reader loop.
    pub fn start_reader(&mut self) {
        let ros = self.ros;
        self.reader = Some(thread::spawn(move || ros.run_forever()));
    }

    /// Waits for the reader loop to return.
    pub fn join_reader(&mut self) -> Option<Result<(), ClientError>> {
        self.reader
            .take()
            .map(|handle| handle.join().expect("reader thread panicked"))
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.ros.close();
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

/// Connection with a running reader.
#[fixture]
pub fn bridge() -> Bridge {
    Bridge::running()
}

/// Polls `condition` until it holds or [`PATIENCE`] runs out.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Shared log of every message a callback saw.
#[derive(Clone, Default)]
pub struct Received {
    seen: Arc<Mutex<Vec<Message>>>,
}

impl Received {
    /// Callback appending each message to the log.
    pub fn callback(&self) -> impl FnMut(&Message) + Send + 'static {
        let seen = Arc::clone(&self.seen);
        move |message: &Message| lock(&seen).push(message.clone())
    }

    /// Messages seen so far.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        lock(&self.seen).clone()
    }

    /// `data` values of the messages seen so far.
    #[must_use]
    pub fn data(&self) -> Vec<i64> {
        self.messages()
            .iter()
            .map(|message| message.get("data").as_i64())
            .collect()
    }

    /// Number of messages seen so far.
    #[must_use]
    pub fn count(&self) -> usize {
        lock(&self.seen).len()
    }
}
