//! BDD test world wiring a connection to an in-memory bridge.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use super::{Bridge, PATIENCE, Received, wait_until};
use crate::action::{ActionClient, GoalHandle, GoalOutcome};
use crate::error::ClientError;
use crate::message::Message;
use crate::service::ServiceClient;
use crate::topic::Topic;

const MARKER_TOPIC: &str = "/test/marker";

/// Shared state exercised by BDD step implementations.
pub struct TestWorld {
    /// Connection and peer under test.
    pub bridge: Bridge,
    /// Topic handle created by the scenario.
    pub topic: Option<Topic<'static>>,
    /// Messages delivered to the scenario's subscription.
    pub received: Received,
    /// Feedback delivered for the scenario's goal.
    pub feedback: Received,
    /// Outcome of the last blocking service call.
    pub call_result: Option<Result<Message, ClientError>>,
    /// How long the scenario's call blocked.
    pub call_elapsed: Option<Duration>,
    /// Service call running on a helper thread.
    pub background_call: Option<JoinHandle<Result<Message, ClientError>>>,
    /// Goal submitted by the scenario.
    pub goal: Option<GoalHandle<'static>>,
    /// Outcome of waiting on the goal.
    pub goal_outcome: Option<Result<GoalOutcome, ClientError>>,
    marker: Topic<'static>,
    marker_seen: Received,
    markers_sent: usize,
}

impl TestWorld {
    /// Builds a world around a connected client with a running reader.
    #[must_use]
    pub fn new() -> Self {
        let bridge = Bridge::running();
        let marker = Topic::new(bridge.ros, MARKER_TOPIC, "std_msgs/Int32");
        let marker_seen = Received::default();
        marker
            .subscribe(marker_seen.callback())
            .expect("marker subscription should succeed");
        Self {
            bridge,
            topic: None,
            received: Received::default(),
            feedback: Received::default(),
            call_result: None,
            call_elapsed: None,
            background_call: None,
            goal: None,
            goal_outcome: None,
            marker,
            marker_seen,
            markers_sent: 0,
        }
    }

    /// Subscribes the scenario's topic handle to `name`.
    pub fn subscribe(&mut self, name: &str) {
        let topic = Topic::new(self.bridge.ros, name, "std_msgs/Int32");
        topic
            .subscribe(self.received.callback())
            .expect("subscription should succeed");
        self.topic = Some(topic);
    }

    /// The scenario's topic handle.
    ///
    /// # Panics
    ///
    /// Panics when no step has created one.
    #[must_use]
    pub fn topic(&self) -> &Topic<'static> {
        self.topic.as_ref().expect("no topic handle in this scenario")
    }

    /// Publishes `data` values `1..=count` from the bridge on `topic`.
    pub fn publish_from_bridge(&self, topic: &str, count: i64) {
        for data in 1..=count {
            self.bridge.peer.inject(&json!({
                "op": "publish",
                "topic": topic,
                "msg": {"data": data}
            }));
        }
    }

    /// Blocks until the reader has handled every frame injected so far.
    pub fn flush(&mut self) {
        self.markers_sent += 1;
        self.publish_marker();
        let expected = self.markers_sent;
        assert!(
            wait_until(|| self.marker_seen.count() >= expected),
            "reader did not drain injected frames"
        );
    }

    fn publish_marker(&self) {
        self.bridge.peer.inject(&json!({
            "op": "publish",
            "topic": self.marker.name(),
            "msg": {"data": self.markers_sent}
        }));
    }

    /// Calls `service` with `a` and `b`, storing the outcome.
    pub fn call_add(&mut self, service: &str, a: i64, b: i64, timeout: Duration) {
        let client = ServiceClient::new(self.bridge.ros, service, "example_interfaces/AddTwoInts");
        let request = Message::new().with("a", a).with("b", b);
        let started = Instant::now();
        self.call_result = Some(client.call(&request, timeout));
        self.call_elapsed = Some(started.elapsed());
    }

    /// Starts a call to `service` on a helper thread and waits until its
    /// envelope reaches the bridge.
    pub fn call_in_background(&mut self, service: &str) {
        let client = ServiceClient::new(self.bridge.ros, service, "std_srvs/Trigger");
        self.background_call = Some(thread::spawn(move || {
            client.call(&Message::new(), Duration::from_secs(30))
        }));
        self.bridge.peer.wait_for_op("call_service");
    }

    /// Submits a goal to `action` with feedback recorded.
    pub fn submit_goal(&mut self, action: &str) {
        let client = ActionClient::new(
            self.bridge.ros,
            action,
            "example_interfaces/action/Fibonacci",
        );
        let goal = Message::new().with("order", 5);
        let handle = client
            .submit_goal_with_feedback(&goal, self.feedback.callback())
            .expect("goal submission should succeed");
        self.goal = Some(handle);
    }

    /// The submitted goal.
    ///
    /// # Panics
    ///
    /// Panics when no goal was submitted.
    #[must_use]
    pub fn goal(&self) -> &GoalHandle<'static> {
        self.goal.as_ref().expect("no goal in this scenario")
    }

    /// Sends an action frame for the submitted goal from the bridge.
    pub fn goal_frame(&self, op: &str, extra: Value) {
        let mut frame = json!({"op": op, "id": self.goal().id().as_str()});
        if let (Some(target), Value::Object(fields)) = (frame.as_object_mut(), extra) {
            target.extend(fields);
        }
        self.bridge.peer.inject(&frame);
    }

    /// Waits for the submitted goal to finish.
    pub fn await_goal(&mut self) {
        let handle = self.goal.take().expect("no goal in this scenario");
        self.goal_outcome = Some(handle.wait(Some(PATIENCE)));
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}
