//! Behavioural tests for the connection using `rstest-bdd`.

use std::cell::RefCell;
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::json;

use crate::error::ClientError;
use crate::tests::support::{CALL_TIMEOUT, TestWorld};

#[fixture]
fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}

#[given("a connected client")]
fn given_connected(world: &RefCell<TestWorld>) {
    assert!(world.borrow().bridge.ros.is_connected());
}

#[given("a subscription to \"{topic}\"")]
fn given_subscription(world: &RefCell<TestWorld>, topic: String) {
    world.borrow_mut().subscribe(&topic);
}

#[given("a bridge that answers \"{service}\" with sum {sum}")]
fn given_answering_bridge(world: &RefCell<TestWorld>, service: String, sum: i64) {
    let world = world.borrow();
    let responder = world.bridge.peer.answer_next("call_service", move |request| {
        json!({
            "op": "service_response",
            "id": request["id"],
            "service": service,
            "values": {"sum": sum},
            "result": true
        })
    });
    drop(responder);
}

#[given("a call to \"{service}\" is waiting")]
fn given_waiting_call(world: &RefCell<TestWorld>, service: String) {
    world.borrow_mut().call_in_background(&service);
}

#[when("the bridge publishes {count} messages on \"{topic}\"")]
fn when_bridge_publishes(world: &RefCell<TestWorld>, count: i64, topic: String) {
    let mut world = world.borrow_mut();
    world.publish_from_bridge(&topic, count);
    world.flush();
}

#[when("the client calls \"{service}\" with {a} and {b}")]
fn when_client_calls(world: &RefCell<TestWorld>, service: String, a: i64, b: i64) {
    world.borrow_mut().call_add(&service, a, b, CALL_TIMEOUT);
}

#[when("the client calls \"{service}\" with a {millis} millisecond timeout")]
fn when_client_calls_with_timeout(world: &RefCell<TestWorld>, service: String, millis: u64) {
    world
        .borrow_mut()
        .call_add(&service, 3, 5, Duration::from_millis(millis));
}

#[when("the client submits a goal to \"{action}\"")]
fn when_goal_submitted(world: &RefCell<TestWorld>, action: String) {
    world.borrow_mut().submit_goal(&action);
}

#[when("the bridge sends {count} feedback messages for the goal")]
fn when_bridge_sends_feedback(world: &RefCell<TestWorld>, count: i64) {
    let world = world.borrow();
    for data in 1..=count {
        world.goal_frame("action_feedback", json!({"values": {"data": data}}));
    }
}

#[when("the bridge reports the goal succeeded")]
fn when_goal_succeeds(world: &RefCell<TestWorld>) {
    world.borrow().goal_frame(
        "action_result",
        json!({"status": 4, "result": true, "values": {"sequence": [0, 1, 1, 2, 3]}}),
    );
}

#[when("the bridge reports goal status {status}")]
fn when_goal_status(world: &RefCell<TestWorld>, status: i64) {
    world
        .borrow()
        .goal_frame("action_goal_status", json!({"status": status}));
}

#[when("the client unsubscribes")]
fn when_client_unsubscribes(world: &RefCell<TestWorld>) {
    world
        .borrow()
        .topic()
        .unsubscribe()
        .expect("unsubscribe should succeed");
}

#[when("the connection is closed")]
fn when_connection_closed(world: &RefCell<TestWorld>) {
    world.borrow().bridge.ros.close();
}

#[then("the subscriber sees data 1, 2, 3 in order")]
fn then_sees_in_order(world: &RefCell<TestWorld>) {
    assert_eq!(world.borrow().received.data(), vec![1, 2, 3]);
}

#[then("the subscriber saw no messages")]
fn then_saw_nothing(world: &RefCell<TestWorld>) {
    assert_eq!(world.borrow().received.count(), 0);
}

#[then("the call returns sum {sum}")]
fn then_call_returns(world: &RefCell<TestWorld>, sum: i64) {
    let world = world.borrow();
    match world.call_result.as_ref().expect("no call was made") {
        Ok(response) => assert_eq!(response.get("sum").as_i64(), sum),
        Err(error) => panic!("call failed: {error}"),
    }
}

#[then("the call fails with a timeout")]
fn then_call_times_out(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    let outcome = world.call_result.as_ref().expect("no call was made");
    assert!(
        matches!(outcome, Err(ClientError::Timeout { .. })),
        "expected a timeout, got {outcome:?}"
    );
}

#[then("the call fails with a timeout after at least {millis} milliseconds")]
fn then_call_times_out_after(world: &RefCell<TestWorld>, millis: u64) {
    then_call_times_out(world);
    let elapsed = world.borrow().call_elapsed.expect("no call was made");
    assert!(
        elapsed >= Duration::from_millis(millis),
        "call returned after {elapsed:?}"
    );
}

#[then("no call is pending")]
fn then_no_call_pending(world: &RefCell<TestWorld>) {
    assert_eq!(world.borrow().bridge.ros.pending_call_count(), 0);
}

#[then("the goal ends in phase \"{phase}\"")]
fn then_goal_ends(world: &RefCell<TestWorld>, phase: String) {
    let mut world = world.borrow_mut();
    world.await_goal();
    match world.goal_outcome.as_ref().expect("goal was not awaited") {
        Ok(outcome) => assert_eq!(outcome.phase.to_string(), phase),
        Err(error) => panic!("goal failed: {error}"),
    }
}

#[then("the feedback callback saw {count} messages")]
fn then_feedback_count(world: &RefCell<TestWorld>, count: usize) {
    assert_eq!(world.borrow().feedback.count(), count);
}

#[then("the goal phase is \"{phase}\"")]
fn then_goal_phase(world: &RefCell<TestWorld>, phase: String) {
    let mut world = world.borrow_mut();
    world.flush();
    let current = world.goal().phase().map(|current| current.to_string());
    assert_eq!(current.as_deref(), Some(phase.as_str()));
}

#[then("the bridge received {count} \"{op}\" envelopes")]
fn then_bridge_received(world: &RefCell<TestWorld>, count: usize, op: String) {
    assert_eq!(world.borrow().bridge.peer.count_op(&op), count);
}

#[then("the waiting call fails because the connection closed")]
fn then_waiting_call_closed(world: &RefCell<TestWorld>) {
    let handle = world
        .borrow_mut()
        .background_call
        .take()
        .expect("no call is waiting");
    let outcome = handle.join().expect("caller thread panicked");
    assert!(
        matches!(outcome, Err(ClientError::ConnectionClosed)),
        "expected ConnectionClosed, got {outcome:?}"
    );
}

#[scenario(
    path = "tests/features/client.feature",
    name = "Subscriber receives published messages in order"
)]
fn ordered_topic_delivery(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/client.feature",
    name = "Service call resolves with the bridge response"
)]
fn service_call_resolves(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/client.feature",
    name = "Service call without a response times out"
)]
fn service_call_times_out(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/client.feature",
    name = "Action goal reports feedback and a result"
)]
fn action_goal_completes(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/client.feature", name = "No delivery after unsubscribe")]
fn no_delivery_after_unsubscribe(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/client.feature", name = "Unsubscribing twice sends one envelope")]
fn unsubscribe_is_idempotent(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/client.feature", name = "Goal phases never move backwards")]
fn goal_phase_is_monotonic(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/client.feature",
    name = "Closing the connection wakes a waiting call"
)]
fn close_wakes_waiting_call(world: RefCell<TestWorld>) {
    drop(world);
}
