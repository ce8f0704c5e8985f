//! Action goal table and the goal lifecycle state machine.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error};

use super::{ROUTER_TARGET, Router, lock, panic_message};
use crate::action::{GoalOutcome, GoalPhase};
use crate::codec::GoalStatusCode;
use crate::error::ClientError;
use crate::ids::GoalId;
use crate::message::Message;

/// Callback invoked for each feedback message of a goal.
pub type FeedbackCallback = Box<dyn FnMut(&Message) + Send>;

type GoalResult = Result<GoalOutcome, ClientError>;

struct GoalState {
    phase: GoalPhase,
    result_slot: Option<SyncSender<GoalResult>>,
}

struct GoalSlot {
    action: String,
    retired: AtomicBool,
    state: Mutex<GoalState>,
    feedback: Mutex<Option<FeedbackCallback>>,
}

impl GoalSlot {
    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        // Another thread may be mid-delivery; it re-checks `retired`.
        if let Ok(mut feedback) = self.feedback.try_lock() {
            feedback.take();
        }
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

#[derive(Default)]
pub(super) struct GoalTable {
    goals: Mutex<HashMap<GoalId, Arc<GoalSlot>>>,
}

impl GoalTable {
    fn get(&self, id: &GoalId) -> Option<Arc<GoalSlot>> {
        lock(&self.goals).get(id).cloned()
    }

    fn remove(&self, id: &GoalId) -> Option<Arc<GoalSlot>> {
        lock(&self.goals).remove(id)
    }

    pub(super) fn fail_all(&self, error: &dyn Fn() -> ClientError) -> usize {
        let drained: Vec<_> = lock(&self.goals).drain().collect();
        let count = drained.len();
        for (id, slot) in drained {
            slot.retire();
            let sender = lock(&slot.state).result_slot.take();
            if let Some(sender) = sender
                && sender.send(Err(error())).is_err()
            {
                debug!(target: ROUTER_TARGET, goal_id = %id, "goal waiter already gone");
            }
        }
        count
    }
}

/// Caller's side of an active goal.
///
/// Dropping the waiter before the goal finishes removes the goal, so its
/// feedback callback stops running.
#[must_use = "dropping the waiter abandons the goal"]
pub struct GoalWaiter<'r> {
    router: &'r Router,
    id: GoalId,
    action: String,
    receiver: Receiver<GoalResult>,
}

impl GoalWaiter<'_> {
    /// Goal id.
    #[must_use]
    pub fn id(&self) -> &GoalId {
        &self.id
    }

    /// Blocks until the goal reaches a terminal phase, or until `timeout`
    /// elapses when one is given.
    ///
    /// On timeout the goal is removed from the table and no further feedback
    /// is delivered for it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Timeout`] when the deadline passes and
    /// [`ClientError::ConnectionClosed`] when the connection goes away.
    pub fn wait(self, timeout: Option<Duration>) -> Result<GoalOutcome, ClientError> {
        self.await_outcome(timeout)
    }

    pub(crate) fn await_outcome(
        &self,
        timeout: Option<Duration>,
    ) -> Result<GoalOutcome, ClientError> {
        let Some(limit) = timeout else {
            return self
                .receiver
                .recv()
                .unwrap_or(Err(ClientError::ConnectionClosed));
        };
        match self.receiver.recv_timeout(limit) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                if self.router.remove_goal(&self.id) {
                    Err(ClientError::timeout(
                        format!("send_action_goal {}", self.action),
                        limit,
                    ))
                } else {
                    // The terminal phase won the race; its outcome is queued.
                    self.receiver
                        .recv()
                        .unwrap_or(Err(ClientError::ConnectionClosed))
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(ClientError::ConnectionClosed),
        }
    }
}

impl Drop for GoalWaiter<'_> {
    fn drop(&mut self) {
        if self.router.remove_goal(&self.id) {
            debug!(target: ROUTER_TARGET, goal_id = %self.id, "abandoned goal removed");
        }
    }
}

impl Router {
    /// Registers a submitted goal and returns its waiter.
    pub fn register_goal(
        &self,
        id: GoalId,
        action: &str,
        feedback: Option<FeedbackCallback>,
    ) -> GoalWaiter<'_> {
        let (result_slot, receiver) = mpsc::sync_channel(1);
        let slot = Arc::new(GoalSlot {
            action: action.to_owned(),
            retired: AtomicBool::new(false),
            state: Mutex::new(GoalState {
                phase: GoalPhase::Submitted,
                result_slot: Some(result_slot),
            }),
            feedback: Mutex::new(feedback),
        });
        lock(&self.goals.goals).insert(id.clone(), slot);
        GoalWaiter {
            router: self,
            id,
            action: action.to_owned(),
            receiver,
        }
    }

    /// Moves a goal to `phase` if the lifecycle allows it.
    ///
    /// Reaching a terminal phase resolves the goal's waiter with `payload`
    /// and removes the goal. Returns `false` when the goal is unknown or the
    /// transition is not allowed; such updates are ignored.
    pub fn update_goal_phase(&self, id: &GoalId, phase: GoalPhase, payload: Value) -> bool {
        let Some(slot) = self.goals.get(id) else {
            debug!(target: ROUTER_TARGET, goal_id = %id, %phase, "update for unknown goal");
            return false;
        };
        let mut state = lock(&slot.state);
        let Some(next) = state.phase.advance(phase) else {
            debug!(
                target: ROUTER_TARGET,
                goal_id = %id,
                from = %state.phase,
                to = %phase,
                "ignoring goal transition"
            );
            return false;
        };
        state.phase = next;
        debug!(target: ROUTER_TARGET, goal_id = %id, phase = %next, "goal phase changed");
        if next.is_terminal() {
            // First writer wins: a concurrent removal may already hold it.
            let owned = self
                .goals
                .remove(id)
                .is_some_and(|removed| Arc::ptr_eq(&removed, &slot));
            let sender = state.result_slot.take();
            drop(state);
            slot.retire();
            if owned
                && let Some(sender) = sender
            {
                let outcome = GoalOutcome {
                    goal_id: id.clone(),
                    phase: next,
                    result: Message::from(payload),
                };
                if sender.send(Ok(outcome)).is_err() {
                    debug!(target: ROUTER_TARGET, goal_id = %id, "goal waiter already gone");
                }
            }
        }
        true
    }

    /// Removes a goal without resolving it. Returns `false` when it had
    /// already reached a terminal phase or been removed.
    pub fn remove_goal(&self, id: &GoalId) -> bool {
        let Some(slot) = self.goals.remove(id) else {
            return false;
        };
        slot.retire();
        lock(&slot.state).result_slot.take();
        true
    }

    /// Current phase of an active goal.
    #[must_use]
    pub fn goal_phase(&self, id: &GoalId) -> Option<GoalPhase> {
        self.goals.get(id).map(|slot| lock(&slot.state).phase)
    }

    /// Number of goals that have not reached a terminal phase.
    #[must_use]
    pub fn active_goal_count(&self) -> usize {
        lock(&self.goals.goals).len()
    }

    pub(super) fn deliver_goal_feedback(&self, id: &GoalId, values: &Message) {
        let Some(slot) = self.goals.get(id) else {
            debug!(target: ROUTER_TARGET, goal_id = %id, "feedback for unknown goal");
            return;
        };
        let mut feedback = lock(&slot.feedback);
        {
            let mut state = lock(&slot.state);
            if slot.is_retired() || state.phase.is_terminal() {
                return;
            }
            if let Some(next) = state.phase.advance(GoalPhase::Executing) {
                state.phase = next;
            }
        }
        let Some(callback) = feedback.as_mut() else {
            return;
        };
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(values))) {
            error!(
                target: ROUTER_TARGET,
                goal_id = %id,
                action = %slot.action,
                panic = panic_message(&*panic),
                "feedback callback panicked"
            );
        }
    }

    pub(super) fn apply_goal_status(&self, id: &GoalId, status: GoalStatusCode) {
        match GoalPhase::from_status(status) {
            Some(phase) => {
                self.update_goal_phase(id, phase, Value::Null);
            }
            None => debug!(target: ROUTER_TARGET, goal_id = %id, ?status, "ignoring goal status"),
        }
    }

    pub(super) fn complete_goal(
        &self,
        id: &GoalId,
        status: GoalStatusCode,
        result: bool,
        values: Value,
    ) {
        let phase = match GoalPhase::from_status(status) {
            Some(reported) if reported.is_terminal() => reported,
            _ if result => GoalPhase::Succeeded,
            _ if self.goal_phase(id) == Some(GoalPhase::Submitted) => GoalPhase::Rejected,
            _ => GoalPhase::Aborted,
        };
        self.update_goal_phase(id, phase, values);
    }
}
