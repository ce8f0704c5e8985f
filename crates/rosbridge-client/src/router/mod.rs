//! Routing of decoded inbound frames to their registrants.
//!
//! The router keeps four tables, each behind its own lock: topic
//! subscriptions, pending service calls, local service handlers, and action
//! goals. [`Router::dispatch`] hands every decoded [`Frame`] to exactly one
//! kind of registrant. Registrants are snapshotted under the table lock and
//! invoked outside it, so callbacks may register or unregister freely.
//!
//! User code runs under `catch_unwind`: a panicking callback or handler is
//! logged and the reader carries on.

mod calls;
mod goals;
mod services;
mod topics;

use std::any::Any;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::codec::{Frame, Operation, StatusLevel};
use crate::error::{ClientError, ProtocolError};

pub use calls::CallWaiter;
pub use goals::{FeedbackCallback, GoalWaiter};
pub use services::{DisplacedHandler, ServiceHandler};
pub use topics::{SubscriptionOptions, TopicCallback};

use calls::CallTable;
use goals::GoalTable;
use services::ServiceTable;
use topics::TopicTable;

/// Tracing target for routing decisions.
pub(crate) const ROUTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::router");

/// Sends envelopes the router produces while dispatching, such as service
/// responses.
pub trait Outbound {
    /// Writes one envelope to the peer.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] when the envelope cannot be sent.
    fn send_operation(&self, operation: &Operation) -> Result<(), ClientError>;
}

/// Registrant tables and the dispatch algorithm over them.
#[derive(Default)]
pub struct Router {
    topics: TopicTable,
    calls: CallTable,
    services: ServiceTable,
    goals: GoalTable,
}

impl Router {
    /// Creates a router with empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes one decoded frame.
    ///
    /// Frames for unknown registrants are logged and dropped. Service
    /// requests are answered through `outbound` before this returns.
    pub fn dispatch(&self, frame: Frame, outbound: &dyn Outbound) {
        match frame {
            Frame::TopicMessage { topic, msg } => self.deliver_topic_message(&topic, &msg),
            Frame::ServiceResponse {
                id,
                service,
                result,
                values,
            } => self.complete_service_response(&id, service, result, values),
            Frame::ServiceRequest { id, service, args } => {
                self.answer_service_request(id, service, &args, outbound);
            }
            Frame::ActionFeedback { id, values } => self.deliver_goal_feedback(&id, &values),
            Frame::ActionResult {
                id,
                status,
                result,
                values,
            } => self.complete_goal(&id, status, result, values),
            Frame::ActionGoalStatus { id, status } => self.apply_goal_status(&id, status),
            Frame::Status { level, msg, id } => log_bridge_status(level, &msg, id.as_deref()),
            Frame::Unknown { op, reason } => log_undecodable(op.as_deref(), &reason),
        }
    }

    /// Fails every pending call and every active goal with the error
    /// produced by `error`, returning how many waiters were woken.
    ///
    /// Subscriptions and service handlers stay registered.
    pub fn fail_all(&self, error: impl Fn() -> ClientError) -> usize {
        let calls = self.calls.fail_all(&error);
        let goals = self.goals.fail_all(&error);
        if calls + goals > 0 {
            debug!(
                target: ROUTER_TARGET,
                calls,
                goals,
                "failed outstanding waiters"
            );
        }
        calls + goals
    }
}

fn log_bridge_status(level: StatusLevel, message: &str, id: Option<&str>) {
    match level {
        StatusLevel::Error => error!(target: ROUTER_TARGET, id, detail = message, "bridge status"),
        StatusLevel::Warning => warn!(target: ROUTER_TARGET, id, detail = message, "bridge status"),
        StatusLevel::Info => info!(target: ROUTER_TARGET, id, detail = message, "bridge status"),
        StatusLevel::None => debug!(target: ROUTER_TARGET, id, detail = message, "bridge status"),
    }
}

fn log_undecodable(op: Option<&str>, reason: &ProtocolError) {
    if matches!(reason, ProtocolError::UnsupportedOp { .. }) {
        debug!(target: ROUTER_TARGET, op, %reason, "dropping unsupported frame");
    } else {
        warn!(target: ROUTER_TARGET, op, %reason, "dropping malformed frame");
    }
}

/// Extracts the message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Locks a table, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
