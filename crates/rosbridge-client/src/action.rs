//! Action goals: submission, feedback, cancellation, and the terminal result.
//!
//! A goal moves through [`GoalPhase`]s as the peer reports progress:
//!
//! ```text
//! Submitted ─┬─> Accepted ─> Executing ─┬─> Succeeded
//!            └─> Rejected               ├─> Aborted
//!                                       └─> Canceled
//! ```
//!
//! The peer may skip intermediate reports, so any forward move is accepted.
//! Terminal phases are sinks: once one is reached the goal is removed and
//! later frames for its id are ignored.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info};

use crate::codec::{GoalStatusCode, Operation};
use crate::connection::{CONNECTION_TARGET, Ros};
use crate::error::ClientError;
use crate::ids::GoalId;
use crate::message::Message;
use crate::router::{FeedbackCallback, GoalWaiter};

/// Lifecycle phase of an action goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoalPhase {
    /// Sent, not yet acknowledged.
    Submitted,
    /// Accepted by the action server.
    Accepted,
    /// Refused by the action server.
    Rejected,
    /// Being processed; feedback may arrive.
    Executing,
    /// Finished successfully.
    Succeeded,
    /// Given up by the action server.
    Aborted,
    /// Cancelled before completion.
    Canceled,
}

impl GoalPhase {
    /// Returns `true` for phases no goal can leave.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Succeeded | Self::Aborted | Self::Canceled
        )
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Submitted => 0,
            Self::Accepted => 1,
            Self::Executing => 2,
            Self::Rejected | Self::Succeeded | Self::Aborted | Self::Canceled => 3,
        }
    }

    /// Returns the phase after moving to `next`, or `None` when the move is
    /// not allowed.
    #[must_use]
    pub const fn advance(self, next: Self) -> Option<Self> {
        if self.is_terminal() || next.rank() <= self.rank() {
            return None;
        }
        if matches!(next, Self::Rejected) && !matches!(self, Self::Submitted) {
            return None;
        }
        Some(next)
    }

    /// Phase implied by a reported goal status, if any.
    #[must_use]
    pub const fn from_status(status: GoalStatusCode) -> Option<Self> {
        match status {
            GoalStatusCode::Unknown => None,
            GoalStatusCode::Accepted => Some(Self::Accepted),
            GoalStatusCode::Executing | GoalStatusCode::Canceling => Some(Self::Executing),
            GoalStatusCode::Succeeded => Some(Self::Succeeded),
            GoalStatusCode::Canceled => Some(Self::Canceled),
            GoalStatusCode::Aborted => Some(Self::Aborted),
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Executing => "executing",
            Self::Succeeded => "succeeded",
            Self::Aborted => "aborted",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for GoalPhase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Terminal state of a goal.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalOutcome {
    /// Goal id.
    pub goal_id: GoalId,
    /// Terminal phase reached.
    pub phase: GoalPhase,
    /// Result payload reported with the terminal phase.
    pub result: Message,
}

impl GoalOutcome {
    /// Returns the result payload when the goal succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Action`] for any other terminal phase.
    pub fn into_result(self, action: &str) -> Result<Message, ClientError> {
        if self.phase == GoalPhase::Succeeded {
            return Ok(self.result);
        }
        Err(ClientError::Action {
            action: action.to_owned(),
            phase: self.phase,
            values: self.result.into_value(),
        })
    }
}

/// Client for one named action.
pub struct ActionClient<'ros> {
    ros: &'ros Ros,
    action: String,
    action_type: String,
}

impl<'ros> ActionClient<'ros> {
    /// Binds an action client to `ros`.
    #[must_use]
    pub fn new(ros: &'ros Ros, action: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            ros,
            action: action.into(),
            action_type: action_type.into(),
        }
    }

    /// Action name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.action
    }

    /// Action type string.
    #[must_use]
    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    /// Submits a goal without feedback and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when the connection is down, or
    /// the send failure.
    pub fn submit_goal(&self, goal: &Message) -> Result<GoalHandle<'ros>, ClientError> {
        self.submit(goal, None)
    }

    /// Submits a goal whose feedback is delivered to `feedback` on the
    /// reader thread until the goal reaches a terminal phase.
    ///
    /// # Errors
    ///
    /// As [`ActionClient::submit_goal`].
    pub fn submit_goal_with_feedback<F>(
        &self,
        goal: &Message,
        feedback: F,
    ) -> Result<GoalHandle<'ros>, ClientError>
    where
        F: FnMut(&Message) + Send + 'static,
    {
        self.submit(goal, Some(Box::new(feedback)))
    }

    /// Submits a goal and blocks until its result arrives.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Action`] when the goal ends in any phase other
    /// than [`GoalPhase::Succeeded`], [`ClientError::Timeout`] when
    /// `timeout` elapses (a cancel is then sent to the peer), and
    /// [`ClientError::ReentrantBlockingCall`] on the reader thread.
    pub fn send_goal(&self, goal: &Message, timeout: Duration) -> Result<Message, ClientError> {
        self.ros.ensure_not_reader("ActionClient::send_goal")?;
        self.submit_goal(goal)?
            .wait(Some(timeout))?
            .into_result(&self.action)
    }

    /// As [`ActionClient::send_goal`], delivering feedback to `feedback`.
    ///
    /// # Errors
    ///
    /// As [`ActionClient::send_goal`].
    pub fn send_goal_with_feedback<F>(
        &self,
        goal: &Message,
        feedback: F,
        timeout: Duration,
    ) -> Result<Message, ClientError>
    where
        F: FnMut(&Message) + Send + 'static,
    {
        self.ros.ensure_not_reader("ActionClient::send_goal")?;
        self.submit_goal_with_feedback(goal, feedback)?
            .wait(Some(timeout))?
            .into_result(&self.action)
    }

    /// Asks the peer to cancel `goal`. The goal's outcome is whichever
    /// terminal phase the peer then reports.
    ///
    /// # Errors
    ///
    /// Returns the send failure.
    pub fn cancel_goal(&self, goal: &GoalId) -> Result<(), ClientError> {
        send_cancel(self.ros, &self.action, goal)
    }

    fn submit(
        &self,
        goal: &Message,
        feedback: Option<FeedbackCallback>,
    ) -> Result<GoalHandle<'ros>, ClientError> {
        if !self.ros.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let id = self.ros.ids().goal(&self.action);
        let operation = Operation::SendActionGoal {
            id: id.to_string(),
            action: self.action.clone(),
            action_type: self.action_type.clone(),
            args: goal.clone(),
            feedback: feedback.is_some(),
        };
        let waiter = self
            .ros
            .router()
            .register_goal(id.clone(), &self.action, feedback);
        if let Err(error) = self.ros.send(&operation) {
            self.ros.router().remove_goal(&id);
            return Err(error);
        }
        info!(
            target: CONNECTION_TARGET,
            action = %self.action,
            goal_id = %id,
            "goal submitted"
        );
        Ok(GoalHandle {
            ros: self.ros,
            action: self.action.clone(),
            waiter,
        })
    }
}

fn send_cancel(ros: &Ros, action: &str, goal: &GoalId) -> Result<(), ClientError> {
    ros.send(&Operation::CancelActionGoal {
        id: goal.to_string(),
        action: action.to_owned(),
    })
}

/// Handle to one submitted goal.
#[must_use = "a goal handle should be waited on or cancelled"]
pub struct GoalHandle<'ros> {
    ros: &'ros Ros,
    action: String,
    waiter: GoalWaiter<'ros>,
}

impl GoalHandle<'_> {
    /// Goal id.
    #[must_use]
    pub fn id(&self) -> &GoalId {
        self.waiter.id()
    }

    /// Current phase, or `None` once the goal has left the table.
    #[must_use]
    pub fn phase(&self) -> Option<GoalPhase> {
        self.ros.router().goal_phase(self.id())
    }

    /// Asks the peer to cancel this goal.
    ///
    /// # Errors
    ///
    /// Returns the send failure.
    pub fn cancel(&self) -> Result<(), ClientError> {
        send_cancel(self.ros, &self.action, self.id())
    }

    /// Blocks until the goal reaches a terminal phase.
    ///
    /// With a timeout, an expired wait removes the goal locally and sends a
    /// best-effort cancel to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Timeout`], [`ClientError::ConnectionClosed`],
    /// or [`ClientError::ReentrantBlockingCall`] on the reader thread.
    pub fn wait(self, timeout: Option<Duration>) -> Result<GoalOutcome, ClientError> {
        self.ros.ensure_not_reader("GoalHandle::wait")?;
        let id = self.waiter.id().clone();
        match self.waiter.await_outcome(timeout) {
            Err(error @ ClientError::Timeout { .. }) => {
                if let Err(cancel_error) = send_cancel(self.ros, &self.action, &id) {
                    debug!(
                        target: CONNECTION_TARGET,
                        goal_id = %id,
                        error = %cancel_error,
                        "could not cancel timed-out goal"
                    );
                }
                Err(error)
            }
            other => other,
        }
    }
}

impl Drop for GoalHandle<'_> {
    fn drop(&mut self) {
        if self.phase().is_none() {
            return;
        }
        // The peer keeps executing an abandoned goal unless told otherwise.
        if let Err(error) = self.cancel() {
            debug!(
                target: CONNECTION_TARGET,
                goal_id = %self.id(),
                %error,
                "could not cancel abandoned goal"
            );
        }
    }
}
