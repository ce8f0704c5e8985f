//! Pending service-call table.
//!
//! Each call owns a one-shot channel. Whoever removes the entry from the
//! table first (a response, a failure, or the caller's timeout) decides the
//! outcome; the loser finds nothing to remove and is discarded.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::{ROUTER_TARGET, Router, lock};
use crate::error::ClientError;
use crate::ids::RequestId;
use crate::message::Message;

type CallOutcome = Result<Message, ClientError>;

struct PendingCall {
    service: String,
    slot: SyncSender<CallOutcome>,
}

#[derive(Default)]
pub(super) struct CallTable {
    pending: Mutex<HashMap<RequestId, PendingCall>>,
}

impl CallTable {
    fn take(&self, id: &RequestId) -> Option<PendingCall> {
        lock(&self.pending).remove(id)
    }

    pub(super) fn fail_all(&self, error: &dyn Fn() -> ClientError) -> usize {
        let drained: Vec<_> = lock(&self.pending).drain().collect();
        let count = drained.len();
        for (id, call) in drained {
            if call.slot.send(Err(error())).is_err() {
                debug!(target: ROUTER_TARGET, request_id = %id, "call waiter already gone");
            }
        }
        count
    }
}

/// Caller's side of a pending service call.
#[must_use = "a pending call stays registered until it is waited on or cancelled"]
pub struct CallWaiter<'r> {
    router: &'r Router,
    id: RequestId,
    service: String,
    receiver: Receiver<CallOutcome>,
}

impl CallWaiter<'_> {
    /// Request id the peer must echo.
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Blocks until the call resolves or `timeout` elapses.
    ///
    /// On timeout the call is removed from the pending table; a response
    /// arriving later is dropped by the router.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Timeout`] when the deadline passes,
    /// [`ClientError::ConnectionClosed`] when the connection goes away, and
    /// [`ClientError::Service`] when the peer reports failure.
    pub fn wait(self, timeout: Duration) -> Result<Message, ClientError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                if self.router.cancel_call(&self.id) {
                    Err(ClientError::timeout(
                        format!("call_service {}", self.service),
                        timeout,
                    ))
                } else {
                    // Resolution won the race; its outcome is already queued.
                    self.receiver
                        .recv()
                        .unwrap_or(Err(ClientError::ConnectionClosed))
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(ClientError::ConnectionClosed),
        }
    }
}

impl Router {
    /// Registers a pending call to `service` and returns its waiter.
    pub fn register_pending_call(&self, id: RequestId, service: &str) -> CallWaiter<'_> {
        let (slot, receiver) = mpsc::sync_channel(1);
        lock(&self.calls.pending).insert(
            id.clone(),
            PendingCall {
                service: service.to_owned(),
                slot,
            },
        );
        CallWaiter {
            router: self,
            id,
            service: service.to_owned(),
            receiver,
        }
    }

    /// Resolves a pending call with the peer's payload.
    ///
    /// Returns `false`, logging a warning, when no call with `id` is pending.
    pub fn resolve_call(&self, id: &RequestId, payload: Message) -> bool {
        self.complete_call(id, Ok(payload))
    }

    /// Fails a pending call with `error`.
    pub fn fail_call(&self, id: &RequestId, error: ClientError) -> bool {
        self.complete_call(id, Err(error))
    }

    /// Removes a pending call without resolving it. Returns `false` when the
    /// call had already been resolved or removed.
    pub fn cancel_call(&self, id: &RequestId) -> bool {
        self.calls.take(id).is_some()
    }

    /// Returns `true` while a call with `id` is pending.
    #[must_use]
    pub fn has_pending_call(&self, id: &RequestId) -> bool {
        lock(&self.calls.pending).contains_key(id)
    }

    /// Number of pending calls.
    #[must_use]
    pub fn pending_call_count(&self) -> usize {
        lock(&self.calls.pending).len()
    }

    pub(super) fn complete_service_response(
        &self,
        id: &RequestId,
        service: Option<String>,
        result: bool,
        values: Value,
    ) {
        let Some(call) = self.calls.take(id) else {
            warn!(
                target: ROUTER_TARGET,
                request_id = %id,
                "dropping response for unknown or already-resolved call"
            );
            return;
        };
        let outcome = if result {
            Ok(Message::from(values))
        } else {
            Err(ClientError::service(service.unwrap_or(call.service), values))
        };
        if call.slot.send(outcome).is_err() {
            debug!(target: ROUTER_TARGET, request_id = %id, "call waiter already gone");
        }
    }

    fn complete_call(&self, id: &RequestId, outcome: CallOutcome) -> bool {
        let Some(call) = self.calls.take(id) else {
            warn!(
                target: ROUTER_TARGET,
                request_id = %id,
                "no pending call to complete"
            );
            return false;
        };
        if call.slot.send(outcome).is_err() {
            debug!(target: ROUTER_TARGET, request_id = %id, "call waiter already gone");
        }
        true
    }
}
