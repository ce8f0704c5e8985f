//! Local service handler table.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, error, warn};

use super::{Outbound, ROUTER_TARGET, Router, lock, panic_message};
use crate::codec::Operation;
use crate::ids::AdvertisementId;
use crate::message::Message;

/// Handler answering requests for an advertised service.
pub type ServiceHandler = Box<dyn Fn(&Message) -> Result<Message, String> + Send + Sync>;

struct ServiceSlot {
    advertisement: AdvertisementId,
    service_type: String,
    handler: ServiceHandler,
}

/// A handler pushed out by a newer registration for the same service.
///
/// Hand it back to [`Router::revert_service_handler`] to reinstate it.
#[must_use = "a displaced handler is lost unless reverted"]
pub struct DisplacedHandler(Arc<ServiceSlot>);

impl DisplacedHandler {
    /// Advertisement that installed the displaced handler.
    #[must_use]
    pub fn advertisement(&self) -> AdvertisementId {
        self.0.advertisement
    }
}

#[derive(Default)]
pub(super) struct ServiceTable {
    handlers: Mutex<HashMap<String, Arc<ServiceSlot>>>,
}

impl Router {
    /// Installs `handler` for `service`, replacing any previous handler.
    /// Returns the handler that was replaced.
    pub fn register_service_handler(
        &self,
        service: &str,
        service_type: &str,
        advertisement: AdvertisementId,
        handler: ServiceHandler,
    ) -> Option<DisplacedHandler> {
        let slot = Arc::new(ServiceSlot {
            advertisement,
            service_type: service_type.to_owned(),
            handler,
        });
        lock(&self.services.handlers)
            .insert(service.to_owned(), slot)
            .map(DisplacedHandler)
    }

    /// Undoes the registration made with `advertisement`: the `displaced`
    /// handler is put back, or the entry removed when there was none.
    ///
    /// Returns `false`, changing nothing, when `advertisement` no longer
    /// owns the entry.
    pub fn revert_service_handler(
        &self,
        service: &str,
        advertisement: AdvertisementId,
        displaced: Option<DisplacedHandler>,
    ) -> bool {
        let mut handlers = lock(&self.services.handlers);
        let owned = handlers
            .get(service)
            .is_some_and(|slot| slot.advertisement == advertisement);
        if !owned {
            return false;
        }
        match displaced {
            Some(DisplacedHandler(previous)) => {
                handlers.insert(service.to_owned(), previous);
            }
            None => {
                handlers.remove(service);
            }
        }
        true
    }

    /// Removes the handler for `service` only if it is still the one
    /// installed by `advertisement`.
    pub fn unregister_service_handler(
        &self,
        service: &str,
        advertisement: AdvertisementId,
    ) -> bool {
        let mut handlers = lock(&self.services.handlers);
        let owned = handlers
            .get(service)
            .is_some_and(|slot| slot.advertisement == advertisement);
        if owned {
            handlers.remove(service);
        }
        owned
    }

    /// Returns `true` when a handler is installed for `service`.
    #[must_use]
    pub fn has_service_handler(&self, service: &str) -> bool {
        lock(&self.services.handlers).contains_key(service)
    }

    /// Advertisement that installed the current handler for `service`.
    #[must_use]
    pub fn service_advertisement(&self, service: &str) -> Option<AdvertisementId> {
        lock(&self.services.handlers)
            .get(service)
            .map(|slot| slot.advertisement)
    }

    /// `advertise_service` envelopes for every installed handler, used to
    /// restore them after a reconnect.
    #[must_use]
    pub fn service_replay(&self) -> Vec<Operation> {
        lock(&self.services.handlers)
            .iter()
            .map(|(service, slot)| Operation::AdvertiseService {
                service: service.clone(),
                service_type: slot.service_type.clone(),
            })
            .collect()
    }

    pub(super) fn answer_service_request(
        &self,
        id: Option<String>,
        service: String,
        args: &Message,
        outbound: &dyn Outbound,
    ) {
        let slot = lock(&self.services.handlers).get(&service).cloned();
        let (values, result) = match slot {
            Some(slot) => invoke_handler(&slot, &service, args),
            None => {
                warn!(
                    target: ROUTER_TARGET,
                    service = %service,
                    "request for a service with no local handler"
                );
                (
                    Value::String(format!("no handler is advertised for {service}")),
                    false,
                )
            }
        };
        debug!(
            target: ROUTER_TARGET,
            service = %service,
            request_id = id.as_deref(),
            result,
            "answering service request"
        );
        let response = Operation::ServiceResponse {
            id,
            service,
            values,
            result,
        };
        if let Err(error) = outbound.send_operation(&response) {
            warn!(target: ROUTER_TARGET, %error, "failed to send service response");
        }
    }
}

fn invoke_handler(slot: &ServiceSlot, service: &str, args: &Message) -> (Value, bool) {
    match catch_unwind(AssertUnwindSafe(|| (slot.handler)(args))) {
        Ok(Ok(response)) => (response.into_value(), true),
        Ok(Err(message)) => {
            error!(
                target: ROUTER_TARGET,
                service,
                error = %message,
                "service handler failed"
            );
            (Value::String(message), false)
        }
        Err(panic) => {
            let message = panic_message(&*panic);
            error!(
                target: ROUTER_TARGET,
                service,
                panic = message,
                "service handler panicked"
            );
            (
                Value::String(format!("service handler panicked: {message}")),
                false,
            )
        }
    }
}
