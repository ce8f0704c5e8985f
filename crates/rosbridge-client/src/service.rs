//! Service calls and local service providers.

use std::fmt::Display;
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

use crate::codec::Operation;
use crate::connection::{CONNECTION_TARGET, Ros};
use crate::error::ClientError;
use crate::ids::AdvertisementId;
use crate::message::Message;
use crate::router::{ServiceHandler, lock};
use crate::topic::ignore_disconnected;

/// Client for one named remote service.
pub struct ServiceClient<'ros> {
    ros: &'ros Ros,
    service: String,
    service_type: String,
}

impl<'ros> ServiceClient<'ros> {
    /// Binds a service client to `ros`.
    #[must_use]
    pub fn new(
        ros: &'ros Ros,
        service: impl Into<String>,
        service_type: impl Into<String>,
    ) -> Self {
        Self {
            ros,
            service: service.into(),
            service_type: service_type.into(),
        }
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.service
    }

    /// Calls the service and blocks until the response arrives or `timeout`
    /// elapses.
    ///
    /// A response arriving after the timeout is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`],
    /// [`ClientError::ReentrantBlockingCall`] on the reader thread,
    /// [`ClientError::Timeout`], [`ClientError::ConnectionClosed`], or
    /// [`ClientError::Service`] when the peer reports failure.
    pub fn call(&self, request: &Message, timeout: Duration) -> Result<Message, ClientError> {
        self.ros.ensure_not_reader("ServiceClient::call")?;
        if !self.ros.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let id = self.ros.ids().request(&self.service);
        let operation = Operation::CallService {
            id: id.to_string(),
            service: self.service.clone(),
            args: request.clone(),
            service_type: Some(self.service_type.clone()),
        };
        let waiter = self.ros.router().register_pending_call(id.clone(), &self.service);
        if let Err(error) = self.ros.send(&operation) {
            self.ros.router().cancel_call(&id);
            return Err(error);
        }
        debug!(
            target: CONNECTION_TARGET,
            service = %self.service,
            request_id = %id,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "service call sent"
        );
        waiter.wait(timeout)
    }

    /// Calls the service with the connection's configured call timeout.
    ///
    /// # Errors
    ///
    /// As [`ServiceClient::call`].
    pub fn call_default(&self, request: &Message) -> Result<Message, ClientError> {
        self.call(request, self.ros.call_timeout())
    }
}

/// Provider of one named service, answering requests from the peer.
pub struct ServiceServer<'ros> {
    ros: &'ros Ros,
    service: String,
    service_type: String,
    advertisement: Mutex<Option<AdvertisementId>>,
}

impl<'ros> ServiceServer<'ros> {
    /// Binds a service provider to `ros`.
    #[must_use]
    pub fn new(
        ros: &'ros Ros,
        service: impl Into<String>,
        service_type: impl Into<String>,
    ) -> Self {
        Self {
            ros,
            service: service.into(),
            service_type: service_type.into(),
            advertisement: Mutex::new(None),
        }
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.service
    }

    /// Returns `true` while this server's handler is installed.
    #[must_use]
    pub fn is_advertised(&self) -> bool {
        let token = *lock(&self.advertisement);
        token.is_some() && self.ros.router().service_advertisement(&self.service) == token
    }

    /// Installs `handler` and advertises the service to the peer.
    ///
    /// The handler runs on the reader thread. An `Err` it returns, or a
    /// panic, is answered with an error response carrying the message.
    /// Advertising again replaces the handler.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when the connection is down, or
    /// the send failure. On failure the handler previously installed for
    /// the name, if any, is reinstated.
    pub fn advertise<F, E>(&self, handler: F) -> Result<(), ClientError>
    where
        F: Fn(&Message) -> Result<Message, E> + Send + Sync + 'static,
        E: Display,
    {
        if !self.ros.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let token = self.ros.ids().advertisement();
        let boxed: ServiceHandler =
            Box::new(move |request: &Message| handler(request).map_err(|error| error.to_string()));
        let router = self.ros.router();
        let displaced =
            router.register_service_handler(&self.service, &self.service_type, token, boxed);
        let operation = Operation::AdvertiseService {
            service: self.service.clone(),
            service_type: self.service_type.clone(),
        };
        if let Err(error) = self.ros.send(&operation) {
            router.revert_service_handler(&self.service, token, displaced);
            return Err(error);
        }
        debug!(target: CONNECTION_TARGET, service = %self.service, "service advertised");
        *lock(&self.advertisement) = Some(token);
        Ok(())
    }

    /// Removes the handler and withdraws the advertisement. Calling it
    /// again does nothing.
    ///
    /// If another server has since advertised the same name, its handler is
    /// left in place.
    ///
    /// # Errors
    ///
    /// Returns the send failure for the `unadvertise_service` envelope.
    pub fn unadvertise(&self) -> Result<(), ClientError> {
        let current = lock(&self.advertisement).take();
        let Some(token) = current else {
            return Ok(());
        };
        if !self
            .ros
            .router()
            .unregister_service_handler(&self.service, token)
        {
            debug!(
                target: CONNECTION_TARGET,
                service = %self.service,
                "handler already replaced; leaving advertisement in place"
            );
            return Ok(());
        }
        ignore_disconnected(self.ros.send(&Operation::UnadvertiseService {
            service: self.service.clone(),
        }))
    }
}

impl Drop for ServiceServer<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.unadvertise() {
            debug!(
                target: CONNECTION_TARGET,
                service = %self.service,
                %error,
                "unadvertise on drop failed"
            );
        }
    }
}
