//! Named publish/subscribe handles.

use std::sync::Mutex;

use tracing::debug;

use crate::codec::Operation;
use crate::connection::{CONNECTION_TARGET, Ros};
use crate::error::ClientError;
use crate::ids::SubscriptionId;
use crate::message::Message;
use crate::router::{SubscriptionOptions, lock};

/// Publisher advertisement made during one connection session.
struct Advertisement {
    id: String,
    epoch: u64,
}

/// A named, typed topic bound to a connection.
///
/// A handle holds at most one subscription and one publisher advertisement.
/// Dropping it unsubscribes and unadvertises.
pub struct Topic<'ros> {
    ros: &'ros Ros,
    name: String,
    msg_type: String,
    options: SubscriptionOptions,
    subscription: Mutex<Option<SubscriptionId>>,
    advertisement: Mutex<Option<Advertisement>>,
}

impl<'ros> Topic<'ros> {
    /// Binds a topic handle to `ros`.
    #[must_use]
    pub fn new(ros: &'ros Ros, name: impl Into<String>, msg_type: impl Into<String>) -> Self {
        Self {
            ros,
            name: name.into(),
            msg_type: msg_type.into(),
            options: SubscriptionOptions::default(),
            subscription: Mutex::new(None),
            advertisement: Mutex::new(None),
        }
    }

    /// Asks the bridge to deliver at most one message per `milliseconds`.
    #[must_use]
    pub fn with_throttle_rate(mut self, milliseconds: u32) -> Self {
        self.options.throttle_rate = Some(milliseconds);
        self
    }

    /// Asks the bridge to buffer up to `length` messages.
    #[must_use]
    pub fn with_queue_length(mut self, length: u32) -> Self {
        self.options.queue_length = Some(length);
        self
    }

    /// Topic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Message type string.
    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.msg_type
    }

    /// Id of the live subscription, if any.
    #[must_use]
    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        lock(&self.subscription).clone()
    }

    /// Returns `true` while this handle holds a subscription.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        lock(&self.subscription).is_some()
    }

    /// Returns `true` while the publisher advertisement is current.
    #[must_use]
    pub fn is_advertised(&self) -> bool {
        let epoch = self.ros.epoch();
        lock(&self.advertisement)
            .as_ref()
            .is_some_and(|advertisement| advertisement.epoch == epoch)
    }

    /// Subscribes, replacing any subscription this handle already holds.
    ///
    /// `callback` runs on the reader thread for every message, in arrival
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when the connection is down, or
    /// the send failure; nothing stays registered on failure.
    pub fn subscribe<F>(&self, callback: F) -> Result<SubscriptionId, ClientError>
    where
        F: FnMut(&Message) + Send + 'static,
    {
        if !self.ros.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let previous = lock(&self.subscription).take();
        if let Some(stale) = previous {
            self.release_subscription(&stale)?;
        }

        let id = self.ros.ids().subscription(&self.name);
        self.ros.router().register_topic(
            id.clone(),
            &self.name,
            &self.msg_type,
            self.options,
            Box::new(callback),
        );
        let operation = Operation::Subscribe {
            id: id.to_string(),
            topic: self.name.clone(),
            msg_type: self.msg_type.clone(),
            throttle_rate: self.options.throttle_rate,
            queue_length: self.options.queue_length,
        };
        if let Err(error) = self.ros.send(&operation) {
            self.ros.router().unregister_topic(&id, false);
            return Err(error);
        }
        debug!(
            target: CONNECTION_TARGET,
            topic = %self.name,
            subscription = %id,
            "subscribed"
        );

        let displaced = lock(&self.subscription).replace(id.clone());
        if let Some(raced) = displaced {
            self.release_subscription(&raced)?;
        }
        Ok(id)
    }

    /// Cancels the subscription. Calling it again, or without a
    /// subscription, does nothing.
    ///
    /// Once this returns no callback of the subscription runs again.
    ///
    /// # Errors
    ///
    /// Returns the send failure for the `unsubscribe` envelope; the local
    /// registration is removed regardless.
    pub fn unsubscribe(&self) -> Result<(), ClientError> {
        let current = lock(&self.subscription).take();
        match current {
            Some(id) => self.release_subscription(&id),
            None => Ok(()),
        }
    }

    /// Advertises this client as a publisher of the topic. Does nothing when
    /// already advertised on the current session.
    ///
    /// # Errors
    ///
    /// Returns the send failure.
    pub fn advertise(&self) -> Result<(), ClientError> {
        let mut advertisement = lock(&self.advertisement);
        let epoch = self.ros.epoch();
        if advertisement
            .as_ref()
            .is_some_and(|current| current.epoch == epoch)
        {
            return Ok(());
        }
        let id = self.ros.ids().publisher(&self.name);
        self.ros.send(&Operation::Advertise {
            id: id.clone(),
            topic: self.name.clone(),
            msg_type: self.msg_type.clone(),
        })?;
        debug!(target: CONNECTION_TARGET, topic = %self.name, advertisement = %id, "advertised");
        *advertisement = Some(Advertisement { id, epoch });
        Ok(())
    }

    /// Withdraws the publisher advertisement. Calling it again does nothing.
    ///
    /// # Errors
    ///
    /// Returns the send failure for the `unadvertise` envelope.
    pub fn unadvertise(&self) -> Result<(), ClientError> {
        let current = lock(&self.advertisement).take();
        let Some(advertisement) = current else {
            return Ok(());
        };
        if advertisement.epoch != self.ros.epoch() {
            // The session that held it is gone, and the peer with it.
            return Ok(());
        }
        ignore_disconnected(self.ros.send(&Operation::Unadvertise {
            id: advertisement.id,
            topic: self.name.clone(),
        }))
    }

    /// Publishes `message`, advertising the topic first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when the connection is down, or
    /// the send failure.
    pub fn publish(&self, message: &Message) -> Result<(), ClientError> {
        self.advertise()?;
        let id = lock(&self.advertisement)
            .as_ref()
            .map(|advertisement| advertisement.id.clone());
        self.ros.send(&Operation::Publish {
            id,
            topic: self.name.clone(),
            msg: message.clone(),
        })
    }

    fn release_subscription(&self, id: &SubscriptionId) -> Result<(), ClientError> {
        let wait = !self.ros.on_reader_thread();
        if !self.ros.router().unregister_topic(id, wait) {
            return Ok(());
        }
        debug!(target: CONNECTION_TARGET, topic = %self.name, subscription = %id, "unsubscribed");
        ignore_disconnected(self.ros.send(&Operation::Unsubscribe {
            id: id.to_string(),
            topic: self.name.clone(),
        }))
    }
}

impl Drop for Topic<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.unsubscribe() {
            debug!(
                target: CONNECTION_TARGET,
                topic = %self.name,
                %error,
                "unsubscribe on drop failed"
            );
        }
        if let Err(error) = self.unadvertise() {
            debug!(
                target: CONNECTION_TARGET,
                topic = %self.name,
                %error,
                "unadvertise on drop failed"
            );
        }
    }
}

/// Treats a send while disconnected as success: the peer has already
/// forgotten the registration.
pub(crate) fn ignore_disconnected(result: Result<(), ClientError>) -> Result<(), ClientError> {
    match result {
        Err(ClientError::NotConnected) => Ok(()),
        other => other,
    }
}
