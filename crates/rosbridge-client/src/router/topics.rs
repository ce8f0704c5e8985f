//! Topic subscription table.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use super::{ROUTER_TARGET, Router, lock, panic_message};
use crate::codec::Operation;
use crate::ids::SubscriptionId;
use crate::message::Message;

/// Callback invoked for each message delivered to a subscription.
pub type TopicCallback = Box<dyn FnMut(&Message) + Send>;

/// Optional bridge-side delivery settings for a subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Minimum interval between delivered messages, in milliseconds.
    pub throttle_rate: Option<u32>,
    /// Number of messages the bridge buffers.
    pub queue_length: Option<u32>,
}

struct SubscriptionSlot {
    id: SubscriptionId,
    topic: String,
    msg_type: String,
    options: SubscriptionOptions,
    active: AtomicBool,
    callback: Mutex<TopicCallback>,
}

impl SubscriptionSlot {
    fn subscribe_operation(&self) -> Operation {
        Operation::Subscribe {
            id: self.id.to_string(),
            topic: self.topic.clone(),
            msg_type: self.msg_type.clone(),
            throttle_rate: self.options.throttle_rate,
            queue_length: self.options.queue_length,
        }
    }
}

#[derive(Default)]
struct TopicIndex {
    by_topic: HashMap<String, Vec<Arc<SubscriptionSlot>>>,
    by_id: HashMap<SubscriptionId, Arc<SubscriptionSlot>>,
}

#[derive(Default)]
pub(super) struct TopicTable {
    index: Mutex<TopicIndex>,
}

impl Router {
    /// Registers a subscription; messages for `topic` reach `callback` in
    /// arrival order until the subscription is unregistered.
    pub fn register_topic(
        &self,
        id: SubscriptionId,
        topic: &str,
        msg_type: &str,
        options: SubscriptionOptions,
        callback: TopicCallback,
    ) {
        let slot = Arc::new(SubscriptionSlot {
            id: id.clone(),
            topic: topic.to_owned(),
            msg_type: msg_type.to_owned(),
            options,
            active: AtomicBool::new(true),
            callback: Mutex::new(callback),
        });
        let mut index = lock(&self.topics.index);
        index
            .by_topic
            .entry(topic.to_owned())
            .or_default()
            .push(Arc::clone(&slot));
        index.by_id.insert(id, slot);
    }

    /// Removes a subscription, returning `false` if it was not registered.
    ///
    /// With `wait` set, this blocks until any in-flight delivery to the
    /// subscription has finished, so no callback runs after it returns.
    /// Callers on the reader thread pass `false`: their own delivery is the
    /// only one that can be in flight.
    pub fn unregister_topic(&self, id: &SubscriptionId, wait: bool) -> bool {
        let removed = {
            let mut index = lock(&self.topics.index);
            let slot = index.by_id.remove(id);
            if let Some(existing) = &slot
                && let Some(slots) = index.by_topic.get_mut(&existing.topic)
            {
                slots.retain(|candidate| !Arc::ptr_eq(candidate, existing));
                if slots.is_empty() {
                    index.by_topic.remove(&existing.topic);
                }
            }
            slot
        };
        let Some(slot) = removed else {
            return false;
        };
        slot.active.store(false, Ordering::Release);
        if wait {
            drop(lock(&slot.callback));
        }
        true
    }

    /// Returns `true` while the subscription is registered.
    #[must_use]
    pub fn has_subscription(&self, id: &SubscriptionId) -> bool {
        lock(&self.topics.index).by_id.contains_key(id)
    }

    /// Number of registered subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        lock(&self.topics.index).by_id.len()
    }

    /// `subscribe` envelopes for every registered subscription, in
    /// registration order per topic, used to restore them after a reconnect.
    #[must_use]
    pub fn subscription_replay(&self) -> Vec<Operation> {
        let index = lock(&self.topics.index);
        index
            .by_topic
            .values()
            .flatten()
            .map(|slot| slot.subscribe_operation())
            .collect()
    }

    pub(super) fn deliver_topic_message(&self, topic: &str, message: &Message) {
        let slots = lock(&self.topics.index)
            .by_topic
            .get(topic)
            .cloned()
            .unwrap_or_default();
        if slots.is_empty() {
            debug!(target: ROUTER_TARGET, topic, "dropping message for unsubscribed topic");
            return;
        }
        for slot in slots {
            let mut callback = lock(&slot.callback);
            if !slot.active.load(Ordering::Acquire) {
                continue;
            }
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (*callback)(message))) {
                error!(
                    target: ROUTER_TARGET,
                    topic,
                    subscription = %slot.id,
                    panic = panic_message(&*panic),
                    "subscription callback panicked"
                );
            }
        }
    }
}
