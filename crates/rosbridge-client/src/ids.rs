//! Correlation identifiers and their generator.
//!
//! Every identifier is drawn from a per-connection monotonic counter and is
//! never reused while the connection lives. String ids follow the rosbridge
//! convention `<op>:<name>:<sequence>`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! correlation_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Wraps an identifier received from, or agreed with, the peer.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrowed string form used on the wire.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

correlation_id!(
    /// Identifies one topic subscription.
    SubscriptionId
);

correlation_id!(
    /// Correlates a `call_service` request with its `service_response`.
    RequestId
);

correlation_id!(
    /// Identifies one action goal.
    GoalId
);

/// Token identifying one service advertisement made by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdvertisementId(u64);

impl AdvertisementId {
    /// Raw sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Thread-safe generator for correlation identifiers.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    /// Creates a generator whose first sequence number is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Id for a new subscription to `topic`.
    pub fn subscription(&self, topic: &str) -> SubscriptionId {
        SubscriptionId(format!("subscribe:{topic}:{}", self.next_sequence()))
    }

    /// Id for a new call to `service`.
    pub fn request(&self, service: &str) -> RequestId {
        RequestId(format!("call_service:{service}:{}", self.next_sequence()))
    }

    /// Id for a new goal sent to `action`.
    pub fn goal(&self, action: &str) -> GoalId {
        GoalId(format!("send_action_goal:{action}:{}", self.next_sequence()))
    }

    /// Id for a publisher advertisement of `topic`.
    pub fn publisher(&self, topic: &str) -> String {
        format!("advertise:{topic}:{}", self.next_sequence())
    }

    /// Token for a new service advertisement.
    pub fn advertisement(&self) -> AdvertisementId {
        AdvertisementId(self.next_sequence())
    }
}
