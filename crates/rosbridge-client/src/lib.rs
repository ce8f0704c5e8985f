//! Client-side protocol engine for the rosbridge v2 WebSocket protocol.
//!
//! A single [`Ros`] connection multiplexes any number of topic subscriptions,
//! service calls, service advertisements, and action goals over one
//! WebSocket session. Inbound frames are decoded once by the [`codec`] into a
//! [`Frame`] and handed to the [`Router`], which delivers each frame to the
//! one registrant that owns it: a topic callback, a pending service call, a
//! local service handler, or an action goal.
//!
//! Handles ([`Topic`], [`ServiceClient`], [`ServiceServer`], [`ActionClient`])
//! borrow the connection, so the compiler guarantees none of them outlives
//! it. Exactly one thread reads from the connection (via [`Ros::run_forever`]
//! or [`Ros::poll_once`]); user callbacks run on that thread, while blocking
//! calls such as [`ServiceClient::call`] suspend the calling thread only.
//!
//! # Example
//!
//! ```ignore
//! use rosbridge_client::{Message, Ros, Topic};
//! use rosbridge_config::BridgeEndpoint;
//!
//! let ros = Ros::new(BridgeEndpoint::new("localhost", 9090));
//! ros.connect()?;
//! let chatter = Topic::new(&ros, "/chatter", "std_msgs/String");
//! chatter.subscribe(|msg: &Message| println!("{}", msg.get("data").as_string()))?;
//! ros.run_forever()?;
//! ```

#![deny(missing_docs)]

pub mod action;
pub mod codec;
mod connection;
mod error;
mod ids;
mod message;
mod reader;
pub mod router;
mod service;
mod topic;
pub mod transport;

pub use action::{ActionClient, GoalHandle, GoalOutcome, GoalPhase};
pub use codec::{Frame, GoalStatusCode, Operation, StatusLevel};
pub use connection::{ConnectionState, Ros};
pub use error::{ClientError, ProtocolError, TransportError};
pub use ids::{AdvertisementId, GoalId, IdGenerator, RequestId, SubscriptionId};
pub use message::{Field, Message};
pub use router::{
    CallWaiter, DisplacedHandler, FeedbackCallback, GoalWaiter, Outbound, Router, ServiceHandler,
    SubscriptionOptions, TopicCallback,
};
pub use service::{ServiceClient, ServiceServer};
pub use topic::Topic;
pub use transport::{Connector, FrameSink, FrameSource, TransportPair, WebSocketConnector};

#[cfg(test)]
mod tests;
