//! Crate-level tests driving a [`crate::Ros`] against an in-memory bridge.

mod behaviour;
mod support;
