//! # Soren Transport
//!
//! Transport implementations for Soren plugins.
//!
//! | Transport | Use |
//! |-----------|-----|
//! | [`LocalBus`] | In-process broker: tests, demos, and hosts that embed the agent in the same process. |
//!
//! Broker-backed transports implement [`soren_core::Transport`] outside this
//! crate; the coordinator only ever sees the trait.

pub mod local;
pub mod pattern;

pub use local::LocalBus;
pub use pattern::subject_matches;
