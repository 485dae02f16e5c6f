//! # cellprobe Library
//!
//! Store-and-forward delivery of cellular radio quality measurements.
//!
//! This library turns raw LTE/NR readings into canonical measurement records,
//! sends them to a collection endpoint, and keeps every record that could not
//! be delivered in a durable on-disk queue until a later send succeeds.

pub mod config;
pub mod error;
pub mod identity;
pub mod measurement;
pub mod wire;
pub mod queue;
pub mod transport;
pub mod delivery;
pub mod simulator;
