//! Near-real-time notification delivery for a horizontally scaled fleet.
//!
//! Each running instance owns a durable broker queue and an in-process
//! registry of the push connections it currently holds. Domain services
//! persist a notification and broadcast a routing message to every instance
//! queue; each instance's dispatcher resolves the notification against the
//! store, pushes it over a live channel when the recipient is connected
//! here, and defers to the pull path otherwise. Delivery is at-least-once;
//! poisoned routing messages land on a dead-letter stream instead of
//! blocking the queue.

pub mod broker;
pub mod channel;
pub mod dispatcher;
pub mod payload;
pub mod publisher;
pub mod registry;
pub mod service;
pub mod store;
