//! Teamup notification API: the SSE push endpoint, read acknowledgment, and
//! shared state for the per-instance dispatcher wiring.

pub mod middleware;
pub mod routes;
pub mod state;
