//! Transport capability.
//!
//! The client never talks to the network directly; it hands prepared
//! requests to a [`Transport`] supplied by the host application.

mod timeout;
mod traits;

#[cfg(test)]
pub(crate) mod mock;

pub use timeout::send_with_timeout;
pub(crate) use timeout::duration_ms;
pub use traits::{Transport, TransportRequest, TransportResponse};
