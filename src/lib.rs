//! Lumo Auth Client Library
//!
//! This crate signs outbound API requests with per-request keys derived from
//! a provisioned device token, a shared secret, and a server-corrected
//! timestamp, and recovers from clock skew and stale device tokens by
//! re-signing and resending within a per-call retry budget.

pub mod auth;
pub mod client;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod protocol;
pub mod storage;
pub mod transport;

pub use client::{CallHandle, CancelToken, ClientOptions, RequestOrchestrator};
pub use error::{ClientError, ClientResult};
