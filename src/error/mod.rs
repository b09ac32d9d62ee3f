//! Error types for the signed-request client.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
