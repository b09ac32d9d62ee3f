//! Configuration module for the signed-request client.
//!
//! Handles loading and validating client configuration from TOML files.

mod settings;

pub use settings::*;
