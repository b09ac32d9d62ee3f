//! Request authentication.
//!
//! Handles key derivation for signed requests, clock-offset tracking
//! against the server, and the device token lifecycle.

pub mod clock;
mod device;
mod digest;
mod signer;

pub use clock::{ClockTracker, SystemClock, WallClock};
pub use device::{DeviceIdentity, SyncOutcome};
pub use digest::{default_hash, sha256_lowercase_hex, HashFn};
pub use signer::{canonical_string, sign, Credentials, Signer};
