//! Device descriptor.
//!
//! The host application describes the installation (locale, OS, carrier,
//! screen, push registration, app and advertising identifiers). The client
//! sends the description when registering the device and re-sends it
//! whenever its fingerprint changes.

mod info;

pub use info::{
    App, Carrier, Culture, Device, DeviceDescriptor, Identifier, Notification, Os, Screen,
};

use crate::error::ClientResult;

/// Source of the device description.
pub trait DescriptorSource: Send + Sync {
    /// JSON body sent to the devices endpoint.
    fn body(&self) -> ClientResult<Vec<u8>>;

    /// Stable fingerprint; a change means the server copy is stale.
    fn fingerprint(&self) -> String;
}
