//! Response types for the signed API.

use serde::{Deserialize, Serialize};

use http::HeaderMap;

/// Statuses that are allowed to carry no decodable body.
pub const EMPTY_BODY_STATUSES: [u16; 2] = [204, 205];

/// The standard `{"response": ...}` payload wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub response: T,
}

/// The `{"errors": [{"code": ...}]}` failure payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}

/// One entry of an error payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorEntry {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Device record returned by the registration endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DeviceRecord {
    pub id: String,
}

/// A successfully delivered logical call.
#[derive(Debug, Clone)]
pub struct Delivery<T> {
    pub status: u16,
    pub headers: HeaderMap,
    /// `None` only for statuses defined to carry no body.
    pub value: Option<T>,
}

impl<T> Delivery<T> {
    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

/// A received response that was not accepted, kept for caller diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FailedResponse {
    /// Parse the body as JSON, if it is JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// The first error code in the error payload.
    ///
    /// Any missing or malformed field yields `None`.
    pub fn first_error_code(&self) -> Option<String> {
        serde_json::from_slice::<ErrorEnvelope>(&self.body)
            .ok()?
            .errors
            .into_iter()
            .next()?
            .code
    }
}
