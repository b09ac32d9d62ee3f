//! API protocol types.
//!
//! Request templates, the signable view of a request, and the response
//! envelopes the backend uses.
//!
//! ## Envelopes
//!
//! ```text
//! success: {"response": <payload>}
//! failure: {"errors": [{"code": "KeyExpired"}]}
//! ```

mod request;
mod response;

pub use http::{HeaderMap, HeaderValue, Method};
pub use request::{ApiRequest, SignableRequest};
pub(crate) use response::DeviceRecord;
pub use response::{
    Delivery, Envelope, ErrorEntry, ErrorEnvelope, FailedResponse, EMPTY_BODY_STATUSES,
};

use http::header::HeaderName;

/// Request header carrying the request key.
pub const KEY_HEADER: HeaderName = HeaderName::from_static("key");

/// Response header carrying the server time in milliseconds since the epoch.
pub const TIMESTAMP_HEADER: HeaderName = HeaderName::from_static("timestamp");

/// Standard HTTP date header, accepted as a server-time fallback.
pub const DATE_HEADER: HeaderName = http::header::DATE;

/// Look up a header as text; non-visible-ASCII values count as absent.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
