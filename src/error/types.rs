//! Error types for the signed-request client.

use thiserror::Error;

use crate::protocol::FailedResponse;

/// Main error type for the client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The request could not be signed.
    #[error("Signing error: {kind}")]
    Signing { kind: SigningErrorKind },

    /// Device registration did not complete.
    #[error("Provisioning error: {kind}")]
    Provisioning { kind: ProvisioningErrorKind },

    /// No response was obtained from the transport.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server rejected the request key and recovery was exhausted or not applicable.
    #[error("Authentication error: {kind} (status {})", .response.status)]
    Authentication {
        kind: AuthErrorKind,
        response: Box<FailedResponse>,
    },

    /// A response arrived with a status outside the accepted range.
    #[error("Unacceptable status code {}", .response.status)]
    StatusOutOfRange { response: Box<FailedResponse> },

    /// The response body could not be decoded on an accepted status.
    #[error("Decode error: {message}")]
    Decode {
        message: String,
        response: Box<FailedResponse>,
    },

    /// The logical call was cancelled by the caller.
    #[error("Request cancelled")]
    Cancelled,

    /// Persisted auth state could not be read or written.
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Signing error kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningErrorKind {
    #[error("hash function produced no digest for the canonical string")]
    DigestUnavailable,

    #[error("no device id to sign with")]
    MissingDeviceId,

    #[error("key cannot be sent as a header value")]
    InvalidKeyHeader,

    #[error("URL has no host: {url}")]
    MissingHost { url: String },

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

/// Provisioning error kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningErrorKind {
    #[error("Device registration timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Device registration failed: {message}")]
    Failed { message: String },

    #[error("Devices endpoint returned status {status}")]
    Rejected { status: u16 },

    #[error("Device registration response carried no device id")]
    MissingToken,
}

/// Authentication failure codes reported by the server in the error envelope.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// The key timestamp is outside the server's window; recoverable by clock resync.
    #[error("KeyExpired")]
    KeyExpired,

    /// The key did not verify; recoverable by re-provisioning.
    #[error("KeyInvalid")]
    KeyInvalid,

    /// The device id is unknown to the server; recoverable by re-provisioning.
    #[error("DeviceIdInvalid")]
    DeviceIdInvalid,
}

impl AuthErrorKind {
    /// Map a server error code onto a known kind.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "KeyExpired" => Some(Self::KeyExpired),
            "KeyInvalid" => Some(Self::KeyInvalid),
            "DeviceIdInvalid" => Some(Self::DeviceIdInvalid),
            _ => None,
        }
    }

    /// Whether recovery means discarding the device token.
    pub fn requires_reprovisioning(self) -> bool {
        matches!(self, Self::KeyInvalid | Self::DeviceIdInvalid)
    }
}

/// Network-level failures reported by a transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Transport failure: {message}")]
    Other { message: String },
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_kind_from_code() {
        assert_eq!(AuthErrorKind::from_code("KeyExpired"), Some(AuthErrorKind::KeyExpired));
        assert_eq!(AuthErrorKind::from_code("KeyInvalid"), Some(AuthErrorKind::KeyInvalid));
        assert_eq!(
            AuthErrorKind::from_code("DeviceIdInvalid"),
            Some(AuthErrorKind::DeviceIdInvalid)
        );
        assert_eq!(AuthErrorKind::from_code("keyexpired"), None);
        assert_eq!(AuthErrorKind::from_code(""), None);
    }

    #[test]
    fn test_reprovisioning_kinds() {
        assert!(!AuthErrorKind::KeyExpired.requires_reprovisioning());
        assert!(AuthErrorKind::KeyInvalid.requires_reprovisioning());
        assert!(AuthErrorKind::DeviceIdInvalid.requires_reprovisioning());
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::Signing {
            kind: SigningErrorKind::DigestUnavailable,
        };
        assert!(err.to_string().starts_with("Signing error:"));

        let err: ClientError = TransportError::Timeout { timeout_ms: 1500 }.into();
        assert_eq!(err.to_string(), "Transport error: Request timed out after 1500ms");
    }
}
