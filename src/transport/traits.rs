//! Transport trait definition.

use std::time::Duration;

use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use http::Method;
use url::Url;

use crate::error::TransportError;

/// A fully prepared physical request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

/// A raw response as received from the network.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json(self, value: &serde_json::Value) -> Self {
        self.with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(value.to_string())
    }
}

/// The network capability the client dispatches through.
///
/// Implementations issue exactly one HTTP exchange per call and never retry.
/// Cancellation is expressed by dropping the returned future: the client
/// races every send against the caller's cancel token, so implementations
/// must release the underlying connection or task when dropped.
///
/// # Example
///
/// ```ignore
/// struct HyperTransport { client: HyperClient }
///
/// #[async_trait]
/// impl Transport for HyperTransport {
///     async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
///         let response = self.client.request(to_hyper(request)).await
///             .map_err(|e| TransportError::Connection { message: e.to_string() })?;
///         Ok(from_hyper(response).await)
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue the request and return the status, headers, and body.
    ///
    /// `request.timeout` is advisory for the implementation; the client also
    /// enforces it around the returned future.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
