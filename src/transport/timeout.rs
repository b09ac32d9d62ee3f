//! Timeout handling for transport sends.

use std::time::Duration;

use tokio::time::timeout;

use crate::error::TransportError;

use super::{Transport, TransportRequest, TransportResponse};

/// Send a request, failing with `TransportError::Timeout` if no response
/// arrives within `request.timeout`.
///
/// The transport future is dropped on timeout.
pub async fn send_with_timeout(
    transport: &dyn Transport,
    request: TransportRequest,
) -> Result<TransportResponse, TransportError> {
    let limit = request.timeout;
    timeout(limit, transport.send(request))
        .await
        .map_err(|_| TransportError::Timeout {
            timeout_ms: duration_ms(limit),
        })?
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
