//! Device identity provisioning and descriptor sync.
//!
//! The server issues one device token per installation. The token is
//! fetched once, cached in the auth store, and used as the device id of
//! every request key until the server reports it invalid.

use std::sync::Arc;
use std::time::Duration;

use http::header::CONTENT_TYPE;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use crate::descriptor::DescriptorSource;
use crate::error::{
    ClientError, ClientResult, ProvisioningErrorKind, SigningErrorKind, TransportError,
};
use crate::protocol::{
    DeviceRecord, Envelope, HeaderMap, HeaderValue, Method, SignableRequest, KEY_HEADER,
};
use crate::storage::AuthStore;
use crate::transport::{duration_ms, send_with_timeout, Transport, TransportRequest};

use super::{ClockTracker, Signer};

/// Result of a descriptor sync check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The server already has the current descriptor.
    InSync,
    /// No device token is cached, so there is no record to update.
    NoToken,
    /// The descriptor was sent and accepted.
    Updated,
    /// The update did not go through; it is retried on the next call.
    Failed,
}

/// Outcome of one registration attempt, as seen by every caller waiting on it.
type Provisioned = Result<String, ProvisioningErrorKind>;

/// Receiver for the registration in flight, if any.
type InFlightSlot = std::sync::Mutex<Option<watch::Receiver<Option<Provisioned>>>>;

/// Owner of the device token and the server-side device record.
pub struct DeviceIdentity {
    endpoint: Url,
    store: Arc<dyn AuthStore>,
    descriptor: Arc<dyn DescriptorSource>,
    transport: Arc<dyn Transport>,
    clock: Arc<ClockTracker>,
    /// Bound on each registration and update exchange.
    timeout: Duration,
    /// Serializes the read-or-fetch of the token and its invalidation.
    token_lock: Mutex<()>,
    /// Registration currently in flight; `None` until its outcome is sent.
    in_flight: InFlightSlot,
    /// Serializes descriptor updates.
    sync_lock: Mutex<()>,
}

/// Clears the in-flight slot when the registering caller finishes or is dropped.
struct InFlightGuard<'a>(&'a InFlightSlot);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

enum Role {
    Register(watch::Sender<Option<Provisioned>>),
    Wait(watch::Receiver<Option<Provisioned>>),
}

impl DeviceIdentity {
    /// Create a device identity.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Devices collection URL (`POST` registers, `PUT <endpoint>/<token>` updates)
    /// * `timeout` - Bound on each registration or update exchange
    pub fn new(
        endpoint: Url,
        store: Arc<dyn AuthStore>,
        descriptor: Arc<dyn DescriptorSource>,
        transport: Arc<dyn Transport>,
        clock: Arc<ClockTracker>,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint,
            store,
            descriptor,
            transport,
            clock,
            timeout,
            token_lock: Mutex::new(()),
            in_flight: std::sync::Mutex::new(None),
            sync_lock: Mutex::new(()),
        }
    }

    /// The currently cached token, without provisioning.
    pub fn cached_token(&self) -> Option<String> {
        self.store.token()
    }

    /// Return the cached token, registering the device if there is none.
    ///
    /// Provisioning failures are logged and reported as `None`; nothing is
    /// cached, so the next call tries again.
    pub async fn ensure_token(&self) -> Option<String> {
        match self.try_ensure_token().await {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(error = %e, "Device token unavailable");
                None
            }
        }
    }

    /// Like [`DeviceIdentity::ensure_token`], but reports why no token is available.
    ///
    /// At most one registration is in flight. Concurrent callers wait for
    /// it and all receive its outcome, success or failure. If the
    /// registering caller is dropped first, a waiter takes over.
    pub async fn try_ensure_token(&self) -> ClientResult<String> {
        loop {
            if let Some(token) = self.store.token() {
                return Ok(token);
            }

            let role = {
                let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
                match slot.as_ref() {
                    Some(receiver) => Role::Wait(receiver.clone()),
                    None => {
                        let (sender, receiver) = watch::channel(None);
                        *slot = Some(receiver);
                        Role::Register(sender)
                    }
                }
            };

            match role {
                Role::Register(sender) => {
                    let _in_flight = InFlightGuard(&self.in_flight);
                    let outcome = self.provision().await;
                    sender.send_replace(Some(outcome.clone()));
                    return outcome.map_err(|kind| ClientError::Provisioning { kind });
                }
                Role::Wait(mut receiver) => {
                    let shared = match receiver.wait_for(Option::is_some).await {
                        Ok(outcome) => outcome.clone(),
                        Err(_) => {
                            debug!("Registering caller went away; retrying");
                            continue;
                        }
                    };
                    match shared {
                        Some(outcome) => {
                            return outcome.map_err(|kind| ClientError::Provisioning { kind })
                        }
                        None => continue,
                    }
                }
            }
        }
    }

    /// One bounded registration; stores the token on success.
    async fn provision(&self) -> Provisioned {
        let _guard = self.token_lock.lock().await;

        if let Some(token) = self.store.token() {
            return Ok(token);
        }

        let fingerprint = self.descriptor.fingerprint();
        let token = match tokio::time::timeout(self.timeout, self.register()).await {
            Ok(Ok(token)) => token,
            Ok(Err(ClientError::Provisioning { kind })) => return Err(kind),
            Ok(Err(other)) => {
                return Err(ProvisioningErrorKind::Failed {
                    message: other.to_string(),
                })
            }
            Err(_) => {
                return Err(ProvisioningErrorKind::Timeout {
                    timeout_ms: duration_ms(self.timeout),
                })
            }
        };

        if let Err(e) = self.store.set_token(Some(token.clone())) {
            warn!(error = %e, "Failed to persist device token");
        }
        if let Err(e) = self.store.set_descriptor_hash(Some(fingerprint)) {
            warn!(error = %e, "Failed to persist descriptor fingerprint");
        }

        info!(endpoint = %self.endpoint, "Device registered");
        Ok(token)
    }

    /// Discard the cached token; the next call re-registers the device.
    ///
    /// The clock offset and descriptor fingerprint are kept.
    pub async fn invalidate(&self) -> ClientResult<()> {
        let _guard = self.token_lock.lock().await;
        self.store.set_token(None)?;
        info!("Device token invalidated");
        Ok(())
    }

    /// Discard the cached token only if it is still `rejected`.
    ///
    /// A call that failed with an old token must not throw away a token
    /// another call has already replaced it with. Returns whether the token
    /// was cleared.
    pub async fn invalidate_if_current(&self, rejected: &str) -> ClientResult<bool> {
        let _guard = self.token_lock.lock().await;
        if self.store.token().as_deref() != Some(rejected) {
            debug!("Rejected device token already replaced");
            return Ok(false);
        }
        self.store.set_token(None)?;
        info!("Device token invalidated");
        Ok(true)
    }

    /// Push the descriptor to the server if its fingerprint changed.
    ///
    /// Never fails the caller: errors are logged and leave the stored
    /// fingerprint untouched so the next call retries.
    pub async fn sync_descriptor_if_needed(
        &self,
        signer: &Signer,
        authenticated_now: f64,
    ) -> SyncOutcome {
        if self.in_sync() {
            return SyncOutcome::InSync;
        }

        let _guard = self.sync_lock.lock().await;

        if self.in_sync() {
            return SyncOutcome::InSync;
        }

        let Some(token) = self.store.token() else {
            return SyncOutcome::NoToken;
        };

        let fingerprint = self.descriptor.fingerprint();
        match self.update_record(signer, &token, authenticated_now).await {
            Ok(()) => {
                if let Err(e) = self.store.set_descriptor_hash(Some(fingerprint)) {
                    warn!(error = %e, "Failed to persist descriptor fingerprint");
                }
                info!("Device descriptor updated");
                SyncOutcome::Updated
            }
            Err(e) => {
                warn!(error = %e, "Device descriptor update failed");
                SyncOutcome::Failed
            }
        }
    }

    fn in_sync(&self) -> bool {
        self.store.descriptor_hash().as_deref() == Some(self.descriptor.fingerprint().as_str())
    }

    /// `POST <endpoint>` with the descriptor; returns the issued token.
    async fn register(&self) -> ClientResult<String> {
        let request = TransportRequest {
            method: Method::POST,
            url: self.endpoint.clone(),
            headers: json_headers(),
            body: Some(self.descriptor.body()?),
            timeout: self.timeout,
        };

        debug!(endpoint = %self.endpoint, "Registering device");
        let response = send_with_timeout(self.transport.as_ref(), request)
            .await
            .map_err(|e| ClientError::Provisioning {
                kind: match e {
                    TransportError::Timeout { timeout_ms } => {
                        ProvisioningErrorKind::Timeout { timeout_ms }
                    }
                    other => ProvisioningErrorKind::Failed {
                        message: other.to_string(),
                    },
                },
            })?;

        self.clock.observe_headers(&response.headers);

        if !(200..300).contains(&response.status) {
            return Err(ClientError::Provisioning {
                kind: ProvisioningErrorKind::Rejected {
                    status: response.status,
                },
            });
        }

        let envelope: Envelope<DeviceRecord> =
            serde_json::from_slice(&response.body).map_err(|_| ClientError::Provisioning {
                kind: ProvisioningErrorKind::MissingToken,
            })?;

        if envelope.response.id.is_empty() {
            return Err(ClientError::Provisioning {
                kind: ProvisioningErrorKind::MissingToken,
            });
        }

        Ok(envelope.response.id)
    }

    /// Signed `PUT <endpoint>/<token>` with the descriptor.
    async fn update_record(
        &self,
        signer: &Signer,
        token: &str,
        authenticated_now: f64,
    ) -> ClientResult<()> {
        let url = record_url(&self.endpoint, token)?;
        let body = self.descriptor.body()?;

        let signable = SignableRequest::from_url(Method::PUT, &url, Some(body.clone()))?;
        let key = signer.sign(token, &signable, authenticated_now)?;
        let key = HeaderValue::from_str(&key).map_err(|_| ClientError::Signing {
            kind: SigningErrorKind::InvalidKeyHeader,
        })?;

        let mut headers = json_headers();
        headers.insert(KEY_HEADER, key);

        let request = TransportRequest {
            method: Method::PUT,
            url,
            headers,
            body: Some(body),
            timeout: self.timeout,
        };

        let response = send_with_timeout(self.transport.as_ref(), request).await?;
        self.clock.observe_headers(&response.headers);

        if (200..300).contains(&response.status) {
            Ok(())
        } else {
            Err(ClientError::Provisioning {
                kind: ProvisioningErrorKind::Rejected {
                    status: response.status,
                },
            })
        }
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// `<endpoint>/<token>`
fn record_url(endpoint: &Url, token: &str) -> ClientResult<Url> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|_| ClientError::Config {
            message: format!("Devices endpoint '{}' cannot carry a path", endpoint),
        })?
        .pop_if_empty()
        .push(token);
    Ok(url)
}
