//! Logical-call state machine.
//!
//! A logical call is one caller-visible request. It may take several
//! physical sends: a `401` caused by clock skew or a stale device token is
//! repaired (offset resync or re-registration) and the request re-signed
//! and resent, within a per-call retry budget.

use std::ops::RangeInclusive;
use std::sync::Arc;

use http::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{ClockTracker, DeviceIdentity, Signer, SystemClock, WallClock};
use crate::config::Settings;
use crate::descriptor::DescriptorSource;
use crate::error::{AuthErrorKind, ClientError, ClientResult, SigningErrorKind};
use crate::protocol::{
    ApiRequest, Delivery, FailedResponse, HeaderValue, SignableRequest, EMPTY_BODY_STATUSES,
    KEY_HEADER,
};
use crate::storage::{AuthStore, FileStore, MemoryStore};
use crate::transport::{send_with_timeout, Transport, TransportRequest, TransportResponse};

use super::{AttemptContext, CallState, CancelToken, ClientOptions};

/// What to do after a rejected attempt.
enum Recovery {
    Retry,
    Fail(ClientError),
}

/// Runs logical calls against the backend, signing every attempt.
///
/// One orchestrator owns the auth state for one backend; share it behind
/// an `Arc` rather than creating several over the same store.
pub struct RequestOrchestrator {
    options: ClientOptions,
    signer: Signer,
    identity: DeviceIdentity,
    clock: Arc<ClockTracker>,
    transport: Arc<dyn Transport>,
}

impl RequestOrchestrator {
    /// Create an orchestrator.
    ///
    /// # Arguments
    ///
    /// * `options` - Endpoints and per-call defaults
    /// * `signer` - Shared secret and hash used for request keys
    /// * `descriptor` - Description of this installation
    /// * `store` - Persisted token, clock offset, and descriptor fingerprint
    /// * `transport` - Network capability
    /// * `wall_clock` - Local time source
    pub fn new(
        options: ClientOptions,
        signer: Signer,
        descriptor: Arc<dyn DescriptorSource>,
        store: Arc<dyn AuthStore>,
        transport: Arc<dyn Transport>,
        wall_clock: Arc<dyn WallClock>,
    ) -> Self {
        let clock = Arc::new(ClockTracker::new(store.clone(), wall_clock));
        let identity = DeviceIdentity::new(
            options.devices_url.clone(),
            store,
            descriptor,
            transport.clone(),
            clock.clone(),
            options.provisioning_timeout,
        );

        Self {
            options,
            signer,
            identity,
            clock,
            transport,
        }
    }

    /// Build an orchestrator from configuration, using the system clock.
    pub fn from_settings(
        settings: &Settings,
        descriptor: Arc<dyn DescriptorSource>,
        transport: Arc<dyn Transport>,
    ) -> ClientResult<Self> {
        let options = ClientOptions::from_settings(settings)?;
        let signer = Signer::new(
            settings.credentials.load_secret()?,
            settings.credentials.secret_id.clone(),
        );

        let store: Arc<dyn AuthStore> = match &settings.storage.path {
            Some(path) => Arc::new(FileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };

        Ok(Self::new(
            options,
            signer,
            descriptor,
            store,
            transport,
            Arc::new(SystemClock),
        ))
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn clock(&self) -> &ClockTracker {
        &self.clock
    }

    /// Run one logical call to completion.
    ///
    /// Resolves to exactly one outcome. Once `cancel` fires the call stops at
    /// its next suspension point, drops any in-flight send, and returns
    /// [`ClientError::Cancelled`].
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        cancel: &CancelToken,
    ) -> ClientResult<Delivery<T>> {
        let url = request.resolve_url(&self.options.base_url)?;
        let body = request.effective_body().map(<[u8]>::to_vec);
        let accepted = request
            .acceptable_status
            .clone()
            .unwrap_or_else(|| self.options.acceptable_status.clone());
        let mut ctx =
            AttemptContext::new(request.retry_budget.unwrap_or(self.options.retry_budget));

        debug!(
            call_id = %ctx.call_id(),
            method = %request.method,
            url = %url,
            retries_remaining = ctx.retries_remaining(),
            "Starting call"
        );

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled(&mut ctx));
            }

            let token = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(&mut ctx)),
                token = self.identity.ensure_token() => token,
            };

            if token.is_some() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(cancelled(&mut ctx)),
                    _ = self
                        .identity
                        .sync_descriptor_if_needed(&self.signer, self.clock.authenticated_now()) => {}
                };
            }

            let transport_request =
                match self.prepare(request, &url, body.clone(), token.as_deref(), &ctx) {
                    Ok(prepared) => prepared,
                    Err(e) => {
                        ctx.transition(CallState::Failed);
                        warn!(call_id = %ctx.call_id(), error = %e, "Request could not be prepared");
                        return Err(e);
                    }
                };

            if cancel.is_cancelled() {
                return Err(cancelled(&mut ctx));
            }
            ctx.transition(CallState::Sending);

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(&mut ctx)),
                sent = send_with_timeout(self.transport.as_ref(), transport_request) => sent,
            };

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    ctx.transition(CallState::Failed);
                    warn!(
                        call_id = %ctx.call_id(),
                        attempt = ctx.attempt(),
                        error = %e,
                        "Request failed in transport"
                    );
                    return Err(e.into());
                }
            };

            let server_time_observed = self.clock.observe_headers(&response.headers).is_some();
            if server_time_observed {
                ctx.record_server_time(self.clock.authenticated_now());
            }

            if accepted.contains(&response.status) {
                return self.deliver(&mut ctx, response);
            }

            let failed = FailedResponse {
                status: response.status,
                headers: response.headers,
                body: response.body,
            };

            let recovery = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(&mut ctx)),
                recovery = self.recover(
                    &mut ctx,
                    failed,
                    token.as_deref(),
                    server_time_observed,
                    &accepted,
                ) => recovery,
            };

            match recovery {
                Recovery::Retry => ctx.transition(CallState::Preparing),
                Recovery::Fail(e) => {
                    ctx.transition(CallState::Failed);
                    warn!(
                        call_id = %ctx.call_id(),
                        attempt = ctx.attempt(),
                        error = %e,
                        "Call failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Run a logical call on its own task.
    pub fn spawn<T>(self: &Arc<Self>, request: ApiRequest) -> CallHandle<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let cancel = CancelToken::new();
        let orchestrator = Arc::clone(self);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { orchestrator.execute(&request, &task_cancel).await });
        CallHandle { cancel, task }
    }

    /// Build the physical request for one attempt, signed when a token exists.
    fn prepare(
        &self,
        request: &ApiRequest,
        url: &Url,
        body: Option<Vec<u8>>,
        token: Option<&str>,
        ctx: &AttemptContext,
    ) -> ClientResult<TransportRequest> {
        let mut headers = request.headers.clone();
        if body.is_some() && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        match token {
            Some(token) => {
                let signable =
                    SignableRequest::from_url(request.method.clone(), url, body.clone())?;
                let key = self
                    .signer
                    .sign(token, &signable, self.clock.authenticated_now())?;
                let key = HeaderValue::from_str(&key).map_err(|_| ClientError::Signing {
                    kind: SigningErrorKind::InvalidKeyHeader,
                })?;
                headers.insert(KEY_HEADER, key);
            }
            None => {
                warn!(call_id = %ctx.call_id(), "No device token, sending unsigned request");
            }
        }

        Ok(TransportRequest {
            method: request.method.clone(),
            url: url.clone(),
            headers,
            body,
            timeout: request.timeout.unwrap_or(self.options.default_timeout),
        })
    }

    fn deliver<T: DeserializeOwned>(
        &self,
        ctx: &mut AttemptContext,
        response: TransportResponse,
    ) -> ClientResult<Delivery<T>> {
        let decoded = serde_json::from_slice::<T>(&response.body);
        let value = match decoded {
            Ok(value) => Some(value),
            Err(_) if EMPTY_BODY_STATUSES.contains(&response.status) => None,
            Err(e) => {
                ctx.transition(CallState::Failed);
                warn!(
                    call_id = %ctx.call_id(),
                    status = response.status,
                    error = %e,
                    "Response body could not be decoded"
                );
                return Err(ClientError::Decode {
                    message: e.to_string(),
                    response: Box::new(FailedResponse {
                        status: response.status,
                        headers: response.headers,
                        body: response.body,
                    }),
                });
            }
        };

        ctx.transition(CallState::Delivered);
        info!(
            call_id = %ctx.call_id(),
            status = response.status,
            attempts = ctx.attempt(),
            "Call delivered"
        );

        Ok(Delivery {
            status: response.status,
            headers: response.headers,
            value,
        })
    }

    /// Classify a rejected attempt and repair the auth state if it can be.
    async fn recover(
        &self,
        ctx: &mut AttemptContext,
        failed: FailedResponse,
        token: Option<&str>,
        server_time_observed: bool,
        accepted: &RangeInclusive<u16>,
    ) -> Recovery {
        let kind = if failed.status == 401 {
            failed
                .first_error_code()
                .as_deref()
                .and_then(AuthErrorKind::from_code)
        } else {
            None
        };

        let Some(kind) = kind else {
            debug!(
                call_id = %ctx.call_id(),
                status = failed.status,
                accepted = ?accepted,
                "Status outside accepted range"
            );
            return Recovery::Fail(ClientError::StatusOutOfRange {
                response: Box::new(failed),
            });
        };

        if ctx.retries_remaining() == 0 {
            return Recovery::Fail(authentication(kind, failed));
        }

        match kind {
            AuthErrorKind::KeyExpired => {
                let resynced = server_time_observed
                    || self.clock.observe_headers_or_date(&failed.headers).is_some();
                if !resynced {
                    warn!(call_id = %ctx.call_id(), "Key expired but no server time to resync from");
                    return Recovery::Fail(authentication(kind, failed));
                }
                if !server_time_observed {
                    ctx.record_server_time(self.clock.authenticated_now());
                }
            }
            AuthErrorKind::KeyInvalid | AuthErrorKind::DeviceIdInvalid => {
                if let Some(token) = token {
                    if let Err(e) = self.identity.invalidate_if_current(token).await {
                        warn!(call_id = %ctx.call_id(), error = %e, "Failed to clear device token");
                    }
                }
            }
        }

        ctx.take_retry();
        ctx.transition(CallState::Retrying);
        info!(
            call_id = %ctx.call_id(),
            attempt = ctx.attempt(),
            reason = %kind,
            retries_remaining = ctx.retries_remaining(),
            server_time = ?ctx.last_server_time(),
            "Retrying after authentication failure"
        );
        Recovery::Retry
    }
}

fn authentication(kind: AuthErrorKind, failed: FailedResponse) -> ClientError {
    ClientError::Authentication {
        kind,
        response: Box::new(failed),
    }
}

fn cancelled(ctx: &mut AttemptContext) -> ClientError {
    ctx.transition(CallState::Cancelled);
    info!(call_id = %ctx.call_id(), attempt = ctx.attempt(), "Call cancelled");
    ClientError::Cancelled
}

/// Handle to a call started with [`RequestOrchestrator::spawn`].
pub struct CallHandle<T> {
    cancel: CancelToken,
    task: JoinHandle<ClientResult<Delivery<T>>>,
}

impl<T> CallHandle<T> {
    /// Cancel the call; it resolves to [`ClientError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the call's single outcome.
    pub async fn join(self) -> ClientResult<Delivery<T>> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(ClientError::Cancelled),
        }
    }
}
