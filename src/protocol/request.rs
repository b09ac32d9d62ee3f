//! Request types for the signed API.

use std::ops::RangeInclusive;
use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use url::Url;

use crate::error::{ClientError, ClientResult, SigningErrorKind};

/// The parts of an HTTP request that participate in the request key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignableRequest {
    pub method: Method,
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    /// Percent-decoded path.
    pub path: String,
    /// Already percent-encoded query string, without the leading `?`.
    pub raw_query: Option<String>,
    pub body: Option<Vec<u8>>,
}

impl SignableRequest {
    /// Decompose an absolute URL into signable parts.
    ///
    /// The port is only present when it differs from the scheme default.
    /// The path is signed decoded (`/todo/my item`), the query as sent.
    pub fn from_url(method: Method, url: &Url, body: Option<Vec<u8>>) -> ClientResult<Self> {
        let host = url.host_str().ok_or_else(|| ClientError::Signing {
            kind: SigningErrorKind::MissingHost {
                url: url.to_string(),
            },
        })?;

        Ok(Self {
            method,
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port: url.port(),
            path: percent_decode_str(url.path())
                .decode_utf8_lossy()
                .into_owned(),
            raw_query: url.query().map(str::to_string),
            body,
        })
    }

    /// Parse a URL string and decompose it.
    pub fn parse(method: Method, url: &str, body: Option<Vec<u8>>) -> ClientResult<Self> {
        let parsed = Url::parse(url).map_err(|e| ClientError::Signing {
            kind: SigningErrorKind::InvalidUrl {
                url: url.to_string(),
                message: e.to_string(),
            },
        })?;
        Self::from_url(method, &parsed, body)
    }
}

/// A caller's request template for one logical call.
///
/// The template is reused unchanged for every attempt of the call; only the
/// timestamp and key differ between attempts.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL.
    pub path: String,
    /// Query parameters, percent-encoded when the URL is resolved.
    pub query: Vec<(String, String)>,
    /// Path segments to substitute (`segment -> value`).
    pub path_replacements: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// Overrides the configured default timeout.
    pub timeout: Option<Duration>,
    /// Overrides the configured retry budget.
    pub retry_budget: Option<u32>,
    /// Overrides the configured accepted status range.
    pub acceptable_status: Option<RangeInclusive<u16>>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>, body: Option<Vec<u8>>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            path_replacements: Vec::new(),
            headers: HeaderMap::new(),
            body,
            timeout: None,
            retry_budget: None,
            acceptable_status: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, None)
    }

    pub fn post(path: impl Into<String>, body: Option<Vec<u8>>) -> Self {
        Self::new(Method::POST, path, body)
    }

    pub fn put(path: impl Into<String>, body: Option<Vec<u8>>) -> Self {
        Self::new(Method::PUT, path, body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path, None)
    }

    /// POST with a JSON-serialized body.
    pub fn post_json<T: Serialize>(path: impl Into<String>, value: &T) -> ClientResult<Self> {
        Ok(Self::post(path, Some(serde_json::to_vec(value)?)))
    }

    /// PUT with a JSON-serialized body.
    pub fn put_json<T: Serialize>(path: impl Into<String>, value: &T) -> ClientResult<Self> {
        Ok(Self::put(path, Some(serde_json::to_vec(value)?)))
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_path_replacement(
        mut self,
        segment: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.path_replacements.push((segment.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry_budget(mut self, retries: u32) -> Self {
        self.retry_budget = Some(retries);
        self
    }

    pub fn with_acceptable_status(mut self, range: RangeInclusive<u16>) -> Self {
        self.acceptable_status = Some(range);
        self
    }

    /// The body actually sent; bodies on GET/DELETE are dropped.
    pub fn effective_body(&self) -> Option<&[u8]> {
        if self.method == Method::POST || self.method == Method::PUT {
            self.body.as_deref()
        } else {
            None
        }
    }

    /// Resolve the template against the base URL.
    ///
    /// Path segments matching a replacement key are substituted, then the
    /// query parameters are appended.
    pub fn resolve_url(&self, base: &Url) -> ClientResult<Url> {
        let mut url = base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| ClientError::Config {
                message: format!("Base URL '{}' cannot carry a path", base),
            })?;
            segments.pop_if_empty();
            for segment in self.path.split('/').filter(|s| !s.is_empty()) {
                let value = self
                    .path_replacements
                    .iter()
                    .find(|(key, _)| key == segment)
                    .map(|(_, value)| value.as_str())
                    .unwrap_or(segment);
                segments.push(value);
            }
            if self.path.len() > 1 && self.path.ends_with('/') {
                segments.push("");
            }
        }

        if !self.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        Ok(url)
    }
}
