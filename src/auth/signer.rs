//! Request key generation.
//!
//! A request key binds the device, the secret, the second the request was
//! made, and the request itself (method, URL, and body) together:
//!
//! ```text
//! canonical = deviceID + secret + floor(ts) + METHOD + scheme://host[:port]path[?query][hash(body)]
//! key       = deviceID + secretID + floor(ts) + hash(canonical)
//! ```

use std::fmt;

use crate::error::{ClientError, ClientResult, SigningErrorKind};
use crate::protocol::SignableRequest;

use super::digest::{default_hash, HashFn};

/// Signing material for one installation.
#[derive(Clone)]
pub struct Credentials {
    /// Shared secret baked into the client. Never sent.
    pub device_secret: String,
    /// Public identifier of the secret, sent in the key.
    pub secret_id: String,
    /// Server-issued device identity; absent until provisioning succeeds.
    pub device_id: Option<String>,
}

impl Credentials {
    pub fn new(device_secret: impl Into<String>, secret_id: impl Into<String>) -> Self {
        Self {
            device_secret: device_secret.into(),
            secret_id: secret_id.into(),
            device_id: None,
        }
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("device_secret", &"<redacted>")
            .field("secret_id", &self.secret_id)
            .field("device_id", &self.device_id)
            .finish()
    }
}

/// Build the canonical string for a request.
///
/// The body contributes its digest only when it is valid UTF-8 and the
/// digest succeeds; otherwise it is silently left out.
pub fn canonical_string(
    device_id: &str,
    secret: &str,
    request: &SignableRequest,
    timestamp: f64,
    hash: &dyn Fn(&str) -> Option<String>,
) -> String {
    let mut canonical = format!(
        "{}{}{}{}{}://{}",
        device_id,
        secret,
        whole_seconds(timestamp),
        request.method.as_str(),
        request.scheme,
        request.host
    );

    if let Some(port) = request.port {
        canonical.push(':');
        canonical.push_str(&port.to_string());
    }

    canonical.push_str(&request.path);

    if let Some(query) = request.raw_query.as_deref().filter(|q| !q.is_empty()) {
        canonical.push('?');
        canonical.push_str(query);
    }

    let body_hash = request
        .body
        .as_deref()
        .and_then(|body| std::str::from_utf8(body).ok())
        .and_then(|text| hash(text));
    if let Some(body_hash) = body_hash {
        canonical.push_str(&body_hash);
    }

    canonical
}

/// Produce the request key for `request` at `timestamp`.
///
/// Fails when no device id is present or the digest yields nothing; a
/// failed key must never be replaced by an unsigned send.
pub fn sign(
    credentials: &Credentials,
    request: &SignableRequest,
    timestamp: f64,
    hash: &dyn Fn(&str) -> Option<String>,
) -> ClientResult<String> {
    let device_id = credentials
        .device_id
        .as_deref()
        .ok_or(ClientError::Signing {
            kind: SigningErrorKind::MissingDeviceId,
        })?;

    let canonical = canonical_string(
        device_id,
        &credentials.device_secret,
        request,
        timestamp,
        hash,
    );
    let signature = hash(&canonical).ok_or(ClientError::Signing {
        kind: SigningErrorKind::DigestUnavailable,
    })?;

    Ok(format!(
        "{}{}{}{}",
        device_id,
        credentials.secret_id,
        whole_seconds(timestamp),
        signature
    ))
}

fn whole_seconds(timestamp: f64) -> i64 {
    timestamp.floor() as i64
}

/// Secret-holding signer with an injected digest.
#[derive(Clone)]
pub struct Signer {
    secret: String,
    secret_id: String,
    hash: HashFn,
}

impl Signer {
    /// Create a signer using the production SHA-256 digest.
    pub fn new(secret: impl Into<String>, secret_id: impl Into<String>) -> Self {
        Self::with_hash(secret, secret_id, default_hash())
    }

    /// Create a signer with a custom digest.
    pub fn with_hash(secret: impl Into<String>, secret_id: impl Into<String>, hash: HashFn) -> Self {
        Self {
            secret: secret.into(),
            secret_id: secret_id.into(),
            hash,
        }
    }

    pub fn secret_id(&self) -> &str {
        &self.secret_id
    }

    /// Credentials for the given device id.
    pub fn credentials(&self, device_id: &str) -> Credentials {
        Credentials::new(self.secret.clone(), self.secret_id.clone()).with_device_id(device_id)
    }

    /// Sign `request` on behalf of `device_id`.
    pub fn sign(
        &self,
        device_id: &str,
        request: &SignableRequest,
        timestamp: f64,
    ) -> ClientResult<String> {
        sign(
            &self.credentials(device_id),
            request,
            timestamp,
            self.hash.as_ref(),
        )
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("secret", &"<redacted>")
            .field("secret_id", &self.secret_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::digest::sha256_lowercase_hex;
    use crate::protocol::Method;

    const DEVICE_ID: &str = "0ef72dcb75803b0e0ba9235328475274";
    const SECRET: &str = "ccc00ebadc3f854b67f199ec09eea9ab";
    const SECRET_ID: &str = "bbbd94ad33c56f13c2c11c758c611f49";

    fn signer() -> Signer {
        Signer::new(SECRET, SECRET_ID)
    }

    fn request(url: &str, body: Option<&[u8]>) -> SignableRequest {
        let method = if body.is_some() { Method::POST } else { Method::GET };
        SignableRequest::parse(method, url, body.map(<[u8]>::to_vec)).unwrap()
    }

    #[test]
    fn test_basic_key_vector() {
        let key = signer()
            .sign(
                DEVICE_ID,
                &request("http://stage.api.example.test/test/v1/authtest", None),
                500000000000.000,
            )
            .unwrap();

        assert_eq!(
            key,
            "0ef72dcb75803b0e0ba9235328475274\
             bbbd94ad33c56f13c2c11c758c611f49\
             500000000000\
             0002588d6aecf76fdb7e8e4df2c28b8212600468952ec0331ac7eed6f2d12323"
        );
    }

    #[test]
    fn test_port_query_and_body_vector() {
        let key = signer()
            .sign(
                DEVICE_ID,
                &request(
                    "https://api.example.test:8443/v1/items?a=1",
                    Some(&br#"{"name":"Todo"}"#[..]),
                ),
                1434440202.75,
            )
            .unwrap();

        assert_eq!(
            key,
            format!(
                "{}{}1434440202{}",
                DEVICE_ID,
                SECRET_ID,
                "394df1a61e07ff3adaa0184d7e02f87af48294bc030b0a39a002389594d5eb99"
            )
        );
    }

    #[test]
    fn test_canonical_string_layout() {
        let identity = |s: &str| Some(format!("<{}>", s));
        let canonical = canonical_string(
            "dev",
            "sec",
            &request("http://localhost:8080/a/b?x=1", Some(&b"body"[..])),
            99.9,
            &identity,
        );
        assert_eq!(canonical, "devsec99POSThttp://localhost:8080/a/b?x=1<body>");
    }

    #[test]
    fn test_empty_query_is_omitted() {
        let identity = |s: &str| Some(s.to_string());
        let mut req = request("http://localhost/a", None);
        req.raw_query = Some(String::new());
        let canonical = canonical_string("d", "s", &req, 1.0, &identity);
        assert_eq!(canonical, "ds1GEThttp://localhost/a");
    }

    #[test]
    fn test_body_changes_key() {
        let url = "http://localhost/items";
        let a = signer()
            .sign(DEVICE_ID, &request(url, Some(&b"{\"a\":1}"[..])), 1000.0)
            .unwrap();
        let b = signer()
            .sign(DEVICE_ID, &request(url, Some(&b"{\"a\":2}"[..])), 1000.0)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_non_utf8_body_equals_no_body() {
        let url = "http://localhost/items";
        let mut with_binary = request(url, Some(&[0xff, 0xfe, 0x00, 0x80][..]));
        let mut without = request(url, None);
        with_binary.method = Method::POST;
        without.method = Method::POST;

        let a = signer().sign(DEVICE_ID, &with_binary, 1000.0).unwrap();
        let b = signer().sign(DEVICE_ID, &without, 1000.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_encoded_path_is_signed_decoded() {
        let req = request("http://localhost/v1/todo/my%20item", None);
        let canonical = canonical_string(DEVICE_ID, SECRET, &req, 1000.0, &sha256_lowercase_hex);
        assert_eq!(
            canonical,
            format!("{}{}1000GEThttp://localhost/v1/todo/my item", DEVICE_ID, SECRET)
        );

        let key = signer().sign(DEVICE_ID, &req, 1000.0).unwrap();
        assert!(key.ends_with(&sha256_lowercase_hex(&canonical).unwrap()));
    }

    #[test]
    fn test_timestamp_is_floored() {
        let req = request("http://localhost/x", None);
        let a = signer().sign(DEVICE_ID, &req, 1000.01).unwrap();
        let b = signer().sign(DEVICE_ID, &req, 1000.99).unwrap();
        assert_eq!(a, b);
        assert!(a.contains(&format!("{}1000", SECRET_ID)));
    }

    #[test]
    fn test_failed_digest_is_an_error() {
        let signer = Signer::with_hash(SECRET, SECRET_ID, std::sync::Arc::new(|_: &str| None));
        let result = signer.sign(DEVICE_ID, &request("http://localhost/x", None), 1.0);
        assert!(matches!(
            result,
            Err(ClientError::Signing {
                kind: SigningErrorKind::DigestUnavailable
            })
        ));
    }

    #[test]
    fn test_missing_device_id() {
        let credentials = Credentials::new(SECRET, SECRET_ID);
        let result = sign(
            &credentials,
            &request("http://localhost/x", None),
            1.0,
            &sha256_lowercase_hex,
        );
        assert!(matches!(
            result,
            Err(ClientError::Signing {
                kind: SigningErrorKind::MissingDeviceId
            })
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", signer());
        assert!(!rendered.contains(SECRET));
        assert!(rendered.contains(SECRET_ID));
    }
}
