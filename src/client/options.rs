//! Client-wide defaults.

use std::ops::RangeInclusive;
use std::time::Duration;

use url::Url;

use crate::config::Settings;
use crate::error::ClientResult;
use crate::protocol::ApiRequest;

/// Defaults applied to every call unless the request overrides them.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL request paths are resolved against.
    pub base_url: Url,
    /// Devices collection used for registration and descriptor updates.
    pub devices_url: Url,
    pub default_timeout: Duration,
    pub retry_budget: u32,
    pub acceptable_status: RangeInclusive<u16>,
    pub provisioning_timeout: Duration,
}

impl ClientOptions {
    /// Options with the stock defaults: devices at `<base>/devices`, a 60s
    /// request timeout, two auth retries, 2xx accepted, 5s provisioning.
    pub fn new(base_url: Url) -> ClientResult<Self> {
        let devices_url = ApiRequest::get("/devices").resolve_url(&base_url)?;
        Ok(Self {
            base_url,
            devices_url,
            default_timeout: Duration::from_secs(60),
            retry_budget: 2,
            acceptable_status: 200..=299,
            provisioning_timeout: Duration::from_secs(5),
        })
    }

    pub fn from_settings(settings: &Settings) -> ClientResult<Self> {
        let base_url = settings.api.base_url()?;
        let devices_url = ApiRequest::get(settings.api.devices_path.as_str()).resolve_url(&base_url)?;
        Ok(Self {
            base_url,
            devices_url,
            default_timeout: Duration::from_secs(settings.api.default_timeout_seconds),
            retry_budget: settings.api.retry_budget,
            acceptable_status: settings.api.acceptable_status_min
                ..=settings.api.acceptable_status_max,
            provisioning_timeout: Duration::from_secs(settings.provisioning.timeout_seconds),
        })
    }

    pub fn with_retry_budget(mut self, retries: u32) -> Self {
        self.retry_budget = retries;
        self
    }

    pub fn with_acceptable_status(mut self, range: RangeInclusive<u16>) -> Self {
        self.acceptable_status = range;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_provisioning_timeout(mut self, timeout: Duration) -> Self {
        self.provisioning_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::new(Url::parse("http://localhost/demo-auth/v1").unwrap()).unwrap();
        assert_eq!(options.devices_url.as_str(), "http://localhost/demo-auth/v1/devices");
        assert_eq!(options.retry_budget, 2);
        assert_eq!(options.acceptable_status, 200..=299);
        assert_eq!(options.default_timeout, Duration::from_secs(60));
        assert_eq!(options.provisioning_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings::from_toml_str(
            r#"
            [api]
            base_url = "https://api.example.test/v2/"
            devices_path = "hardware/devices"
            retry_budget = 1
            acceptable_status_max = 304

            [credentials]
            secret_id = "id"
            secret = "secret"
            "#,
        )
        .unwrap();

        let options = ClientOptions::from_settings(&settings).unwrap();
        assert_eq!(
            options.devices_url.as_str(),
            "https://api.example.test/v2/hardware/devices"
        );
        assert_eq!(options.retry_budget, 1);
        assert_eq!(options.acceptable_status, 200..=304);
    }
}
