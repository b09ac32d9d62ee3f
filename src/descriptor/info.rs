//! Structured device descriptor and its wire format.

use ring::digest;
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;

use super::DescriptorSource;

/// Locale of the installation, as a BCP 47-style code (`de-DE`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Culture {
    pub code: String,
}

impl Culture {
    /// Build from a platform locale identifier, turning `de_DE` into `de-DE`.
    pub fn from_locale(identifier: &str) -> Self {
        Self {
            code: identifier.replace('_', "-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Os {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
}

/// Mobile carrier; empty when unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screen {
    pub resolution: String,
}

impl Screen {
    /// Native resolution rendered as `HEIGHTxWIDTH`.
    pub fn from_dimensions(height: u32, width: u32) -> Self {
        Self {
            resolution: format!("{}x{}", height, width),
        }
    }
}

/// Push-notification registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub token: String,
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub os: Os,
    pub carrier: Carrier,
    pub screen: Screen,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
    /// Form factor: `phone`, `tablet`, `tv`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub version: String,
    pub advertiser: Identifier,
    pub vendor: Identifier,
}

/// Everything the server records about one installation.
///
/// Serializes to:
///
/// ```json
/// {"culture":{"code":"de-DE"},
///  "app":{"id":"...","version":"...","advertiser":{"id":"..."},"vendor":{"id":"..."}},
///  "device":{"os":{"type":"...","version":"..."},"carrier":{"type":"..."},
///            "screen":{"resolution":"..."},"notification":{...},"group":"...","model":"..."}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub culture: Culture,
    pub app: App,
    pub device: Device,
}

impl DeviceDescriptor {
    /// Create a descriptor with the required fields; optional parts are empty.
    pub fn new(
        culture: Culture,
        os: Os,
        screen: Screen,
        app_id: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            culture,
            app: App {
                id: app_id.into(),
                version: app_version.into(),
                advertiser: Identifier::default(),
                vendor: Identifier::default(),
            },
            device: Device {
                os,
                carrier: Carrier::default(),
                screen,
                notification: None,
                group: None,
                model: None,
            },
        }
    }

    pub fn with_carrier(mut self, carrier: impl Into<String>) -> Self {
        self.device.carrier = Carrier {
            kind: carrier.into(),
        };
        self
    }

    pub fn with_notification(
        mut self,
        token: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        self.device.notification = Some(Notification {
            token: token.into(),
            environment: environment.into(),
        });
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.device.group = Some(group.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.device.model = Some(model.into());
        self
    }

    pub fn with_vendor_id(mut self, id: impl Into<String>) -> Self {
        self.app.vendor = Identifier { id: id.into() };
        self
    }

    pub fn with_advertiser_id(mut self, id: impl Into<String>) -> Self {
        self.app.advertiser = Identifier { id: id.into() };
        self
    }

    /// SHA-256 over the attributes the server copy must track: culture,
    /// OS version, app version, and push token.
    pub fn fingerprint(&self) -> String {
        let material = format!(
            "{}{}{}{}",
            self.culture.code,
            self.device.os.version,
            self.app.version,
            self.device
                .notification
                .as_ref()
                .map(|n| n.token.as_str())
                .unwrap_or("")
        );
        hex::encode(digest::digest(&digest::SHA256, material.as_bytes()).as_ref())
    }
}

impl DescriptorSource for DeviceDescriptor {
    fn body(&self) -> ClientResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn fingerprint(&self) -> String {
        DeviceDescriptor::fingerprint(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor() -> DeviceDescriptor {
        DeviceDescriptor::new(
            Culture::from_locale("de_DE"),
            Os {
                kind: "iOS".to_string(),
                version: "9.2".to_string(),
            },
            Screen::from_dimensions(1334, 750),
            "de.example.app",
            "1.4.0",
        )
    }

    #[test]
    fn test_wire_format() {
        let value: serde_json::Value =
            serde_json::from_slice(&descriptor().with_carrier("Telekom").body().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "culture": {"code": "de-DE"},
                "app": {
                    "id": "de.example.app",
                    "version": "1.4.0",
                    "advertiser": {"id": ""},
                    "vendor": {"id": ""}
                },
                "device": {
                    "os": {"type": "iOS", "version": "9.2"},
                    "carrier": {"type": "Telekom"},
                    "screen": {"resolution": "1334x750"}
                }
            })
        );
    }

    #[test]
    fn test_optional_parts_serialized_when_present() {
        let value: serde_json::Value = serde_json::from_slice(
            &descriptor()
                .with_notification("push-token", "production")
                .with_group("phone")
                .with_model("iPhone8,1")
                .body()
                .unwrap(),
        )
        .unwrap();

        assert_eq!(value["device"]["notification"]["token"], "push-token");
        assert_eq!(value["device"]["group"], "phone");
        assert_eq!(value["device"]["model"], "iPhone8,1");
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let d = descriptor().with_notification("t", "sandbox");
        assert_eq!(d.body().unwrap(), d.clone().body().unwrap());
    }

    #[test]
    fn test_fingerprint_tracks_sync_attributes() {
        let base = descriptor();
        let fingerprint = base.fingerprint();
        assert_eq!(fingerprint.len(), 64);
        assert_eq!(fingerprint, descriptor().fingerprint());

        assert_ne!(fingerprint, base.clone().with_notification("new", "env").fingerprint());

        let mut upgraded = base.clone();
        upgraded.app.version = "1.5.0".to_string();
        assert_ne!(fingerprint, upgraded.fingerprint());

        // Carrier changes alone do not force a re-sync.
        assert_eq!(fingerprint, base.with_carrier("Vodafone").fingerprint());
    }
}
