//! Request-scoped metadata passed through challenge, forbid and sign-in flows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const REDIRECT_URI_KEY: &str = ".redirect";
const ISSUED_UTC_KEY: &str = ".issued";
const EXPIRES_UTC_KEY: &str = ".expires";
const IS_PERSISTENT_KEY: &str = ".persistent";
const ALLOW_REFRESH_KEY: &str = ".refresh";

/// Mutable bag of state values about an authentication session.
///
/// `items` round-trip with the session; `parameters` only live for the
/// current operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationProperties {
    #[serde(default)]
    items: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    parameters: BTreeMap<String, serde_json::Value>,
}

impl AuthenticationProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create properties that redirect to `uri` after the operation.
    pub fn with_redirect_uri(uri: impl Into<String>) -> Self {
        let mut properties = Self::new();
        properties.set_redirect_uri(Some(uri.into()));
        properties
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.parameters.is_empty()
    }

    pub fn items(&self) -> &BTreeMap<String, String> {
        &self.items
    }

    pub fn item(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    /// Set or remove (`None`) an item.
    pub fn set_item(&mut self, key: impl Into<String>, value: Option<String>) {
        let key = key.into();
        match value {
            Some(value) => {
                self.items.insert(key, value);
            }
            None => {
                self.items.remove(&key);
            }
        }
    }

    pub fn parameter(&self, key: &str) -> Option<&serde_json::Value> {
        self.parameters.get(key)
    }

    pub fn set_parameter(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.parameters.insert(key.into(), value);
    }

    pub fn redirect_uri(&self) -> Option<&str> {
        self.item(REDIRECT_URI_KEY)
    }

    pub fn set_redirect_uri(&mut self, uri: Option<String>) {
        self.set_item(REDIRECT_URI_KEY, uri);
    }

    pub fn issued_utc(&self) -> Option<DateTime<Utc>> {
        self.date_item(ISSUED_UTC_KEY)
    }

    pub fn set_issued_utc(&mut self, value: Option<DateTime<Utc>>) {
        self.set_item(ISSUED_UTC_KEY, value.map(|v| v.to_rfc3339()));
    }

    pub fn expires_utc(&self) -> Option<DateTime<Utc>> {
        self.date_item(EXPIRES_UTC_KEY)
    }

    pub fn set_expires_utc(&mut self, value: Option<DateTime<Utc>>) {
        self.set_item(EXPIRES_UTC_KEY, value.map(|v| v.to_rfc3339()));
    }

    pub fn is_persistent(&self) -> bool {
        self.item(IS_PERSISTENT_KEY).is_some()
    }

    pub fn set_persistent(&mut self, persistent: bool) {
        self.set_item(IS_PERSISTENT_KEY, persistent.then(String::new));
    }

    pub fn allow_refresh(&self) -> Option<bool> {
        self.bool_item(ALLOW_REFRESH_KEY)
    }

    pub fn set_allow_refresh(&mut self, value: Option<bool>) {
        self.set_item(ALLOW_REFRESH_KEY, value.map(|v| v.to_string()));
    }

    fn date_item(&self, key: &str) -> Option<DateTime<Utc>> {
        self.item(key)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn bool_item(&self, key: &str) -> Option<bool> {
        self.item(key).and_then(|v| v.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_properties_are_empty() {
        let properties = AuthenticationProperties::new();
        assert!(properties.is_empty());
        assert_eq!(properties.redirect_uri(), None);
        assert!(!properties.is_persistent());
        assert_eq!(properties.allow_refresh(), None);
    }

    #[test]
    fn test_redirect_uri() {
        let mut properties = AuthenticationProperties::with_redirect_uri("/home");
        assert_eq!(properties.redirect_uri(), Some("/home"));
        assert!(!properties.is_empty());

        properties.set_redirect_uri(None);
        assert!(properties.is_empty());
    }

    #[test]
    fn test_timestamps() {
        let issued = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let expires = Utc.with_ymd_and_hms(2025, 1, 2, 12, 0, 0).unwrap();

        let mut properties = AuthenticationProperties::new();
        properties.set_issued_utc(Some(issued));
        properties.set_expires_utc(Some(expires));

        assert_eq!(properties.issued_utc(), Some(issued));
        assert_eq!(properties.expires_utc(), Some(expires));
    }

    #[test]
    fn test_malformed_timestamp_is_ignored() {
        let mut properties = AuthenticationProperties::new();
        properties.set_item(".expires", Some("not a date".to_string()));
        assert_eq!(properties.expires_utc(), None);
    }

    #[test]
    fn test_flags() {
        let mut properties = AuthenticationProperties::new();
        properties.set_persistent(true);
        properties.set_allow_refresh(Some(false));

        assert!(properties.is_persistent());
        assert_eq!(properties.allow_refresh(), Some(false));

        properties.set_persistent(false);
        assert!(!properties.is_persistent());
    }

    #[test]
    fn test_parameters_are_not_serialized_when_empty() {
        let properties = AuthenticationProperties::with_redirect_uri("/next");
        let json = serde_json::to_value(&properties).unwrap();
        assert_eq!(json, serde_json::json!({ "items": { ".redirect": "/next" } }));

        let mut with_params = properties.clone();
        with_params.set_parameter("scope", serde_json::json!(["read"]));
        assert_eq!(with_params.parameter("scope"), Some(&serde_json::json!(["read"])));
    }
}
