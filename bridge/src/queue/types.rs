//! Message types for the notification exchange.
//!
//! This module defines the build notification accepted over HTTP and
//! published, unchanged in structure, to the broker exchange.

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Default exchange that notifications are published to.
pub const DEFAULT_EXCHANGE: &str = "amqp.fanout";

/// Default routing key attached to every published notification.
pub const DEFAULT_ROUTING_KEY: &str = "notifications.jenkins.build";

/// Content type of every message published to the exchange.
pub const CONTENT_TYPE_JSON: &str = "application/json";

// =============================================================================
// Notification
// =============================================================================

/// A build notification as sent by the CI server's notification webhook.
///
/// Only the fields listed here are kept. Anything else in the inbound
/// document is ignored on decode and not forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Details of the build that triggered the notification
    pub build: Build,
    /// Job name
    pub name: String,
    /// Job URL
    pub url: String,
}

/// Build descriptor carried inside a [`Notification`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    /// Build number, kept in its decoded numeric form so it re-encodes as received
    pub number: Number,
    /// Build phase (e.g. `STARTED`, `COMPLETED`, `FINALIZED`)
    pub phase: String,
    /// Build URL
    pub url: String,
}

impl Notification {
    /// Create a new notification.
    pub fn new(
        number: impl Into<Number>,
        phase: impl Into<String>,
        build_url: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            build: Build {
                number: number.into(),
                phase: phase.into(),
                url: build_url.into(),
            },
            name: name.into(),
            url: url.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_decodes_jenkins_payload() {
        let body = r#"{
            "name": "myproject",
            "url": "http://ci/job/",
            "build": {
                "full_url": "http://ci/job/42/",
                "number": 42,
                "phase": "STARTED",
                "url": "http://ci/job/42"
            }
        }"#;

        let parsed: Notification = serde_json::from_str(body).unwrap();

        assert_eq!(
            parsed,
            Notification::new(42u64, "STARTED", "http://ci/job/42", "myproject", "http://ci/job/")
        );
    }

    #[test]
    fn test_notification_encoding_drops_unknown_fields() {
        let body = json!({
            "name": "myproject",
            "url": "http://ci/job/",
            "extra": true,
            "build": { "number": 7, "phase": "COMPLETED", "url": "u", "status": "SUCCESS" }
        });

        let parsed: Notification = serde_json::from_value(body).unwrap();
        let encoded = serde_json::to_value(&parsed).unwrap();

        assert_eq!(
            encoded,
            json!({
                "build": { "number": 7, "phase": "COMPLETED", "url": "u" },
                "name": "myproject",
                "url": "http://ci/job/"
            })
        );
    }

    #[test]
    fn test_notification_number_keeps_representation() {
        let parsed: Notification = serde_json::from_str(
            r#"{"build":{"number":12.5,"phase":"P","url":"u"},"name":"n","url":"u"}"#,
        )
        .unwrap();
        let encoded = serde_json::to_string(&parsed).unwrap();
        assert!(encoded.contains("\"number\":12.5"));

        let parsed: Notification = serde_json::from_str(
            r#"{"build":{"number":42,"phase":"P","url":"u"},"name":"n","url":"u"}"#,
        )
        .unwrap();
        let encoded = serde_json::to_string(&parsed).unwrap();
        assert!(encoded.contains("\"number\":42,"));
    }

    #[test]
    fn test_notification_rejects_missing_build() {
        let result: Result<Notification, _> =
            serde_json::from_str(r#"{"name":"myproject","url":"http://ci/job/"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_notification_rejects_wrong_number_type() {
        let result: Result<Notification, _> = serde_json::from_str(
            r#"{"build":{"number":"42","phase":"P","url":"u"},"name":"n","url":"u"}"#,
        );
        assert!(result.is_err());
    }
}
