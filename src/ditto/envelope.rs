use serde::{Deserialize, Serialize};

/// Ditto protocol envelope as it appears on the wire.
///
/// Outbound envelopes are built by the constructors below; inbound envelopes
/// are decoded from raw broker payloads and treated as read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    #[serde(default)]
    pub headers: Headers,
    pub path: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Headers {
    #[serde(
        rename = "response-required",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub response_required: Option<bool>,
    #[serde(
        rename = "content-type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub content_type: Option<String>,
    #[serde(rename = "reply-to", default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl Envelope {
    /// Twin command creating or overwriting a feature slot with an empty state.
    /// No response is expected.
    pub fn feature_modify(device_id: &str, feature_id: &str) -> Self {
        let (namespace, name) = split_namespaced_id(device_id);
        Self {
            topic: format!("{}/{}/things/twin/commands/modify", namespace, name),
            headers: Headers {
                response_required: Some(false),
                ..Headers::default()
            },
            path: format!("/features/{}", feature_id),
            value: serde_json::json!({}),
        }
    }

    /// Live message emitted from the feature's outbox, with a reply-to
    /// address so the asynchronous answer can be routed back.
    pub fn outbox_message(
        device_id: &str,
        feature_id: &str,
        subject: &str,
        payload: serde_json::Value,
        reply_to: String,
    ) -> Self {
        let (namespace, name) = split_namespaced_id(device_id);
        Self {
            topic: format!("{}/{}/things/live/messages/{}", namespace, name, subject),
            headers: Headers {
                response_required: Some(true),
                content_type: Some("application/json".to_string()),
                reply_to: Some(reply_to),
            },
            path: format!("/features/{}/outbox/messages/{}", feature_id, subject),
            value: payload,
        }
    }

    /// Namespaced identity of the thing this envelope addresses, rebuilt
    /// from the first two topic segments.
    pub fn target_identity(&self) -> Option<String> {
        let mut segments = self.topic.splitn(3, '/');
        let namespace = segments.next()?;
        let name = segments.next()?;
        if namespace.is_empty() || name.is_empty() {
            return None;
        }
        Some(format!("{}:{}", namespace, name))
    }
}

fn split_namespaced_id(device_id: &str) -> (&str, &str) {
    match device_id.split_once(':') {
        Some((namespace, name)) => (namespace, name),
        None => ("", device_id),
    }
}
