use serde::{Deserialize, Serialize};

/// Device and tenant identifiers resolved from the edge agent.
///
/// Resolved exactly once at startup and treated as immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceIdentity {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
}

/// Payload of the outbound `requestUpload` message.
#[derive(Debug, Clone, Serialize)]
pub struct UploadRequest {
    #[serde(rename = "blobId")]
    pub blob_id: String,
    #[serde(rename = "blobType")]
    pub blob_type: String,
}

impl UploadRequest {
    pub fn new(blob_id: String) -> Self {
        Self {
            blob_id,
            blob_type: "demo".to_string(),
        }
    }
}

/// Payload of the inbound `triggerUpload` message.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerPayload {
    #[serde(rename = "blobId")]
    pub blob_id: String,
    #[serde(rename = "uploadURL")]
    pub upload_url: String,
}
