mod client;
mod envelope;

pub use client::DittoClient;
pub use envelope::{Envelope, Headers};

/// Feature slot announced on the device's digital twin.
pub const BLOB_UPLOAD_FEATURE: &str = "BLOBUpload";

/// Inbox path of the trigger message the cloud sends back.
pub const TRIGGER_UPLOAD_PATH: &str = "/features/BLOBUpload/inbox/messages/triggerUpload";
