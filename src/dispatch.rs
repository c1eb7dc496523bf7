use crate::ditto::{Envelope, TRIGGER_UPLOAD_PATH};
use crate::models::{DeviceIdentity, TriggerPayload};
use crate::upload::Uploader;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Standing handler for inbound `triggerUpload` messages.
///
/// Drains the session's envelope channel for the life of the process. Only
/// envelopes addressed to the resolved device identity on the fixed trigger
/// path are acted on; everything else is dropped without side effects.
pub struct TriggerDispatcher {
    identity: DeviceIdentity,
    uploader: Arc<dyn Uploader>,
    shutdown: CancellationToken,
}

impl TriggerDispatcher {
    pub fn new(
        identity: DeviceIdentity,
        uploader: Arc<dyn Uploader>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            identity,
            uploader,
            shutdown,
        }
    }

    pub async fn run(self, mut inbound: mpsc::Receiver<Envelope>) {
        while let Some(envelope) = inbound.recv().await {
            self.handle(&envelope).await;
        }
        tracing::debug!("inbound envelope channel closed, dispatcher stopping");
    }

    async fn handle(&self, envelope: &Envelope) {
        let Some(trigger) = match_trigger(&self.identity, envelope) else {
            return;
        };

        tracing::info!(blob_id = %trigger.blob_id, "trigger upload message received");

        if self.uploader.upload(&trigger.blob_id, &trigger.upload_url).await {
            // Upload success is one of the two shutdown origins; the token
            // absorbs a racing interrupt without blocking either side.
            self.shutdown.cancel();
        }
    }
}

/// Filter an inbound envelope down to a trigger payload.
///
/// A mismatched identity or path, or a value that does not decode, yields
/// `None`. There is no request-token check: a trigger arriving before the
/// request was even sent still matches. Correlation is by reply-to routing
/// only, a known gap inherited from the protocol choreography.
pub fn match_trigger(identity: &DeviceIdentity, envelope: &Envelope) -> Option<TriggerPayload> {
    if envelope.target_identity().as_deref() != Some(identity.device_id.as_str()) {
        return None;
    }
    if envelope.path != TRIGGER_UPLOAD_PATH {
        return None;
    }
    serde_json::from_value(envelope.value.clone()).ok()
}
