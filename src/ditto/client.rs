use crate::config::{parse_broker_url, Config};
use crate::ditto::envelope::Envelope;
use crate::ditto::BLOB_UPLOAD_FEATURE;
use crate::error::{BlobUploadError, Result};
use crate::models::{DeviceIdentity, UploadRequest};
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Device-to-cloud event channel on the local broker.
const EVENT_TOPIC: &str = "e";

/// Cloud-to-device command channel on the local broker.
const COMMAND_REQUEST_FILTER: &str = "command///req/#";

/// Messaging session with the edge broker, speaking Ditto protocol envelopes.
///
/// Inbound envelopes are decoded on the event loop task and handed to a
/// bounded channel; a single consumer drains it, so handler invocations for
/// one session never overlap.
pub struct DittoClient {
    client: AsyncClient,
    pump: JoinHandle<()>,
}

impl DittoClient {
    /// Connect to the broker, subscribe to the inbound command channel and
    /// start pumping the event loop. Returns once the broker has
    /// acknowledged the connection.
    pub async fn connect(config: &Config) -> Result<(Self, mpsc::Receiver<Envelope>)> {
        let (host, port) = parse_broker_url(&config.broker)?;

        let client_id = format!("blob-upload-agent-{}", std::process::id());
        let mut mqtt_options = MqttOptions::new(client_id, host, port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));
        mqtt_options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

        // Nothing may be sent on the session until the broker accepts it.
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(BlobUploadError::ConnectionError(format!(
                        "failed to connect to broker: {}",
                        e
                    )));
                }
            }
        }

        tracing::info!(broker = %config.broker, "connected to edge broker");

        client
            .subscribe(COMMAND_REQUEST_FILTER, QoS::AtLeastOnce)
            .await
            .map_err(|e| {
                BlobUploadError::ConnectionError(format!("failed to subscribe: {}", e))
            })?;

        let (envelope_tx, envelope_rx) = mpsc::channel(100);

        let pump = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match serde_json::from_slice::<Envelope>(&publish.payload) {
                            Ok(envelope) => {
                                if envelope_tx.send(envelope).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::debug!(
                                    topic = %publish.topic,
                                    error = %e,
                                    "ignoring undecodable inbound message"
                                );
                            }
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        // `close` queued the disconnect; it is on the wire
                        // now, so the session is done.
                        tracing::debug!("disconnect flushed, stopping event loop");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // No reconnect; the agent only exits via upload
                        // success or an interrupt.
                        tracing::error!(error = %e, "messaging session lost");
                        break;
                    }
                }
            }
        });

        Ok((Self { client, pump }, envelope_rx))
    }

    /// Declare the `BLOBUpload` feature on the device's twin. Idempotent on
    /// the cloud side; a send failure here is fatal for the agent.
    pub async fn announce_feature(&self, identity: &DeviceIdentity) -> Result<()> {
        let envelope = Envelope::feature_modify(&identity.device_id, BLOB_UPLOAD_FEATURE);
        self.send(&envelope).await?;

        tracing::info!(feature = %BLOB_UPLOAD_FEATURE, "feature announced on digital twin");
        Ok(())
    }

    /// Send the `requestUpload` message for the given blob. The reply-to
    /// address routes the asynchronous trigger back through the tenant's
    /// command channel; correlation is by identity and path, not by a
    /// request token.
    pub async fn request_upload(&self, identity: &DeviceIdentity, blob_id: String) -> Result<()> {
        let request = UploadRequest::new(blob_id);
        let payload = serde_json::to_value(&request)
            .map_err(|e| BlobUploadError::ProtocolError(format!("failed to encode request: {}", e)))?;

        let envelope = Envelope::outbox_message(
            &identity.device_id,
            BLOB_UPLOAD_FEATURE,
            "requestUpload",
            payload,
            format!("command/{}", identity.tenant_id),
        );
        self.send(&envelope).await?;

        tracing::info!(
            blob_id = %request.blob_id,
            blob_type = %request.blob_type,
            "request upload message sent"
        );
        Ok(())
    }

    async fn send(&self, envelope: &Envelope) -> Result<()> {
        let payload = serde_json::to_vec(envelope)
            .map_err(|e| BlobUploadError::ProtocolError(format!("failed to encode envelope: {}", e)))?;

        self.client
            .publish(EVENT_TOPIC, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| BlobUploadError::ProtocolError(format!("failed to publish: {}", e)))
    }

    /// Unsubscribe and tear the session down. The pump keeps polling until
    /// the queued UNSUBSCRIBE and DISCONNECT have been written to the
    /// socket, so the broker sees a clean teardown rather than a dropped
    /// connection.
    pub async fn close(self) {
        let _ = self.client.unsubscribe(COMMAND_REQUEST_FILTER).await;
        let _ = self.client.disconnect().await;
        if tokio::time::timeout(Duration::from_secs(5), self.pump)
            .await
            .is_err()
        {
            tracing::warn!("messaging session teardown did not complete in time");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeBroker};
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_close_flushes_unsubscribe_and_disconnect() {
        let broker = FakeBroker::start(None).await;
        let config = Config {
            broker: broker.address(),
            file_path: PathBuf::from("/tmp/unused"),
            identity_timeout: Duration::from_secs(5),
        };

        let (client, _inbound) = DittoClient::connect(&config).await.unwrap();
        client.close().await;

        broker.expect_packet(testing::UNSUBSCRIBE).await;
        broker.expect_packet(testing::DISCONNECT).await;
    }
}
