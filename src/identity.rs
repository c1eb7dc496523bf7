use crate::config::{parse_broker_url, Config};
use crate::error::{BlobUploadError, Result};
use crate::models::DeviceIdentity;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;

const REQUEST_TOPIC: &str = "edge/thing/request";
const RESPONSE_TOPIC: &str = "edge/thing/response";

/// Resolve the device and tenant identifiers from the edge agent.
///
/// Opens a dedicated MQTT connection (separate from the messaging session
/// used afterwards), subscribes to the response topic, publishes an empty
/// request and waits for a single decodable response. The connection is
/// unsubscribed and torn down before returning, on success and failure alike.
pub async fn resolve(config: &Config) -> Result<DeviceIdentity> {
    let (host, port) = parse_broker_url(&config.broker)?;

    let client_id = format!("blob-upload-identity-{}", std::process::id());
    let mut mqtt_options = MqttOptions::new(client_id, host, port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);

    // Subscribe before publishing so the response cannot slip past us.
    client
        .subscribe(RESPONSE_TOPIC, QoS::AtLeastOnce)
        .await
        .map_err(|e| BlobUploadError::ConnectionError(format!("failed to subscribe: {}", e)))?;
    client
        .publish(REQUEST_TOPIC, QoS::AtLeastOnce, false, "")
        .await
        .map_err(|e| {
            BlobUploadError::ConnectionError(format!("failed to publish identity request: {}", e))
        })?;

    tracing::info!(topic = %REQUEST_TOPIC, "requesting device identity from edge agent");

    let outcome = tokio::time::timeout(config.identity_timeout, await_response(&mut eventloop)).await;

    // unsubscribe/disconnect only enqueue packets; the event loop must keep
    // running until the DISCONNECT is actually written to the socket.
    let _ = client.unsubscribe(RESPONSE_TOPIC).await;
    let _ = client.disconnect().await;
    flush_teardown(&mut eventloop).await;

    match outcome {
        Ok(result) => result,
        Err(_) => Err(BlobUploadError::IdentityTimeout(
            config.identity_timeout.as_secs(),
        )),
    }
}

/// Drive the event loop until the queued UNSUBSCRIBE and DISCONNECT have
/// left for the broker. A dead connection surfaces as a poll error, which
/// ends the flush just as well.
async fn flush_teardown(eventloop: &mut EventLoop) {
    let flush = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };

    if tokio::time::timeout(Duration::from_secs(5), flush).await.is_err() {
        tracing::warn!("identity connection teardown did not complete in time");
    }
}

/// Drive the event loop until one identity response decodes.
async fn await_response(eventloop: &mut EventLoop) -> Result<DeviceIdentity> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if publish.topic != RESPONSE_TOPIC {
                    continue;
                }
                match serde_json::from_slice::<DeviceIdentity>(&publish.payload) {
                    Ok(identity) => {
                        tracing::info!(
                            device_id = %identity.device_id,
                            tenant_id = %identity.tenant_id,
                            "device identity resolved"
                        );
                        return Ok(identity);
                    }
                    Err(e) => {
                        // Keep waiting; a later response may still be valid.
                        tracing::warn!(error = %e, "ignoring undecodable identity response");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                return Err(BlobUploadError::ConnectionError(format!(
                    "identity connection lost: {}",
                    e
                )));
            }
        }
    }
}
