//! Minimal in-process MQTT broker for exercising the real client code paths
//! in tests. Speaks just enough MQTT 3.1.1 to acknowledge a single
//! connection and records every packet type it reads off the wire.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const CONNECT: u8 = 1;
pub const PUBLISH: u8 = 3;
pub const SUBSCRIBE: u8 = 8;
pub const UNSUBSCRIBE: u8 = 10;
pub const DISCONNECT: u8 = 14;

pub struct FakeBroker {
    pub port: u16,
    seen: Arc<Mutex<Vec<u8>>>,
}

impl FakeBroker {
    /// Start a broker serving one connection. When `response` is set, its
    /// (topic, payload) is published back to the client as soon as the
    /// client publishes anything.
    pub async fn start(response: Option<(String, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);

        tokio::spawn(async move {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            loop {
                let (packet_type, body) = match read_packet(&mut stream).await {
                    Some(packet) => packet,
                    None => break,
                };
                recorded.lock().unwrap().push(packet_type);
                match packet_type {
                    CONNECT => {
                        let _ = stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await;
                    }
                    SUBSCRIBE => {
                        let _ = stream.write_all(&[0x90, 0x03, body[0], body[1], 0x01]).await;
                    }
                    PUBLISH => {
                        // QoS 1 layout: topic length, topic, packet id, payload
                        let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
                        let pid = [body[2 + topic_len], body[3 + topic_len]];
                        let _ = stream.write_all(&[0x40, 0x02, pid[0], pid[1]]).await;
                        if let Some((topic, payload)) = &response {
                            let _ = stream.write_all(&publish_packet(topic, payload)).await;
                        }
                    }
                    UNSUBSCRIBE => {
                        let _ = stream.write_all(&[0xB0, 0x02, body[0], body[1]]).await;
                    }
                    12 => {
                        let _ = stream.write_all(&[0xD0, 0x00]).await; // PINGRESP
                    }
                    DISCONNECT => break,
                    _ => {}
                }
            }
        });

        Self { port, seen }
    }

    pub fn address(&self) -> String {
        format!("tcp://127.0.0.1:{}", self.port)
    }

    pub fn seen_packet_types(&self) -> Vec<u8> {
        self.seen.lock().unwrap().clone()
    }

    /// Wait until the broker has read a packet of the given type, or panic.
    /// The client may still be flushing when the call under test returns.
    pub async fn expect_packet(&self, packet_type: u8) {
        for _ in 0..100 {
            if self.seen_packet_types().contains(&packet_type) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "packet type {} never reached the broker; saw {:?}",
            packet_type,
            self.seen_packet_types()
        );
    }
}

/// Read one MQTT control packet: (packet type, body after the fixed header).
async fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let mut first = [0u8; 1];
    stream.read_exact(&mut first).await.ok()?;

    let mut remaining = 0usize;
    let mut shift = 0;
    loop {
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).await.ok()?;
        remaining |= ((byte[0] & 0x7F) as usize) << shift;
        if byte[0] & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    let mut body = vec![0u8; remaining];
    stream.read_exact(&mut body).await.ok()?;
    Some((first[0] >> 4, body))
}

/// QoS 0 PUBLISH from broker to client.
fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    body.extend_from_slice(topic.as_bytes());
    body.extend_from_slice(payload);

    let mut packet = vec![0x30];
    let mut remaining = body.len();
    loop {
        let mut byte = (remaining % 128) as u8;
        remaining /= 128;
        if remaining > 0 {
            byte |= 0x80;
        }
        packet.push(byte);
        if remaining == 0 {
            break;
        }
    }
    packet.extend_from_slice(&body);
    packet
}
