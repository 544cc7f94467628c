// MIT License
//
// Copyright (c) 2025 Takatoshi Kondo
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

#![allow(dead_code)]

use std::future::Future;
use std::io::IoSlice;
use std::pin::Pin;
use std::sync::Once;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::timeout;

use mqtt_hub_tokio::mqtt_hub::packet::{encode_fixed_header, write_string};
use mqtt_hub_tokio::mqtt_hub::transport::{TransportError, TransportOps};
use mqtt_hub_tokio::mqtt_hub::Broker;

static INIT: Once = Once::new();

/// Automatic tracing initialization for all tests.
///
/// Environment variables:
/// - `RUST_LOG`: Standard Rust logging (takes precedence if set)
/// - `MQTT_HUB_LOG_LEVEL`: Set log level (trace, debug, info, warn, error).
///   Default: warn
fn auto_init_tracing() {
    INIT.call_once(|| {
        let filter = if let Ok(rust_log) = std::env::var("RUST_LOG") {
            tracing_subscriber::EnvFilter::new(rust_log)
        } else {
            let level = std::env::var("MQTT_HUB_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
            tracing_subscriber::EnvFilter::new(format!("mqtt_hub_tokio={level}"))
        };

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_test_writer()
            .init();
    });
}

pub fn init_tracing() {
    auto_init_tracing();
}

/// In-memory byte-stream transport backed by `tokio::io::duplex`. The test
/// keeps the other half and speaks raw MQTT bytes on it.
pub struct DuplexTransport {
    stream: DuplexStream,
}

impl DuplexTransport {
    pub fn new(stream: DuplexStream) -> Self {
        Self { stream }
    }
}

impl TransportOps for DuplexTransport {
    fn send<'a>(
        &'a mut self,
        buffers: &'a [IoSlice<'a>],
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
        Box::pin(async move {
            for buf in buffers {
                self.stream.write_all(buf).await.map_err(TransportError::Io)?;
            }
            self.stream.flush().await.map_err(TransportError::Io)
        })
    }

    fn recv<'a>(
        &'a mut self,
        buffer: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, TransportError>> + Send + 'a>> {
        Box::pin(async move { self.stream.read(buffer).await.map_err(TransportError::Io) })
    }

    fn shutdown<'a>(
        &'a mut self,
        timeout_duration: Duration,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let _ = timeout(timeout_duration, self.stream.shutdown()).await;
        })
    }
}

/// Spawn a served connection on `broker` and return the client half of the
/// stream.
pub fn spawn_client(broker: &Broker) -> DuplexStream {
    let (server_side, client_side) = tokio::io::duplex(64 * 1024);
    let broker = broker.clone();
    tokio::spawn(async move {
        broker.serve(DuplexTransport::new(server_side)).await;
    });
    client_side
}

// Frame builders ////////////////////////////////////////////////////////////

pub const PINGREQ_FRAME: [u8; 2] = [0xC0, 0x00];
pub const DISCONNECT_FRAME: [u8; 2] = [0xE0, 0x00];

pub fn frame(byte0: u8, body: &[u8]) -> Vec<u8> {
    let mut out = encode_fixed_header(byte0, body.len());
    out.extend_from_slice(body);
    out
}

pub struct ConnectOptions<'a> {
    pub protocol: &'a str,
    pub version: u8,
    pub client_id: &'a str,
    pub keep_alive: u16,
    /// (topic, payload, qos, retain)
    pub will: Option<(&'a str, &'a [u8], u8, bool)>,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
}

impl Default for ConnectOptions<'_> {
    fn default() -> Self {
        Self {
            protocol: "MQIsdp",
            version: 3,
            client_id: "client",
            keep_alive: 0,
            will: None,
            username: None,
            password: None,
        }
    }
}

pub fn connect_frame(options: &ConnectOptions) -> Vec<u8> {
    let mut body = Vec::new();
    write_string(&mut body, options.protocol);
    body.push(options.version);

    let mut flags = 0u8;
    if let Some((_, _, qos, retain)) = options.will {
        flags |= 0x04 | (qos << 3);
        if retain {
            flags |= 0x20;
        }
    }
    if options.username.is_some() {
        flags |= 0x80;
    }
    if options.password.is_some() {
        flags |= 0x40;
    }
    body.push(flags);
    body.extend_from_slice(&options.keep_alive.to_be_bytes());
    write_string(&mut body, options.client_id);

    if let Some((topic, payload, _, _)) = options.will {
        write_string(&mut body, topic);
        body.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        body.extend_from_slice(payload);
    }
    if let Some(username) = options.username {
        write_string(&mut body, username);
    }
    if let Some(password) = options.password {
        write_string(&mut body, password);
    }

    frame(0x10, &body)
}

pub fn subscribe_frame(packet_id: u16, entries: &[(&str, u8)]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&packet_id.to_be_bytes());
    for (filter, qos) in entries {
        write_string(&mut body, filter);
        body.push(*qos);
    }
    frame(0x82, &body)
}

pub fn unsubscribe_frame(packet_id: u16, filters: &[&str]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&packet_id.to_be_bytes());
    for filter in filters {
        write_string(&mut body, filter);
    }
    frame(0xA2, &body)
}

pub fn publish_frame(
    topic: &str,
    payload: &[u8],
    qos: u8,
    retain: bool,
    packet_id: Option<u16>,
) -> Vec<u8> {
    let mut body = Vec::new();
    write_string(&mut body, topic);
    if let Some(id) = packet_id {
        body.extend_from_slice(&id.to_be_bytes());
    }
    let byte0 = 0x30 | (qos << 1) | u8::from(retain);
    frame(byte0, &body_with_payload(body, payload))
}

fn body_with_payload(mut body: Vec<u8>, payload: &[u8]) -> Vec<u8> {
    body.extend_from_slice(payload);
    body
}

pub fn puback_frame(packet_id: u16) -> Vec<u8> {
    frame(0x40, &packet_id.to_be_bytes())
}

pub fn pubrec_frame(packet_id: u16) -> Vec<u8> {
    frame(0x50, &packet_id.to_be_bytes())
}

pub fn pubrel_frame(packet_id: u16) -> Vec<u8> {
    frame(0x62, &packet_id.to_be_bytes())
}

pub fn pubcomp_frame(packet_id: u16) -> Vec<u8> {
    frame(0x70, &packet_id.to_be_bytes())
}

// Client-side I/O helpers ///////////////////////////////////////////////////

pub async fn send(stream: &mut DuplexStream, bytes: &[u8]) {
    stream.write_all(bytes).await.expect("write to broker");
}

/// Read one MQTT frame; `None` once the broker closed the stream.
pub async fn read_frame(stream: &mut DuplexStream) -> Option<(u8, Vec<u8>)> {
    let mut byte0 = [0u8; 1];
    stream.read_exact(&mut byte0).await.ok()?;

    let mut remaining = 0usize;
    let mut multiplier = 1usize;
    loop {
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).await.ok()?;
        remaining += (byte[0] & 0x7F) as usize * multiplier;
        if byte[0] & 0x80 == 0 {
            break;
        }
        multiplier *= 128;
    }

    let mut body = vec![0u8; remaining];
    stream.read_exact(&mut body).await.ok()?;
    Some((byte0[0], body))
}

/// Read one frame, failing the test after five seconds or on close.
pub async fn recv_frame(stream: &mut DuplexStream) -> (u8, Vec<u8>) {
    timeout(Duration::from_secs(5), read_frame(stream))
        .await
        .expect("timed out waiting for a frame")
        .expect("broker closed the connection")
}

pub async fn expect_connack(stream: &mut DuplexStream) -> u8 {
    let (byte0, body) = recv_frame(stream).await;
    assert_eq!(byte0, 0x20, "expected CONNACK");
    assert_eq!(body.len(), 2, "CONNACK body length");
    body[1]
}

/// Full CONNECT round trip expecting acceptance.
pub async fn connect_ok(stream: &mut DuplexStream, client_id: &str) {
    let connect = connect_frame(&ConnectOptions {
        client_id,
        ..Default::default()
    });
    send(stream, &connect).await;
    assert_eq!(expect_connack(stream).await, 0, "CONNACK return code");
}

/// SUBSCRIBE round trip; returns the granted QoS list from the SUBACK.
pub async fn subscribe_ok(
    stream: &mut DuplexStream,
    packet_id: u16,
    entries: &[(&str, u8)],
) -> Vec<u8> {
    send(stream, &subscribe_frame(packet_id, entries)).await;
    let (byte0, body) = recv_frame(stream).await;
    assert_eq!(byte0, 0x90, "expected SUBACK");
    assert_eq!(
        u16::from_be_bytes([body[0], body[1]]),
        packet_id,
        "SUBACK packet id"
    );
    body[2..].to_vec()
}

#[derive(Debug)]
pub struct ReceivedPublish {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
    pub packet_id: Option<u16>,
}

pub async fn expect_publish(stream: &mut DuplexStream) -> ReceivedPublish {
    let (byte0, body) = recv_frame(stream).await;
    assert_eq!(byte0 >> 4, 3, "expected PUBLISH");
    let qos = (byte0 >> 1) & 0x03;
    let retain = byte0 & 0x01 != 0;

    let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
    let topic = String::from_utf8(body[2..2 + topic_len].to_vec()).expect("topic utf8");
    let mut rest = &body[2 + topic_len..];

    let packet_id = if qos > 0 {
        let id = u16::from_be_bytes([rest[0], rest[1]]);
        rest = &rest[2..];
        Some(id)
    } else {
        None
    };

    ReceivedPublish {
        topic,
        payload: rest.to_vec(),
        qos,
        retain,
        packet_id,
    }
}

/// Assert the broker closed this stream.
pub async fn expect_closed(stream: &mut DuplexStream) {
    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("timed out waiting for close")
        .expect("read after close");
    assert_eq!(n, 0, "expected EOF, got data");
}

/// Assert nothing arrives on this stream for `wait`.
pub async fn assert_silent(stream: &mut DuplexStream, wait: Duration) {
    let mut buf = [0u8; 1];
    match timeout(wait, stream.read(&mut buf)).await {
        Err(_) => {}
        Ok(Ok(0)) => panic!("broker closed the connection"),
        Ok(Ok(_)) => panic!("unexpected frame from broker"),
        Ok(Err(e)) => panic!("read error: {e}"),
    }
}
