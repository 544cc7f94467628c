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

mod common;

use std::sync::Arc;

use mqtt_hub_tokio::mqtt_hub::{AcceptAll, Broker, BrokerOption};

use common::{connect_ok, expect_publish, publish_frame, send, spawn_client, subscribe_ok};

#[test]
fn defaults() {
    let options = BrokerOption::default();
    assert_eq!(options.recv_buffer_size(), 4096);
    assert_eq!(options.keep_alive_grace_percent(), 150);
    assert_eq!(options.shutdown_timeout_ms(), 5000);
}

#[test]
fn builder_overrides_single_fields() {
    let options = BrokerOption::builder()
        .recv_buffer_size(16usize * 1024)
        .build()
        .unwrap();
    assert_eq!(options.recv_buffer_size(), 16 * 1024);
    assert_eq!(options.keep_alive_grace_percent(), 150);
}

/// A pathologically small read buffer forces every frame to arrive over
/// many reads; the incremental parser must reassemble them all.
#[tokio::test]
async fn tiny_recv_buffer_still_reassembles_frames() {
    common::init_tracing();
    let options = BrokerOption::builder()
        .recv_buffer_size(8usize)
        .build()
        .unwrap();
    let broker = Broker::with_options(Arc::new(AcceptAll), options);

    let mut subscriber = spawn_client(&broker);
    connect_ok(&mut subscriber, "c1").await;
    subscribe_ok(&mut subscriber, 1, &[("big/topic/name", 0)]).await;

    let mut publisher = spawn_client(&broker);
    connect_ok(&mut publisher, "c2").await;
    let payload = vec![0x5A; 600];
    send(
        &mut publisher,
        &publish_frame("big/topic/name", &payload, 0, false, None),
    )
    .await;

    let received = expect_publish(&mut subscriber).await;
    assert_eq!(received.topic, "big/topic/name");
    assert_eq!(received.payload, payload);
}
