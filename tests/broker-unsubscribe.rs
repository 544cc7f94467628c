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
use std::time::Duration;

use mqtt_hub_tokio::mqtt_hub::{AcceptAll, Broker};

use common::{
    assert_silent, connect_ok, expect_publish, publish_frame, recv_frame, send, spawn_client,
    subscribe_ok, unsubscribe_frame,
};

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    common::init_tracing();
    let broker = Broker::new(Arc::new(AcceptAll));

    let mut subscriber = spawn_client(&broker);
    connect_ok(&mut subscriber, "c1").await;
    subscribe_ok(&mut subscriber, 1, &[("a/b", 0)]).await;

    let mut publisher = spawn_client(&broker);
    connect_ok(&mut publisher, "c2").await;
    send(&mut publisher, &publish_frame("a/b", b"1", 0, false, None)).await;
    assert_eq!(expect_publish(&mut subscriber).await.payload, b"1");

    send(&mut subscriber, &unsubscribe_frame(2, &["a/b"])).await;
    let (byte0, body) = recv_frame(&mut subscriber).await;
    assert_eq!(byte0, 0xB0, "expected UNSUBACK");
    assert_eq!(u16::from_be_bytes([body[0], body[1]]), 2);

    send(&mut publisher, &publish_frame("a/b", b"2", 0, false, None)).await;
    assert_silent(&mut subscriber, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn unsubscribe_unknown_filter_still_acks() {
    common::init_tracing();
    let broker = Broker::new(Arc::new(AcceptAll));

    let mut client = spawn_client(&broker);
    connect_ok(&mut client, "c1").await;

    send(&mut client, &unsubscribe_frame(7, &["never/subscribed"])).await;
    let (byte0, body) = recv_frame(&mut client).await;
    assert_eq!(byte0, 0xB0);
    assert_eq!(u16::from_be_bytes([body[0], body[1]]), 7);
}

#[tokio::test]
async fn unsubscribe_is_per_filter() {
    common::init_tracing();
    let broker = Broker::new(Arc::new(AcceptAll));

    let mut subscriber = spawn_client(&broker);
    connect_ok(&mut subscriber, "c1").await;
    subscribe_ok(&mut subscriber, 1, &[("a", 0), ("b", 0)]).await;

    send(&mut subscriber, &unsubscribe_frame(2, &["a"])).await;
    assert_eq!(recv_frame(&mut subscriber).await.0, 0xB0);

    let mut publisher = spawn_client(&broker);
    connect_ok(&mut publisher, "c2").await;
    send(&mut publisher, &publish_frame("a", b"x", 0, false, None)).await;
    send(&mut publisher, &publish_frame("b", b"y", 0, false, None)).await;

    // only the remaining filter delivers
    let received = expect_publish(&mut subscriber).await;
    assert_eq!(received.topic, "b");
    assert_silent(&mut subscriber, Duration::from_millis(200)).await;
}
