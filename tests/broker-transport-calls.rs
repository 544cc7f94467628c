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
mod stub_transport;

use std::sync::Arc;

use mqtt_hub_tokio::mqtt_hub::{AcceptAll, Broker};

use common::{connect_frame, ConnectOptions};
use stub_transport::{StubTransport, TransportCall, TransportResponse};

#[tokio::test]
async fn wrong_protocol_name_shuts_down_without_sending() {
    common::init_tracing();
    let broker = Broker::new(Arc::new(AcceptAll));

    let mut stub = StubTransport::new();
    let connect = connect_frame(&ConnectOptions {
        protocol: "MQTT",
        ..Default::default()
    });
    stub.add_response(TransportResponse::RecvOk(connect));
    stub.add_response(TransportResponse::RecvPending);

    broker.serve(stub.clone()).await;

    let calls = stub.get_calls();
    assert!(
        calls
            .iter()
            .any(|call| matches!(call, TransportCall::Shutdown { .. })),
        "transport should have been shut down: {calls:?}"
    );
    assert!(
        !calls
            .iter()
            .any(|call| matches!(call, TransportCall::Send { .. })),
        "no CONNACK is sent for an unknown protocol: {calls:?}"
    );
}

#[tokio::test]
async fn reserved_type_byte_fails_the_connection() {
    common::init_tracing();
    let broker = Broker::new(Arc::new(AcceptAll));

    let mut stub = StubTransport::new();
    stub.add_response(TransportResponse::RecvOk(vec![0xF0, 0x00]));
    stub.add_response(TransportResponse::RecvPending);

    broker.serve(stub.clone()).await;

    let calls = stub.get_calls();
    assert!(calls
        .iter()
        .any(|call| matches!(call, TransportCall::Shutdown { .. })));
}

#[tokio::test]
async fn oversized_frame_fails_the_connection() {
    common::init_tracing();
    let broker = Broker::new(Arc::new(AcceptAll));

    let mut stub = StubTransport::new();
    // remaining length 15361: one over the server maximum
    stub.add_response(TransportResponse::RecvOk(vec![0x30, 0x81, 0x78]));
    stub.add_response(TransportResponse::RecvPending);

    broker.serve(stub.clone()).await;

    let calls = stub.get_calls();
    assert!(calls
        .iter()
        .any(|call| matches!(call, TransportCall::Shutdown { .. })));
    assert!(!calls
        .iter()
        .any(|call| matches!(call, TransportCall::Send { .. })));
}
