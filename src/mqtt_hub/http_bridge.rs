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

//! HTTP-to-MQTT publish bridge.
//!
//! Any PUT or POST against any path republishes the request body as a QoS 0
//! MQTT message on the topic derived from the path: `PUT /sensors/temp`
//! publishes on `sensors/temp`. Messages enter the broker with no
//! originating connection, so the host handler's publish hook sees `None`.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::Router;
use tracing::debug;

use crate::mqtt_hub::broker::Broker;
use crate::mqtt_hub::message::{Message, QoS};

/// Build the bridge router. Every path is handled; there are no other
/// routes.
pub fn router(broker: Broker) -> Router {
    Router::new().fallback(publish_request).with_state(broker)
}

/// Serve the bridge on an already bound listener until the task is dropped.
pub async fn serve(listener: tokio::net::TcpListener, broker: Broker) -> std::io::Result<()> {
    axum::serve(listener, router(broker)).await
}

async fn publish_request(
    State(broker): State<Broker>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> StatusCode {
    if method != Method::PUT && method != Method::POST {
        return StatusCode::METHOD_NOT_ALLOWED;
    }

    let topic = uri.path().trim_start_matches('/');
    if topic.is_empty() {
        return StatusCode::BAD_REQUEST;
    }

    debug!(topic, len = body.len(), "bridging HTTP request body");
    broker.publish(None, Message::new(topic, body, QoS::AtMostOnce, false));
    StatusCode::OK
}
