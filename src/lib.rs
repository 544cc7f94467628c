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

//! # MQTT Hub Tokio
//!
//! An MQTT v3.1 broker for Rust with tokio, accepting clients over TCP,
//! TLS, and WebSocket, with an HTTP bridge that republishes PUT/POST bodies
//! as MQTT messages.
//!
//! ## Features
//!
//! - **MQTT v3.1**: CONNECT handshake (`MQIsdp`, version 3), QoS 0/1/2
//!   acknowledgement dialogues, keep-alive enforcement, will delivery on
//!   abnormal disconnect
//! - **Multiple Transports**: TCP, TLS, and WebSocket (subprotocol
//!   `mqttv3.1`)
//! - **Wildcard Routing**: hierarchical topic tree with `+` and `#` filters
//! - **Lock-free Routing Core**: a single routing task owns the topic tree;
//!   connection workers and host threads enqueue work over channels
//! - **Pluggable Policy**: connect/publish/subscribe vetoes through a
//!   host-supplied [`mqtt_hub::Handler`]
//! - **HTTP Bridge**: any PUT/POST republishes its body on the topic named
//!   by the request path
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use mqtt_hub_tokio::mqtt_hub::{AcceptAll, Broker};
//! use mqtt_hub_tokio::mqtt_hub::transport::accept_helper;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let broker = Broker::new(Arc::new(AcceptAll));
//!
//!     let listener = TcpListener::bind("0.0.0.0:1883").await?;
//!     tokio::spawn(accept_helper::accept_tcp_loop(listener, broker.clone()));
//!
//!     broker.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`mqtt_hub::Broker`]: broker handle and single-owner routing loop
//! - [`mqtt_hub::Handler`]: host policy hooks (connect/publish/subscribe)
//! - [`mqtt_hub::transport`]: transport implementations and accept loops
//! - [`mqtt_hub::http_bridge`]: the HTTP publish bridge
//! - [`mqtt_hub::packet`]: the MQTT v3.1 frame codec

pub mod mqtt_hub;
