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

//! Accept-side helpers for the broker's listeners.
//!
//! One function per transport runs a bound listener's accept loop, spawning
//! `broker.serve(...)` for every connection; [`load_tls_acceptor`] builds
//! the rustls acceptor the TLS and WSS loops share. The loops run until the
//! caller drops or aborts them - broker shutdown does not stop accepting by
//! itself.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::{Certificate, PrivateKey, ServerConfig};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tracing::{error, trace};

use crate::mqtt_hub::broker::Broker;
use crate::mqtt_hub::transport::{TcpTransport, TlsTransport, TransportError, WebSocketTransport};

/// Subprotocol MQTT v3.1 clients must request on the WebSocket handshake.
pub const WS_SUBPROTOCOL: &str = "mqttv3.1";

/// Build a TLS acceptor from PEM certificate and key files.
///
/// The key file may hold a PKCS#8 or an RSA (PKCS#1) private key; PKCS#8 is
/// tried first.
pub fn load_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TransportError> {
    let cert_file = File::open(cert_path)?;
    let mut cert_reader = BufReader::new(cert_file);
    let cert_chain: Vec<Certificate> = rustls_pemfile::certs(&mut cert_reader)?
        .into_iter()
        .map(Certificate)
        .collect();

    let key_file = File::open(key_path)?;
    let mut key_reader = BufReader::new(key_file);
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut key_reader)?;
    if keys.is_empty() {
        key_reader = BufReader::new(File::open(key_path)?);
        keys = rustls_pemfile::rsa_private_keys(&mut key_reader)?;
    }
    let private_key = keys
        .into_iter()
        .next()
        .map(PrivateKey)
        .ok_or_else(|| TransportError::Tls("no private key found in key file".into()))?;

    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)
        .map_err(|e| TransportError::Tls(Box::new(e)))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Accept plain TCP connections and serve each on its own task.
pub async fn accept_tcp_loop(listener: TcpListener, broker: Broker) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                trace!(%addr, "new TCP connection");
                let broker = broker.clone();
                tokio::spawn(async move {
                    broker.serve(TcpTransport::from_stream(stream)).await;
                });
            }
            Err(e) => error!("failed to accept TCP connection: {e}"),
        }
    }
}

/// Accept TLS connections, run the handshake, and serve each on its own
/// task.
pub async fn accept_tls_loop(listener: TcpListener, acceptor: TlsAcceptor, broker: Broker) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                trace!(%addr, "new TLS connection");
                let broker = broker.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            broker.serve(TlsTransport::from_stream(tls_stream)).await;
                        }
                        Err(e) => error!(%addr, "TLS handshake failed: {e}"),
                    }
                });
            }
            Err(e) => error!("failed to accept TLS connection: {e}"),
        }
    }
}

/// Accept MQTT-over-WebSocket connections and serve each on its own task.
pub async fn accept_ws_loop(listener: TcpListener, broker: Broker) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                trace!(%addr, "new WebSocket connection");
                let broker = broker.clone();
                tokio::spawn(async move {
                    match tokio_tungstenite::accept_hdr_async(stream, subprotocol_callback).await {
                        Ok(ws_stream) => {
                            broker
                                .serve(WebSocketTransport::from_plain_stream(ws_stream))
                                .await;
                        }
                        Err(e) => error!(%addr, "WebSocket handshake failed: {e}"),
                    }
                });
            }
            Err(e) => error!("failed to accept WebSocket connection: {e}"),
        }
    }
}

/// Accept MQTT-over-WebSocket connections on TLS and serve each on its own
/// task.
pub async fn accept_wss_loop(listener: TcpListener, acceptor: TlsAcceptor, broker: Broker) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                trace!(%addr, "new WebSocket+TLS connection");
                let broker = broker.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let tls_stream = match acceptor.accept(stream).await {
                        Ok(tls_stream) => tls_stream,
                        Err(e) => {
                            error!(%addr, "TLS handshake failed: {e}");
                            return;
                        }
                    };
                    match tokio_tungstenite::accept_hdr_async(tls_stream, subprotocol_callback)
                        .await
                    {
                        Ok(ws_stream) => {
                            broker
                                .serve(WebSocketTransport::from_tls_stream(ws_stream))
                                .await;
                        }
                        Err(e) => error!(%addr, "WebSocket+TLS handshake failed: {e}"),
                    }
                });
            }
            Err(e) => error!("failed to accept WebSocket+TLS connection: {e}"),
        }
    }
}

/// Require the `mqttv3.1` subprotocol on the upgrade request and echo it in
/// the response; anything else is refused with a 400.
fn subprotocol_callback(
    request: &Request,
    mut response: Response,
) -> Result<Response, ErrorResponse> {
    let offered = request
        .headers()
        .get("Sec-WebSocket-Protocol")
        .and_then(|value| value.to_str().ok());

    if offered == Some(WS_SUBPROTOCOL) {
        response.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(WS_SUBPROTOCOL),
        );
        Ok(response)
    } else {
        let mut refusal = ErrorResponse::new(Some(format!(
            "Requires WebSocket Protocol Header '{WS_SUBPROTOCOL}'."
        )));
        *refusal.status_mut() = StatusCode::BAD_REQUEST;
        Err(refusal)
    }
}
