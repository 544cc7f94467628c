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

use super::{TransportError, TransportOps};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::io::IoSlice;
use std::pin::Pin;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{
    tungstenite::{Error as WsError, Message},
    WebSocketStream,
};

/// WebSocket transport for accepted MQTT-over-WebSocket connections.
///
/// The WebSocket handshake (including the `mqttv3.1` subprotocol exchange)
/// happens before construction; see
/// [`accept_helper`](super::accept_helper). Each inbound binary frame is a
/// chunk of MQTT bytes - it may contain one or more whole MQTT frames, or
/// end partway through one, and the connection's incremental parser copes
/// with both. Each outbound `send` call carries exactly one MQTT frame and
/// becomes exactly one binary WebSocket frame. Text frames are protocol
/// errors and fail the connection.
#[derive(Debug)]
pub enum WebSocketTransport {
    Plain(WebSocketAdapter<TcpStream>),
    Tls(WebSocketAdapter<tokio_rustls::server::TlsStream<TcpStream>>),
}

impl WebSocketTransport {
    /// Wrap a WebSocket stream accepted over plain TCP.
    pub fn from_plain_stream(ws: WebSocketStream<TcpStream>) -> Self {
        Self::Plain(WebSocketAdapter::new(ws))
    }

    /// Wrap a WebSocket stream accepted over TLS.
    pub fn from_tls_stream(
        ws: WebSocketStream<tokio_rustls::server::TlsStream<TcpStream>>,
    ) -> Self {
        Self::Tls(WebSocketAdapter::new(ws))
    }
}

/// Adapts a WebSocket's message framing to the byte-stream contract of
/// [`TransportOps`], buffering each inbound binary frame until the
/// connection has consumed it.
#[derive(Debug)]
pub struct WebSocketAdapter<S> {
    ws: WebSocketStream<S>,
    read_buffer: Vec<u8>,
    read_pos: usize,
}

impl<S> WebSocketAdapter<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    pub fn new(ws: WebSocketStream<S>) -> Self {
        Self {
            ws,
            read_buffer: Vec::new(),
            read_pos: 0,
        }
    }

    /// Pull frames until a binary one is buffered. Ping/pong frames are
    /// absorbed; text frames and close frames end the connection.
    async fn ensure_data(&mut self) -> Result<(), TransportError> {
        while self.read_pos >= self.read_buffer.len() {
            match self.ws.next().await {
                Some(Ok(Message::Binary(data))) => {
                    self.read_buffer = data;
                    self.read_pos = 0;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(_)) => {
                    return Err(TransportError::WebSocket(
                        "unexpected text frame on MQTT websocket".into(),
                    ))
                }
                Some(Err(e)) => return Err(TransportError::WebSocket(Box::new(e))),
            }
        }
        Ok(())
    }

    fn copy_out(&mut self, buffer: &mut [u8]) -> usize {
        let available = self.read_buffer.len() - self.read_pos;
        let to_copy = buffer.len().min(available);
        if to_copy > 0 {
            buffer[..to_copy]
                .copy_from_slice(&self.read_buffer[self.read_pos..self.read_pos + to_copy]);
            self.read_pos += to_copy;
        }
        to_copy
    }

    async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        self.ws
            .send(Message::Binary(data))
            .await
            .map_err(|e| TransportError::WebSocket(Box::new(e)))
    }

    async fn close(&mut self, timeout_duration: Duration) {
        // Close frame exchange, then fall back to dropping the stream.
        let _ = timeout(timeout_duration, async {
            self.ws.send(Message::Close(None)).await?;
            self.ws.close(None).await?;
            Ok::<(), WsError>(())
        })
        .await;
    }
}

impl TransportOps for WebSocketTransport {
    fn send<'a>(
        &'a mut self,
        buffers: &'a [IoSlice<'a>],
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
        Box::pin(async move {
            // One MQTT frame per call, so one binary frame per call.
            let total: usize = buffers.iter().map(|buf| buf.len()).sum();
            let mut combined = Vec::with_capacity(total);
            for buf in buffers {
                combined.extend_from_slice(buf);
            }

            match self {
                WebSocketTransport::Plain(adapter) => adapter.send_binary(combined).await,
                WebSocketTransport::Tls(adapter) => adapter.send_binary(combined).await,
            }
        })
    }

    fn recv<'a>(
        &'a mut self,
        buffer: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            match self {
                WebSocketTransport::Plain(adapter) => {
                    adapter.ensure_data().await?;
                    Ok(adapter.copy_out(buffer))
                }
                WebSocketTransport::Tls(adapter) => {
                    adapter.ensure_data().await?;
                    Ok(adapter.copy_out(buffer))
                }
            }
        })
    }

    fn shutdown<'a>(
        &'a mut self,
        timeout_duration: Duration,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            match self {
                WebSocketTransport::Plain(adapter) => adapter.close(timeout_duration).await,
                WebSocketTransport::Tls(adapter) => adapter.close(timeout_duration).await,
            }
        })
    }
}
