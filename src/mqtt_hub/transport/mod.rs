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

//! Transport layer for broker connections.
//!
//! The broker accepts clients over plain TCP, TLS, and WebSocket. Each
//! accepted socket is wrapped in a type implementing [`TransportOps`], the
//! byte-stream contract the connection state machine is written against.
//! Custom transports (in-memory streams for tests, say) only need to
//! implement this one trait.

pub mod accept_helper;
mod tcp;
mod tls;
mod websocket;

pub use tcp::TcpTransport;
pub use tls::TlsTransport;
pub use websocket::{WebSocketAdapter, WebSocketTransport};

use std::future::Future;
use std::io::IoSlice;
use std::pin::Pin;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Duration;

/// Errors surfaced by transport implementations.
#[derive(Debug)]
pub enum TransportError {
    Io(std::io::Error),
    Tls(Box<dyn std::error::Error + Send + Sync>),
    WebSocket(Box<dyn std::error::Error + Send + Sync>),
    /// The peer closed the stream.
    Closed,
    Timeout,
    NotConnected,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "IO error: {e}"),
            TransportError::Tls(e) => write!(f, "TLS error: {e}"),
            TransportError::WebSocket(e) => write!(f, "WebSocket error: {e}"),
            TransportError::Closed => write!(f, "connection closed by peer"),
            TransportError::Timeout => write!(f, "operation timed out"),
            TransportError::NotConnected => write!(f, "transport not connected"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Byte-stream operations a broker connection needs from its transport.
///
/// A connection issues `recv` for inbound bytes, `send` with the fixed
/// header and payload of one MQTT frame as separate slices (so transports
/// can write them without recombining copies - TCP and TLS use vectored
/// writes, the WebSocket transport packs them into a single binary frame),
/// and `shutdown` once on close.
///
/// # Examples
///
/// ```ignore
/// use mqtt_hub_tokio::mqtt_hub::transport::{TransportOps, TransportError};
/// use std::future::Future;
/// use std::io::IoSlice;
/// use std::pin::Pin;
/// use tokio::time::Duration;
///
/// struct NullTransport;
///
/// impl TransportOps for NullTransport {
///     fn send<'a>(
///         &'a mut self,
///         _buffers: &'a [IoSlice<'a>],
///     ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
///         Box::pin(async move { Ok(()) })
///     }
///
///     fn recv<'a>(
///         &'a mut self,
///         _buffer: &'a mut [u8],
///     ) -> Pin<Box<dyn Future<Output = Result<usize, TransportError>> + Send + 'a>> {
///         Box::pin(async move { Ok(0) })
///     }
///
///     fn shutdown<'a>(
///         &'a mut self,
///         _timeout: Duration,
///     ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
///         Box::pin(async move {})
///     }
/// }
/// ```
pub trait TransportOps {
    /// Send the given buffers in order, completely.
    ///
    /// Returns once every byte has been handed to the OS (flushed), or a
    /// [`TransportError`] if the stream failed first.
    fn send<'a>(
        &'a mut self,
        buffers: &'a [IoSlice<'a>],
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;

    /// Read available bytes into `buffer`.
    ///
    /// Resolves with the number of bytes read; `Ok(0)` means the peer closed
    /// the stream. The buffer is not necessarily filled.
    fn recv<'a>(
        &'a mut self,
        buffer: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, TransportError>> + Send + 'a>>;

    /// Gracefully shut the stream down, waiting at most `timeout`; after
    /// that the stream is simply dropped.
    fn shutdown<'a>(
        &'a mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Forwarding impl so transports can be used behind trait objects.
impl TransportOps for Box<dyn TransportOps + Send> {
    fn send<'a>(
        &'a mut self,
        buffers: &'a [IoSlice<'a>],
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
        (**self).send(buffers)
    }

    fn recv<'a>(
        &'a mut self,
        buffer: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, TransportError>> + Send + 'a>> {
        (**self).recv(buffer)
    }

    fn shutdown<'a>(
        &'a mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        (**self).shutdown(timeout)
    }
}

/// Write every byte of `buffers` with vectored writes, handling partial
/// progress, then flush. Shared by the TCP and TLS transports.
pub(crate) async fn write_all_vectored<W>(
    writer: &mut W,
    buffers: &[IoSlice<'_>],
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let total: usize = buffers.iter().map(|buf| buf.len()).sum();
    let mut offsets = vec![0usize; buffers.len()];
    let mut written = 0usize;

    while written < total {
        let pending: Vec<IoSlice> = buffers
            .iter()
            .enumerate()
            .filter_map(|(i, buf)| {
                let start = offsets[i];
                (start < buf.len()).then(|| IoSlice::new(&buf[start..]))
            })
            .collect();
        if pending.is_empty() {
            break;
        }

        let n = writer
            .write_vectored(&pending)
            .await
            .map_err(TransportError::Io)?;
        if n == 0 {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0 bytes written",
            )));
        }
        written += n;

        let mut to_skip = n;
        for (i, buf) in buffers.iter().enumerate() {
            let available = buf.len() - offsets[i];
            if available == 0 {
                continue;
            }
            let take = to_skip.min(available);
            offsets[i] += take;
            to_skip -= take;
            if to_skip == 0 {
                break;
            }
        }
    }

    writer.flush().await.map_err(TransportError::Io)
}
