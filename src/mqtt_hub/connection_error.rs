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

use crate::mqtt_hub::packet::PacketType;
use crate::mqtt_hub::transport::TransportError;

/// Unified error type for a single client connection.
///
/// Every protocol-level decoding error is fatal to the connection it occurred
/// on: the connection's fail path runs (log, tear down subscriptions, publish
/// the will if one was registered) and the broker keeps serving other
/// clients. These errors are never surfaced to the broker core as anything
/// other than subscription teardown.
///
/// # Error Categories
///
/// - **Framing**: `IncompleteHeader`, `MaxMessageLength`,
///   `MessageLengthInvalid`, `IncompleteMessage`, `UnknownMessageType`,
///   `ReservedMessageType`
/// - **CONNECT handshake**: `ConnectMissingProtocol`,
///   `ConnectProtocolUnexpected`, `ClientIdTooLong`
/// - **Protocol state**: `UnknownMessageId`, `UnexpectedPacket`,
///   `KeepAliveTimeout`
/// - **Transport**: `Transport`, wrapping I/O, TLS, and WebSocket failures
#[derive(Debug)]
pub enum ConnectionError {
    /// The byte stream ended in the middle of a fixed header.
    IncompleteHeader,
    /// The remaining-length field exceeds the server maximum.
    MaxMessageLength,
    /// The remaining-length varint runs past its four-byte maximum.
    MessageLengthInvalid,
    /// A frame body ended before the fields it announced.
    IncompleteMessage,
    /// The first header byte carried a message type outside 1..=14.
    UnknownMessageType(u8),
    /// The first header byte carried the reserved type 0 or 15.
    ReservedMessageType,
    /// CONNECT did not carry a protocol name field.
    ConnectMissingProtocol,
    /// CONNECT carried a protocol name other than `MQIsdp`.
    ConnectProtocolUnexpected(String),
    /// CONNECT carried a client identifier longer than 128 bytes.
    ClientIdTooLong(usize),
    /// A PUBREL referenced a packet identifier with no stored message.
    UnknownMessageId(u16),
    /// A packet type not admitted by the connection's current state.
    UnexpectedPacket(PacketType),
    /// No traffic arrived within 1.5 times the negotiated keep-alive.
    KeepAliveTimeout,
    /// I/O or transport-level failure.
    Transport(TransportError),
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::IncompleteHeader => write!(f, "incomplete header"),
            ConnectionError::MaxMessageLength => {
                write!(f, "message length exceeds server maximum")
            }
            ConnectionError::MessageLengthInvalid => {
                write!(f, "message length exceeds protocol maximum")
            }
            ConnectionError::IncompleteMessage => write!(f, "incomplete message"),
            ConnectionError::UnknownMessageType(t) => {
                write!(f, "unknown mqtt message type {t}")
            }
            ConnectionError::ReservedMessageType => write!(f, "reserved message type"),
            ConnectionError::ConnectMissingProtocol => {
                write!(f, "connect message has no protocol field")
            }
            ConnectionError::ConnectProtocolUnexpected(name) => {
                write!(f, "connect message protocol is not 'MQIsdp': {name:.12}")
            }
            ConnectionError::ClientIdTooLong(len) => {
                write!(f, "connect client id is too long ({len} bytes)")
            }
            ConnectionError::UnknownMessageId(id) => write!(f, "unknown message id {id}"),
            ConnectionError::UnexpectedPacket(t) => {
                write!(f, "{t} not allowed in the current connection state")
            }
            ConnectionError::KeepAliveTimeout => write!(f, "keep-alive expired"),
            ConnectionError::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<TransportError> for ConnectionError {
    fn from(e: TransportError) -> Self {
        ConnectionError::Transport(e)
    }
}
