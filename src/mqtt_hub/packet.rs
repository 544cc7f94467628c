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

//! MQTT v3.1 frame codec.
//!
//! The fixed header packs `type << 4 | dup << 3 | qos << 1 | retain` into the
//! first byte, followed by a 1-4 byte base-128 varint carrying the remaining
//! length. String and binary fields use a two-byte big-endian length prefix.
//!
//! Decoding is incremental over a byte buffer: both the raw TCP/TLS read path
//! (which appends whatever the socket produced) and the WebSocket path (which
//! appends complete binary frames) feed the same accumulation buffer, and
//! [`FixedHeader::parse`] reports `None` until a complete header is present.

use crate::mqtt_hub::connection_error::ConnectionError;
use crate::mqtt_hub::message::QoS;

/// Server-side cap on the remaining-length field. Frames advertising a larger
/// body are protocol errors and fail the connection.
pub const MAX_MESSAGE_LENGTH: usize = 15_360;

/// MQTT control packet types (values 1 through 14; 0 and 15 are reserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = ConnectionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 | 15 => Err(ConnectionError::ReservedMessageType),
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::ConnAck),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::PubAck),
            5 => Ok(PacketType::PubRec),
            6 => Ok(PacketType::PubRel),
            7 => Ok(PacketType::PubComp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::SubAck),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::UnsubAck),
            12 => Ok(PacketType::PingReq),
            13 => Ok(PacketType::PingResp),
            14 => Ok(PacketType::Disconnect),
            other => Err(ConnectionError::UnknownMessageType(other)),
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PacketType::Connect => "CONNECT",
            PacketType::ConnAck => "CONNACK",
            PacketType::Publish => "PUBLISH",
            PacketType::PubAck => "PUBACK",
            PacketType::PubRec => "PUBREC",
            PacketType::PubRel => "PUBREL",
            PacketType::PubComp => "PUBCOMP",
            PacketType::Subscribe => "SUBSCRIBE",
            PacketType::SubAck => "SUBACK",
            PacketType::Unsubscribe => "UNSUBSCRIBE",
            PacketType::UnsubAck => "UNSUBACK",
            PacketType::PingReq => "PINGREQ",
            PacketType::PingResp => "PINGRESP",
            PacketType::Disconnect => "DISCONNECT",
        };
        f.write_str(name)
    }
}

/// CONNACK return codes defined by MQTT v3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUserNameOrPassword = 4,
    NotAuthorized = 5,
}

impl ConnectReturnCode {
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Decoded MQTT fixed header. Transient, one per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    /// Number of body bytes following the header, at most
    /// [`MAX_MESSAGE_LENGTH`].
    pub remaining_length: usize,
}

impl FixedHeader {
    /// Try to decode a fixed header from the front of `buf`.
    ///
    /// Returns `Ok(Some((header, consumed)))` once the first byte and the
    /// complete remaining-length varint are available, `Ok(None)` when more
    /// bytes are needed, and an error for reserved packet types, for a
    /// remaining length exceeding [`MAX_MESSAGE_LENGTH`], or for a varint
    /// that would run past four bytes.
    pub fn parse(buf: &[u8]) -> Result<Option<(FixedHeader, usize)>, ConnectionError> {
        let Some(&byte0) = buf.first() else {
            return Ok(None);
        };

        let type_bits = byte0 >> 4;
        if type_bits == 0 || type_bits == 15 {
            return Err(ConnectionError::ReservedMessageType);
        }

        let mut multiplier: usize = 1;
        let mut length: usize = 0;
        let mut consumed = 1;
        loop {
            let Some(&byte) = buf.get(consumed) else {
                return Ok(None);
            };
            consumed += 1;

            length += (byte & 0x7F) as usize * multiplier;
            if length > MAX_MESSAGE_LENGTH {
                return Err(ConnectionError::MaxMessageLength);
            }
            if byte & 0x80 == 0 {
                break;
            }
            if multiplier > 0x4000 {
                return Err(ConnectionError::MessageLengthInvalid);
            }
            multiplier *= 128;
        }

        Ok(Some((
            FixedHeader {
                packet_type: PacketType::try_from(type_bits)?,
                dup: byte0 & 0x08 != 0,
                qos: QoS::from_bits(byte0 >> 1),
                retain: byte0 & 0x01 != 0,
                remaining_length: length,
            },
            consumed,
        )))
    }
}

/// Encode a fixed header: the leading byte followed by the minimal varint for
/// `remaining`. The caller appends the variable header and hands the payload
/// to the transport as a separate `IoSlice`, avoiding a second copy.
pub fn encode_fixed_header(byte0: u8, mut remaining: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    buf.push(byte0);
    loop {
        let mut byte = (remaining % 128) as u8;
        remaining /= 128;
        if remaining > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if remaining == 0 {
            break;
        }
    }
    buf
}

/// Read a length-prefixed byte field. Returns the total consumed length
/// (prefix included) and the content, or `None` on underflow - which callers
/// surface as `IncompleteMessage`.
pub fn read_bytes(buf: &[u8]) -> Option<(usize, &[u8])> {
    if buf.len() < 2 {
        return None;
    }
    let end = 2 + u16::from_be_bytes([buf[0], buf[1]]) as usize;
    if buf.len() < end {
        return None;
    }
    Some((end, &buf[2..end]))
}

/// Read a length-prefixed UTF-8 string field. Invalid UTF-8 is replaced
/// rather than rejected, keeping the permissiveness of common v3.1 clients.
pub fn read_string(buf: &[u8]) -> Option<(usize, String)> {
    read_bytes(buf).map(|(consumed, bytes)| {
        (consumed, String::from_utf8_lossy(bytes).into_owned())
    })
}

/// Append a length-prefixed string field to `out`.
pub fn write_string(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value.as_bytes());
}
