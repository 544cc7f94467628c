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

use bytes::Bytes;

/// MQTT Quality of Service level.
///
/// The broker supports all three MQTT v3.1 levels. `Ord` follows the numeric
/// wire encoding, so the effective delivery QoS for a subscription is simply
/// `message.qos.min(granted_qos)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QoS {
    /// QoS 0 - fire and forget
    AtMostOnce = 0,
    /// QoS 1 - acknowledged via PUBACK
    AtLeastOnce = 1,
    /// QoS 2 - PUBREC / PUBREL / PUBCOMP handshake
    ExactlyOnce = 2,
}

impl QoS {
    /// Decode a QoS from the low two bits of a flags byte.
    ///
    /// The reserved value 3 clamps to `ExactlyOnce`; the source of truth for
    /// a subscription's service level is the SUBACK the broker returns.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        }
    }

    /// The wire encoding of this QoS level.
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for QoS {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_u8())
    }
}

/// An MQTT application message.
///
/// A message is immutable after construction. The payload is reference
/// counted, so cloning a message for fan-out to many subscribers shares the
/// payload bytes instead of copying them.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Concrete topic the message was published on (no wildcards).
    pub topic: String,
    /// Application payload bytes, shared between clones.
    pub payload: Bytes,
    /// QoS the publisher sent the message with.
    pub qos: QoS,
    /// Retain flag as received; propagated to subscribers unchanged.
    pub retain: bool,
}

impl Message {
    /// Create a new message.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// use mqtt_hub_tokio::mqtt_hub::{Message, QoS};
    ///
    /// let msg = Message::new("sensors/temp", &b"21.5"[..], QoS::AtMostOnce, false);
    /// assert_eq!(msg.topic, "sensors/temp");
    /// ```
    pub fn new(
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        }
    }
}
