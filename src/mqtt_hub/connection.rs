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

//! Per-client protocol state machine.
//!
//! One connection task runs per accepted socket. Its event loop multiplexes
//! three sources: bytes arriving from the transport (parsed incrementally
//! into MQTT frames), delivery events fanned out by the broker's routing
//! loop, and the keep-alive deadline. Inbound frames either answer on the
//! connection's own transport (CONNACK, acks, PINGRESP) or enqueue work on
//! the broker; they never touch shared state directly.

use std::collections::HashMap;
use std::io::IoSlice;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, warn};

use crate::mqtt_hub::broker::Broker;
use crate::mqtt_hub::connection_error::ConnectionError;
use crate::mqtt_hub::handler::ConnectionContext;
use crate::mqtt_hub::message::{Message, QoS};
use crate::mqtt_hub::packet::{
    encode_fixed_header, read_bytes, read_string, ConnectReturnCode, FixedHeader, PacketType,
};
use crate::mqtt_hub::topic_tree::SubscriptionId;
use crate::mqtt_hub::transport::{TransportError, TransportOps};

/// Protocol name and version the broker accepts.
const PROTOCOL_NAME: &str = "MQIsdp";
const PROTOCOL_VERSION: u8 = 0x03;

/// Longest accepted client identifier. The protocol says 23 bytes, but
/// enough client implementations ignore that to make 128 the practical
/// bound.
const MAX_CLIENT_ID_LENGTH: usize = 128;

/// Event delivered to a connection task by the broker's routing loop.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Write this message out at `min(qos, message.qos)`.
    Deliver { message: Message, qos: QoS },
    /// Broker shutdown: close the connection.
    Close,
}

/// Sending half of a connection's event channel; held by every subscription
/// record the connection owns in the topic tree.
pub type DeliverySink = mpsc::UnboundedSender<ConnectionEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Connecting,
    Connected,
    Closing,
    Closed,
}

/// State for one client connection. Owned by its task; nothing here is
/// shared except the [`ConnectionContext`] handed to handler hooks.
pub(crate) struct Connection {
    broker: Broker,
    context: Arc<ConnectionContext>,
    state: ConnectionState,
    will: Option<Message>,
    /// Outbound packet identifier counter, 1..=65535 wrapping past zero.
    next_packet_id: u16,
    /// QoS 2 receive store: messages held between PUBLISH and PUBREL.
    inbound_qos2: HashMap<u16, Message>,
    /// This client's subscriptions: filter to (broker handle, granted QoS).
    subscriptions: HashMap<String, (SubscriptionId, QoS)>,
    event_tx: DeliverySink,
    /// Keep-alive timeout (grace already applied); `None` disables it.
    keep_alive: Option<Duration>,
}

impl Connection {
    pub(crate) fn new(broker: Broker) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let connection = Self {
            broker,
            context: Arc::new(ConnectionContext::new()),
            state: ConnectionState::Connecting,
            will: None,
            next_packet_id: 0,
            inbound_qos2: HashMap::new(),
            subscriptions: HashMap::new(),
            event_tx,
            keep_alive: None,
        };
        (connection, event_rx)
    }

    fn alive(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        )
    }

    /// Drive the connection until it closes.
    pub(crate) async fn run<T>(
        mut self,
        mut transport: T,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) where
        T: TransportOps + Send,
    {
        let options = self.broker.options().clone();
        let mut scratch = vec![0u8; options.recv_buffer_size()];
        let mut read_buf: Vec<u8> = Vec::new();
        let mut deadline = Instant::now();

        let outcome: Result<(), ConnectionError> = loop {
            tokio::select! {
                received = transport.recv(&mut scratch) => {
                    match received {
                        Ok(0) => break Err(Self::eof_error(&read_buf)),
                        Ok(n) => {
                            read_buf.extend_from_slice(&scratch[..n]);
                            if let Err(err) = self.process_buffer(&mut transport, &mut read_buf).await {
                                break Err(err);
                            }
                            if let Some(keep_alive) = self.keep_alive {
                                deadline = Instant::now() + keep_alive;
                            }
                        }
                        Err(err) => break Err(err.into()),
                    }
                }
                event = events.recv() => {
                    match event {
                        Some(ConnectionEvent::Deliver { message, qos }) => {
                            if let Err(err) = self.deliver(&mut transport, message, qos).await {
                                break Err(err);
                            }
                        }
                        Some(ConnectionEvent::Close) | None => {
                            self.state = ConnectionState::Closing;
                            break Ok(());
                        }
                    }
                }
                _ = sleep_until(deadline), if self.keep_alive.is_some() => {
                    break Err(ConnectionError::KeepAliveTimeout);
                }
            }

            if !self.alive() {
                break Ok(());
            }
        };

        match outcome {
            Ok(()) => self.shutdown_clean(&mut transport).await,
            Err(err) => self.fail(&mut transport, err).await,
        }
    }

    /// Classify an EOF relative to any partially buffered frame.
    fn eof_error(read_buf: &[u8]) -> ConnectionError {
        if read_buf.is_empty() {
            return ConnectionError::Transport(TransportError::Closed);
        }
        match FixedHeader::parse(read_buf) {
            Ok(None) => ConnectionError::IncompleteHeader,
            Ok(Some(_)) => ConnectionError::IncompleteMessage,
            Err(err) => err,
        }
    }

    /// Dispatch every complete frame currently buffered. A chunk may carry
    /// several whole frames (WebSocket delivers them that way) or end in the
    /// middle of one; leftover bytes stay buffered for the next read.
    async fn process_buffer<T>(
        &mut self,
        transport: &mut T,
        read_buf: &mut Vec<u8>,
    ) -> Result<(), ConnectionError>
    where
        T: TransportOps,
    {
        loop {
            let Some((header, header_len)) = FixedHeader::parse(read_buf)? else {
                return Ok(());
            };
            let frame_end = header_len + header.remaining_length;
            if read_buf.len() < frame_end {
                return Ok(());
            }

            let body: Vec<u8> = read_buf[header_len..frame_end].to_vec();
            read_buf.drain(..frame_end);

            trace!(
                client = %self.context.client_id(),
                packet = %header.packet_type,
                len = header.remaining_length,
                "frame received"
            );
            self.handle_packet(transport, &header, &body).await?;

            if !self.alive() {
                return Ok(());
            }
        }
    }

    async fn handle_packet<T>(
        &mut self,
        transport: &mut T,
        header: &FixedHeader,
        body: &[u8],
    ) -> Result<(), ConnectionError>
    where
        T: TransportOps,
    {
        match (self.state, header.packet_type) {
            (ConnectionState::Connecting, PacketType::Connect) => {
                self.handle_connect(transport, body).await
            }
            (ConnectionState::Connected, PacketType::Subscribe) => {
                self.handle_subscribe(transport, body).await
            }
            (ConnectionState::Connected, PacketType::Unsubscribe) => {
                self.handle_unsubscribe(transport, body).await
            }
            (ConnectionState::Connected, PacketType::Publish) => {
                self.handle_publish(transport, header, body).await
            }
            (ConnectionState::Connected, PacketType::PubAck) => {
                // Completes a QoS 1 outbound publish; nothing is stored.
                Self::read_packet_id(body)?;
                Ok(())
            }
            (ConnectionState::Connected, PacketType::PubRec) => {
                let packet_id = Self::read_packet_id(body)?;
                // PUBREL carries the QoS 1 bit per the protocol.
                self.send_control(transport, 0x62, packet_id).await
            }
            (ConnectionState::Connected, PacketType::PubRel) => {
                self.handle_pubrel(transport, body).await
            }
            (ConnectionState::Connected, PacketType::PubComp) => {
                // Completes a QoS 2 outbound publish.
                Self::read_packet_id(body)?;
                Ok(())
            }
            (ConnectionState::Connected, PacketType::PingReq) => {
                self.send_frame(transport, &[IoSlice::new(&[0xD0, 0x00])])
                    .await
            }
            (ConnectionState::Connected, PacketType::Disconnect) => {
                // Clean close; the will is discarded.
                self.will = None;
                self.state = ConnectionState::Closing;
                Ok(())
            }
            (ConnectionState::Closing | ConnectionState::Closed, _) => Ok(()),
            (_, unexpected) => Err(ConnectionError::UnexpectedPacket(unexpected)),
        }
    }

    async fn handle_connect<T>(
        &mut self,
        transport: &mut T,
        body: &[u8],
    ) -> Result<(), ConnectionError>
    where
        T: TransportOps,
    {
        let (consumed, protocol) =
            read_string(body).ok_or(ConnectionError::ConnectMissingProtocol)?;
        if protocol != PROTOCOL_NAME {
            return Err(ConnectionError::ConnectProtocolUnexpected(protocol));
        }
        let mut rest = &body[consumed..];

        let (&version, tail) = rest
            .split_first()
            .ok_or(ConnectionError::IncompleteMessage)?;
        if version != PROTOCOL_VERSION {
            return self
                .connack(transport, ConnectReturnCode::UnacceptableProtocolVersion)
                .await;
        }
        rest = tail;

        let (&flags, tail) = rest
            .split_first()
            .ok_or(ConnectionError::IncompleteMessage)?;
        rest = tail;
        let will_flag = flags & 0x04 != 0;
        let will_qos = QoS::from_bits(flags >> 3);
        let will_retain = flags & 0x20 != 0;
        let password_flag = flags & 0x40 != 0;
        let username_flag = flags & 0x80 != 0;

        if rest.len() < 2 {
            return Err(ConnectionError::IncompleteMessage);
        }
        let keep_alive_secs = u16::from_be_bytes([rest[0], rest[1]]);
        rest = &rest[2..];
        if keep_alive_secs > 0 {
            let grace = self.broker.options().keep_alive_grace_percent();
            self.keep_alive = Some(Duration::from_millis(
                u64::from(keep_alive_secs) * 1000 * grace / 100,
            ));
        }

        let (consumed, client_id) =
            read_string(rest).ok_or(ConnectionError::IncompleteMessage)?;
        if client_id.len() > MAX_CLIENT_ID_LENGTH {
            debug!(
                error = %ConnectionError::ClientIdTooLong(client_id.len()),
                "rejecting connect"
            );
            return self
                .connack(transport, ConnectReturnCode::IdentifierRejected)
                .await;
        }
        self.context.set_client_id(client_id);
        rest = &rest[consumed..];

        if will_flag {
            let (consumed, topic) =
                read_string(rest).ok_or(ConnectionError::IncompleteMessage)?;
            rest = &rest[consumed..];
            let (consumed, payload) =
                read_bytes(rest).ok_or(ConnectionError::IncompleteMessage)?;
            let will = Message::new(topic, Bytes::copy_from_slice(payload), will_qos, will_retain);
            debug!(
                client = %self.context.client_id(),
                topic = %will.topic,
                qos = %will.qos,
                "will registered"
            );
            self.will = Some(will);
            rest = &rest[consumed..];
        }

        let mut username = String::new();
        let mut password = String::new();
        if username_flag {
            let (consumed, name) =
                read_string(rest).ok_or(ConnectionError::IncompleteMessage)?;
            username = name;
            rest = &rest[consumed..];

            if password_flag {
                // Some clients set the flag and send nothing; tolerated.
                if let Some((_, secret)) = read_string(rest) {
                    password = secret;
                }
            }
        }

        match self
            .broker
            .handler()
            .connect(&self.context, &username, &password)
        {
            Ok(()) => {
                self.connack(transport, ConnectReturnCode::Accepted).await?;
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(error) => {
                debug!(client = %self.context.client_id(), %error, "connect rejected by handler");
                let code = if username_flag {
                    ConnectReturnCode::BadUserNameOrPassword
                } else {
                    ConnectReturnCode::NotAuthorized
                };
                self.connack(transport, code).await
            }
        }
    }

    /// Write a CONNACK. Any code other than `Accepted` also closes the
    /// connection.
    async fn connack<T>(
        &mut self,
        transport: &mut T,
        code: ConnectReturnCode,
    ) -> Result<(), ConnectionError>
    where
        T: TransportOps,
    {
        let frame = [0x20, 0x02, 0x00, code.to_u8()];
        self.send_frame(transport, &[IoSlice::new(&frame)]).await?;
        if code != ConnectReturnCode::Accepted {
            self.state = ConnectionState::Closing;
        }
        Ok(())
    }

    async fn handle_subscribe<T>(
        &mut self,
        transport: &mut T,
        body: &[u8],
    ) -> Result<(), ConnectionError>
    where
        T: TransportOps,
    {
        let packet_id = Self::read_packet_id(body)?;
        let mut rest = &body[2..];

        let mut granted: Vec<u8> = Vec::new();
        while !rest.is_empty() {
            let (consumed, filter) =
                read_string(rest).ok_or(ConnectionError::IncompleteMessage)?;
            let &qos_byte = rest
                .get(consumed)
                .ok_or(ConnectionError::IncompleteMessage)?;
            rest = &rest[consumed + 1..];

            let qos = self.subscribe(&filter, QoS::from_bits(qos_byte)).await;
            if !self.alive() {
                // Broker closing or handler veto; no SUBACK on a dead link.
                return Ok(());
            }
            granted.push(qos.to_u8());
        }

        let mut frame = encode_fixed_header(0x90, 2 + granted.len());
        frame.extend_from_slice(&packet_id.to_be_bytes());
        frame.extend_from_slice(&granted);
        self.send_frame(transport, &[IoSlice::new(&frame)]).await
    }

    /// Register one subscription with the broker, deduplicating against this
    /// client's existing filters, and return the granted QoS.
    async fn subscribe(&mut self, filter: &str, qos: QoS) -> QoS {
        if let Some(&(_, granted)) = self.subscriptions.get(filter) {
            return granted;
        }
        match self
            .broker
            .subscribe(&self.context, filter, qos, self.event_tx.clone())
            .await
        {
            Some(id) => {
                self.subscriptions.insert(filter.to_string(), (id, qos));
                qos
            }
            None => {
                self.state = ConnectionState::Closing;
                QoS::AtMostOnce
            }
        }
    }

    async fn handle_unsubscribe<T>(
        &mut self,
        transport: &mut T,
        body: &[u8],
    ) -> Result<(), ConnectionError>
    where
        T: TransportOps,
    {
        let packet_id = Self::read_packet_id(body)?;
        let mut rest = &body[2..];

        while !rest.is_empty() {
            let (consumed, filter) =
                read_string(rest).ok_or(ConnectionError::IncompleteMessage)?;
            rest = &rest[consumed..];
            if let Some((id, _)) = self.subscriptions.remove(&filter) {
                self.broker.unsubscribe(id);
            }
        }

        self.send_control(transport, 0xB0, packet_id).await
    }

    async fn handle_publish<T>(
        &mut self,
        transport: &mut T,
        header: &FixedHeader,
        body: &[u8],
    ) -> Result<(), ConnectionError>
    where
        T: TransportOps,
    {
        let (consumed, topic) = read_string(body).ok_or(ConnectionError::IncompleteMessage)?;
        let rest = &body[consumed..];

        match header.qos {
            QoS::AtMostOnce => {
                let message = Message::new(
                    topic,
                    Bytes::copy_from_slice(rest),
                    QoS::AtMostOnce,
                    header.retain,
                );
                self.broker.publish(Some(&self.context), message);
                Ok(())
            }
            QoS::AtLeastOnce => {
                let packet_id = Self::read_packet_id(rest)?;
                let message = Message::new(
                    topic,
                    Bytes::copy_from_slice(&rest[2..]),
                    QoS::AtLeastOnce,
                    header.retain,
                );
                self.broker.publish(Some(&self.context), message);
                self.send_control(transport, 0x40, packet_id).await
            }
            QoS::ExactlyOnce => {
                let packet_id = Self::read_packet_id(rest)?;
                let message = Message::new(
                    topic,
                    Bytes::copy_from_slice(&rest[2..]),
                    QoS::ExactlyOnce,
                    header.retain,
                );
                // Held until the matching PUBREL releases it for routing.
                self.inbound_qos2.insert(packet_id, message);
                self.send_control(transport, 0x50, packet_id).await
            }
        }
    }

    async fn handle_pubrel<T>(
        &mut self,
        transport: &mut T,
        body: &[u8],
    ) -> Result<(), ConnectionError>
    where
        T: TransportOps,
    {
        let packet_id = Self::read_packet_id(body)?;
        let message = self
            .inbound_qos2
            .remove(&packet_id)
            .ok_or(ConnectionError::UnknownMessageId(packet_id))?;
        self.broker.publish(Some(&self.context), message);
        self.send_control(transport, 0x70, packet_id).await
    }

    /// Write one PUBLISH frame for a message routed to this connection.
    async fn deliver<T>(
        &mut self,
        transport: &mut T,
        message: Message,
        granted: QoS,
    ) -> Result<(), ConnectionError>
    where
        T: TransportOps,
    {
        let qos = message.qos.min(granted);
        trace!(
            client = %self.context.client_id(),
            topic = %message.topic,
            %qos,
            len = message.payload.len(),
            "delivering publish"
        );

        let topic = message.topic.as_bytes();
        let packet_id_len = if qos > QoS::AtMostOnce { 2 } else { 0 };
        let remaining = 2 + topic.len() + packet_id_len + message.payload.len();

        let byte0 = 0x30 | (qos.to_u8() << 1) | u8::from(message.retain);
        let mut head = encode_fixed_header(byte0, remaining);
        head.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        head.extend_from_slice(topic);
        if qos > QoS::AtMostOnce {
            let packet_id = self.next_packet_id();
            head.extend_from_slice(&packet_id.to_be_bytes());
            // TODO: retain the frame and retransmit if no PUBACK/PUBCOMP
            // arrives; QoS 1/2 outbound currently writes exactly once.
        }

        self.send_frame(
            transport,
            &[IoSlice::new(&head), IoSlice::new(&message.payload)],
        )
        .await
    }

    /// Next outbound packet identifier; wraps within 1..=65535.
    fn next_packet_id(&mut self) -> u16 {
        self.next_packet_id = if self.next_packet_id == u16::MAX {
            1
        } else {
            self.next_packet_id + 1
        };
        self.next_packet_id
    }

    fn read_packet_id(buf: &[u8]) -> Result<u16, ConnectionError> {
        if buf.len() < 2 {
            return Err(ConnectionError::IncompleteMessage);
        }
        Ok(u16::from_be_bytes([buf[0], buf[1]]))
    }

    /// Write a two-byte-body control frame (acks, UNSUBACK).
    async fn send_control<T>(
        &mut self,
        transport: &mut T,
        byte0: u8,
        packet_id: u16,
    ) -> Result<(), ConnectionError>
    where
        T: TransportOps,
    {
        let id = packet_id.to_be_bytes();
        let frame = [byte0, 0x02, id[0], id[1]];
        self.send_frame(transport, &[IoSlice::new(&frame)]).await
    }

    async fn send_frame<T>(
        &mut self,
        transport: &mut T,
        buffers: &[IoSlice<'_>],
    ) -> Result<(), ConnectionError>
    where
        T: TransportOps,
    {
        transport.send(buffers).await.map_err(Into::into)
    }

    /// Dirty close: log, tear down, then publish the will if one is set.
    async fn fail<T>(&mut self, transport: &mut T, error: ConnectionError)
    where
        T: TransportOps,
    {
        if self.state == ConnectionState::Closed {
            return;
        }
        warn!(
            client = %self.context.client_id(),
            %error,
            "closing connection after error"
        );
        let will = self.will.take();
        self.teardown(transport).await;
        if let Some(will) = will {
            self.broker.publish(Some(&self.context), will);
        }
    }

    /// Clean close (DISCONNECT or broker shutdown): the will is not
    /// published.
    async fn shutdown_clean<T>(&mut self, transport: &mut T)
    where
        T: TransportOps,
    {
        if self.state == ConnectionState::Closed {
            return;
        }
        debug!(client = %self.context.client_id(), "connection closed");
        self.teardown(transport).await;
    }

    async fn teardown<T>(&mut self, transport: &mut T)
    where
        T: TransportOps,
    {
        self.state = ConnectionState::Closed;
        for (_, (id, _)) in self.subscriptions.drain() {
            self.broker.unsubscribe(id);
        }
        transport
            .shutdown(Duration::from_millis(
                self.broker.options().shutdown_timeout_ms(),
            ))
            .await;
        self.broker.handler().disconnect(&self.context);
    }
}
