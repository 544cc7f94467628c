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

pub mod broker;
pub mod broker_option;
pub(crate) mod broker_request;
pub mod connection;
pub mod connection_error;
pub mod handler;
pub mod http_bridge;
pub mod message;
pub mod packet;
pub mod topic_tree;
pub mod transport;

pub use broker::{Broker, BrokerState};
pub use broker_option::BrokerOption;
pub use connection::{ConnectionEvent, DeliverySink};
pub use connection_error::ConnectionError;
pub use handler::{AcceptAll, AttributeValue, ConnectionContext, Handler, HandlerError};
pub use message::{Message, QoS};
pub use packet::{ConnectReturnCode, FixedHeader, PacketType, MAX_MESSAGE_LENGTH};
pub use topic_tree::{Subscription, SubscriptionId, TopicTree};
pub use transport::{TransportError, TransportOps};
