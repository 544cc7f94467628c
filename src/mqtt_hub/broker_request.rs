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

use tokio::sync::oneshot;

use crate::mqtt_hub::connection::DeliverySink;
use crate::mqtt_hub::message::{Message, QoS};
use crate::mqtt_hub::topic_tree::SubscriptionId;

/// Commands processed by the broker's routing loop.
///
/// Subscription changes and publishes travel on one channel, so a SUBSCRIBE
/// a connection submits before a PUBLISH is guaranteed to take effect before
/// that PUBLISH is routed.
pub(crate) enum BrokerRequest {
    Subscribe {
        filter: String,
        qos: QoS,
        sink: DeliverySink,
        response_tx: oneshot::Sender<SubscriptionId>,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Publish {
        message: Message,
    },
    Shutdown {
        response_tx: oneshot::Sender<()>,
    },
}
