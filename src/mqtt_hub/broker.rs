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

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace};

use crate::mqtt_hub::broker_option::BrokerOption;
use crate::mqtt_hub::broker_request::BrokerRequest;
use crate::mqtt_hub::connection::{Connection, ConnectionEvent, DeliverySink};
use crate::mqtt_hub::handler::{ConnectionContext, Handler};
use crate::mqtt_hub::message::{Message, QoS};
use crate::mqtt_hub::topic_tree::{SubscriptionId, TopicTree};
use crate::mqtt_hub::transport::TransportOps;

/// Topic whose subscribers receive every publish outside the `$SYS` space.
const SYS_ALL: [&str; 2] = ["$SYS", "all"];

/// Reserved control topic; currently a no-op.
const SYS_CLOSE: &str = "$SYS/close";

/// Broker lifecycle state, observable through [`Broker::alive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Running,
    Closing,
    Closed,
}

/// Handle to a running MQTT broker.
///
/// Creating a broker spawns its routing loop: a single task that owns the
/// topic tree and all subscription records, serialising every subscription
/// change and every publish fan-out. All other tasks - one per client
/// connection, plus any host thread calling [`Broker::publish`] - only ever
/// enqueue work onto the routing loop's channel, so the tree needs no locks.
///
/// The handle is cheap to clone; clones share the same broker.
///
/// # Examples
///
/// ```ignore
/// use std::sync::Arc;
/// use mqtt_hub_tokio::mqtt_hub::{AcceptAll, Broker};
/// use mqtt_hub_tokio::mqtt_hub::transport::TcpTransport;
/// use tokio::net::TcpListener;
///
/// # async fn example() -> std::io::Result<()> {
/// let broker = Broker::new(Arc::new(AcceptAll));
/// let listener = TcpListener::bind("0.0.0.0:1883").await?;
/// loop {
///     let (stream, _) = listener.accept().await?;
///     let broker = broker.clone();
///     tokio::spawn(async move {
///         broker.serve(TcpTransport::from_stream(stream)).await;
///     });
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct Broker {
    request_tx: mpsc::UnboundedSender<BrokerRequest>,
    state_rx: watch::Receiver<BrokerState>,
    handler: Arc<dyn Handler>,
    options: Arc<BrokerOption>,
}

impl Broker {
    /// Create a broker with default options and start its routing loop.
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self::with_options(handler, BrokerOption::default())
    }

    /// Create a broker with explicit tuning options.
    pub fn with_options(handler: Arc<dyn Handler>, options: BrokerOption) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(BrokerState::Running);

        tokio::spawn(Self::route_loop(request_rx, state_tx));

        Self {
            request_tx,
            state_rx,
            handler,
            options: Arc::new(options),
        }
    }

    /// Whether the broker is still accepting work.
    pub fn alive(&self) -> bool {
        matches!(*self.state_rx.borrow(), BrokerState::Running)
    }

    /// Publish a message through the broker.
    ///
    /// `conn` identifies the originating connection, or `None` for messages
    /// injected by the host (the HTTP bridge, tests, scheduled jobs). The
    /// host [`Handler::publish`] hook is consulted first; a veto drops the
    /// message silently. Routing itself happens asynchronously on the
    /// broker's loop: messages from one publisher are routed in submission
    /// order, and each message is fanned out to all matching subscriptions
    /// before the next one begins.
    pub fn publish(&self, conn: Option<&ConnectionContext>, message: Message) {
        if !self.alive() {
            return;
        }
        if let Err(error) = self.handler.publish(conn, &message) {
            debug!(topic = %message.topic, %error, "publish vetoed by handler");
            return;
        }
        let _ = self.request_tx.send(BrokerRequest::Publish { message });
    }

    /// Register a subscription for a connection.
    ///
    /// Returns `None` when the handler vetoes the subscription or the broker
    /// is shutting down; the caller closes the connection in both cases.
    pub(crate) async fn subscribe(
        &self,
        conn: &ConnectionContext,
        filter: &str,
        qos: QoS,
        sink: DeliverySink,
    ) -> Option<SubscriptionId> {
        if !self.alive() {
            return None;
        }
        if let Err(error) = self.handler.subscribe(conn, filter, qos) {
            debug!(client = %conn.client_id(), filter, %error, "subscribe vetoed by handler");
            return None;
        }

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(BrokerRequest::Subscribe {
                filter: filter.to_string(),
                qos,
                sink,
                response_tx,
            })
            .ok()?;
        response_rx.await.ok()
    }

    /// Request removal of a subscription. The unlink happens on the routing
    /// loop; pending publishes already queued behind it still see the old
    /// tree, matching the ordering guarantees of the command channel.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) {
        let _ = self.request_tx.send(BrokerRequest::Unsubscribe { id });
    }

    /// Run one client connection to completion.
    ///
    /// Parses frames off the transport, drives the per-connection protocol
    /// state machine and writes outbound frames, returning once the
    /// connection closed (cleanly or not). Callers typically spawn one task
    /// per accepted socket around this future.
    pub async fn serve<T>(&self, transport: T)
    where
        T: TransportOps + Send,
    {
        let (connection, events) = Connection::new(self.clone());
        connection.run(transport, events).await;
    }

    /// Signal shutdown and wait for the routing loop to wind down.
    ///
    /// The loop closes every connection subscribed under `$SYS/all`, drops
    /// the tree and exits; in-flight routing finishes first. Listener accept
    /// loops are the caller's to stop.
    pub async fn close(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .request_tx
            .send(BrokerRequest::Shutdown { response_tx })
            .is_err()
        {
            return;
        }
        let _ = response_rx.await;
    }

    /// Wait until the routing loop has exited.
    pub async fn run(&self) {
        let mut state_rx = self.state_rx.clone();
        while *state_rx.borrow() != BrokerState::Closed {
            if state_rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub(crate) fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub(crate) fn options(&self) -> &Arc<BrokerOption> {
        &self.options
    }

    /// The routing loop: sole owner and sole mutator of the topic tree.
    async fn route_loop(
        mut request_rx: mpsc::UnboundedReceiver<BrokerRequest>,
        state_tx: watch::Sender<BrokerState>,
    ) {
        let mut tree = TopicTree::new();

        while let Some(request) = request_rx.recv().await {
            match request {
                BrokerRequest::Subscribe {
                    filter,
                    qos,
                    sink,
                    response_tx,
                } => {
                    let id = tree.subscribe(&filter, qos, sink);
                    trace!(%filter, %qos, subscriptions = tree.len(), "subscription added");
                    let _ = response_tx.send(id);
                }
                BrokerRequest::Unsubscribe { id } => {
                    tree.unsubscribe(id);
                    trace!(subscriptions = tree.len(), "subscription removed");
                }
                BrokerRequest::Publish { message } => {
                    Self::route(&tree, message);
                }
                BrokerRequest::Shutdown { response_tx } => {
                    let _ = state_tx.send(BrokerState::Closing);
                    for sub in tree.subscriptions_at(&SYS_ALL) {
                        let _ = sub.sink.send(ConnectionEvent::Close);
                    }
                    info!("broker routing loop shutting down");
                    let _ = response_tx.send(());
                    break;
                }
            }
        }

        let _ = state_tx.send(BrokerState::Closed);
    }

    /// Fan a message out to every matching subscription. Runs on the routing
    /// loop only.
    fn route(tree: &TopicTree, message: Message) {
        if message.topic == SYS_CLOSE {
            return;
        }

        debug!(
            topic = %message.topic,
            len = message.payload.len(),
            "routing publish"
        );

        for (sink, granted) in tree.collect_matches(&message.topic) {
            let _ = sink.send(ConnectionEvent::Deliver {
                message: message.clone(),
                qos: granted,
            });
        }

        // $SYS traffic is internal and never reaches the firehose.
        if !message.topic.starts_with("$SYS") {
            for sub in tree.subscriptions_at(&SYS_ALL) {
                let _ = sub.sink.send(ConnectionEvent::Deliver {
                    message: message.clone(),
                    qos: sub.qos,
                });
            }
        }
    }
}
