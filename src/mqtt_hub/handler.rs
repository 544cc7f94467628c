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

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;

use crate::mqtt_hub::message::{Message, QoS};

/// Error type host handlers return to veto an operation. The broker logs the
/// error and drops the operation; it is never forwarded to clients beyond
/// the CONNACK rejection codes.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Opaque per-connection value for the host's attribute store.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Text(String),
    Binary(Bytes),
}

/// State of one client connection shared with the host [`Handler`].
///
/// The connection task owns all protocol state; this context carries only
/// what host code needs across hook invocations: the client identifier set
/// during CONNECT and a keyed opaque-value store the handler may use to
/// attach its own session data.
#[derive(Debug, Default)]
pub struct ConnectionContext {
    client_id: Mutex<String>,
    attributes: Mutex<HashMap<String, AttributeValue>>,
}

impl ConnectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The client identifier from CONNECT; empty until the handshake parsed.
    pub fn client_id(&self) -> String {
        self.client_id.lock().expect("client id lock poisoned").clone()
    }

    pub(crate) fn set_client_id(&self, client_id: String) {
        *self.client_id.lock().expect("client id lock poisoned") = client_id;
    }

    /// Look up a host attribute by key.
    pub fn attribute(&self, key: &str) -> Option<AttributeValue> {
        self.attributes
            .lock()
            .expect("attribute lock poisoned")
            .get(key)
            .cloned()
    }

    /// Store a host attribute, replacing any previous value under `key`.
    pub fn set_attribute(&self, key: impl Into<String>, value: AttributeValue) {
        self.attributes
            .lock()
            .expect("attribute lock poisoned")
            .insert(key.into(), value);
    }
}

/// Host-supplied policy hooks.
///
/// All methods may be called concurrently from any connection worker, so
/// implementations must be `Send + Sync`. Every method has an accepting
/// default, letting hosts override only the decisions they care about.
///
/// # Examples
///
/// ```ignore
/// use mqtt_hub_tokio::mqtt_hub::{ConnectionContext, Handler, HandlerError};
///
/// struct DenyAnonymous;
///
/// impl Handler for DenyAnonymous {
///     fn connect(
///         &self,
///         _conn: &ConnectionContext,
///         username: &str,
///         _password: &str,
///     ) -> Result<(), HandlerError> {
///         if username.is_empty() {
///             return Err("anonymous access disabled".into());
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Handler: Send + Sync {
    /// Gate a CONNECT. An error yields CONNACK `BadUserNameOrPassword` when
    /// a username was offered, `NotAuthorized` otherwise, and the socket
    /// closes.
    fn connect(
        &self,
        conn: &ConnectionContext,
        username: &str,
        password: &str,
    ) -> Result<(), HandlerError> {
        let _ = (conn, username, password);
        Ok(())
    }

    /// Notification only; fires on every transition to the closed state.
    fn disconnect(&self, conn: &ConnectionContext) {
        let _ = conn;
    }

    /// Consulted before a message is routed. An error vetoes routing and the
    /// message is dropped silently. `conn` is `None` for messages injected
    /// by the host (for example through the HTTP bridge).
    fn publish(
        &self,
        conn: Option<&ConnectionContext>,
        message: &Message,
    ) -> Result<(), HandlerError> {
        let _ = (conn, message);
        Ok(())
    }

    /// Consulted before a subscription is inserted. An error vetoes the
    /// subscription and the requesting connection closes.
    fn subscribe(
        &self,
        conn: &ConnectionContext,
        filter: &str,
        qos: QoS,
    ) -> Result<(), HandlerError> {
        let _ = (conn, filter, qos);
        Ok(())
    }
}

/// Handler that accepts everything and does nothing. Useful for tests and
/// for hosts that only want an open broker.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl Handler for AcceptAll {}
