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

use std::collections::VecDeque;
use std::future::Future;
use std::io::IoSlice;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mqtt_hub_tokio::mqtt_hub::transport::{TransportError, TransportOps};

/// Call record for tracking method invocations
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Send { data: Vec<u8> },
    Recv { buffer_size: usize },
    Shutdown { timeout: Duration },
}

/// Response configuration for controlling stub behavior
#[derive(Debug)]
#[allow(dead_code)]
pub enum TransportResponse {
    SendOk,
    SendErr(TransportError),
    RecvOk(Vec<u8>),
    RecvErr(TransportError),
    /// Never resolves; stands in for a peer that goes quiet.
    RecvPending,
}

/// Stub transport implementation for testing
#[derive(Clone)]
pub struct StubTransport {
    /// Record of method calls made to this transport
    pub calls: Arc<Mutex<Vec<TransportCall>>>,
    /// Queue of responses to return for method calls
    responses: Arc<Mutex<VecDeque<TransportResponse>>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Add a response to the queue
    pub fn add_response(&mut self, response: TransportResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    fn pop_response(&self) -> Option<TransportResponse> {
        self.responses.lock().unwrap().pop_front()
    }
}

impl Default for StubTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportOps for StubTransport {
    fn send<'a>(
        &'a mut self,
        buffers: &'a [IoSlice<'a>],
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let mut data = Vec::new();
            for buffer in buffers {
                data.extend_from_slice(buffer);
            }
            self.calls
                .lock()
                .unwrap()
                .push(TransportCall::Send { data });

            match self.pop_response() {
                Some(TransportResponse::SendOk) | None => Ok(()),
                Some(TransportResponse::SendErr(e)) => Err(e),
                Some(other) => panic!("unexpected response for send: {other:?}"),
            }
        })
    }

    fn recv<'a>(
        &'a mut self,
        buffer: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(TransportCall::Recv {
                buffer_size: buffer.len(),
            });

            match self.pop_response() {
                Some(TransportResponse::RecvOk(data)) => {
                    assert!(data.len() <= buffer.len(), "stub data exceeds recv buffer");
                    buffer[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(TransportResponse::RecvErr(e)) => Err(e),
                Some(TransportResponse::RecvPending) => std::future::pending().await,
                None => Err(TransportError::NotConnected),
                Some(other) => panic!("unexpected response for recv: {other:?}"),
            }
        })
    }

    fn shutdown<'a>(
        &'a mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push(TransportCall::Shutdown { timeout });
        })
    }
}
