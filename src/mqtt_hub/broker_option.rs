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

use derive_builder::Builder;
use getset::CopyGetters;

/// Broker tuning options.
///
/// These apply to every connection the broker serves. Protocol behaviour is
/// not configurable here - limits like the maximum message length are part
/// of the wire contract.
///
/// # Usage
///
/// ```ignore
/// use mqtt_hub_tokio::mqtt_hub::BrokerOption;
///
/// let options = BrokerOption::builder()
///     .recv_buffer_size(16 * 1024usize)
///     .keep_alive_grace_percent(200u64)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Builder, CopyGetters)]
#[builder(derive(Debug), pattern = "owned", setter(into))]
pub struct BrokerOption {
    /// Size of the per-connection transport read buffer in bytes.
    ///
    /// # Default
    /// 4096
    #[builder(default = "4096")]
    #[getset(get_copy = "pub")]
    recv_buffer_size: usize,

    /// Keep-alive timeout as a percentage of the client's negotiated
    /// keep-alive period. The protocol allows half a period of slack, hence
    /// the 150% default; connections with a zero keep-alive are never timed
    /// out.
    ///
    /// # Default
    /// 150
    #[builder(default = "150")]
    #[getset(get_copy = "pub")]
    keep_alive_grace_percent: u64,

    /// Maximum time to wait for a graceful transport shutdown before the
    /// stream is dropped, in milliseconds.
    ///
    /// # Default
    /// 5000
    #[builder(default = "5000")]
    #[getset(get_copy = "pub")]
    shutdown_timeout_ms: u64,
}

impl BrokerOption {
    /// Create a builder preloaded with the defaults.
    pub fn builder() -> BrokerOptionBuilder {
        BrokerOptionBuilder::default()
    }
}

impl Default for BrokerOption {
    fn default() -> Self {
        BrokerOptionBuilder::default()
            .build()
            .expect("all fields have defaults")
    }
}
