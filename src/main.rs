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

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use mqtt_hub_tokio::mqtt_hub::transport::accept_helper;
use mqtt_hub_tokio::mqtt_hub::{
    http_bridge, Broker, ConnectionContext, Handler, HandlerError, Message, QoS,
};

#[derive(Parser)]
#[command(name = "mqtt-hub")]
#[command(author, version, about = "MQTT v3.1 broker with an HTTP publish bridge")]
struct Args {
    /// TLS certificate file (.crt); together with --key enables the TLS and
    /// WSS listeners
    #[arg(long)]
    crt: Option<PathBuf>,

    /// TLS private key file (.key)
    #[arg(long)]
    key: Option<PathBuf>,

    /// MQTT over plain TCP
    #[arg(long, default_value = "0.0.0.0:1883")]
    tcp_addr: String,

    /// MQTT over TLS
    #[arg(long, default_value = "0.0.0.0:8883")]
    tls_addr: String,

    /// MQTT over WebSocket
    #[arg(long, default_value = "0.0.0.0:80")]
    ws_addr: String,

    /// MQTT over WebSocket on TLS
    #[arg(long, default_value = "0.0.0.0:443")]
    wss_addr: String,

    /// HTTP publish bridge
    #[arg(long, default_value = "0.0.0.0:8080")]
    http_addr: String,

    /// Log level
    #[arg(long, default_value = "info")]
    #[arg(value_parser = ["error", "warn", "info", "debug", "trace"])]
    log_level: String,
}

/// Host handler that logs client lifecycle events and accepts everything.
struct LogHandler;

impl Handler for LogHandler {
    fn connect(
        &self,
        conn: &ConnectionContext,
        username: &str,
        _password: &str,
    ) -> Result<(), HandlerError> {
        info!(client = %conn.client_id(), username, "client connected");
        Ok(())
    }

    fn disconnect(&self, conn: &ConnectionContext) {
        info!(client = %conn.client_id(), "client disconnected");
    }

    fn publish(
        &self,
        conn: Option<&ConnectionContext>,
        message: &Message,
    ) -> Result<(), HandlerError> {
        if let Some(conn) = conn {
            info!(
                client = %conn.client_id(),
                topic = %message.topic,
                len = message.payload.len(),
                "published"
            );
        }
        Ok(())
    }

    fn subscribe(
        &self,
        conn: &ConnectionContext,
        filter: &str,
        _qos: QoS,
    ) -> Result<(), HandlerError> {
        info!(client = %conn.client_id(), filter, "subscribed");
        Ok(())
    }
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("mqtt_hub_tokio={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let broker = Broker::new(Arc::new(LogHandler));
    let mut tasks = Vec::new();

    if let (Some(crt), Some(key)) = (&args.crt, &args.key) {
        let acceptor = accept_helper::load_tls_acceptor(crt, key)
            .map_err(|e| anyhow::anyhow!("failed to load TLS certificate/key: {e}"))?;

        let listener = TcpListener::bind(&args.tls_addr).await?;
        info!(addr = %args.tls_addr, "MQTT over TLS listening");
        tasks.push(tokio::spawn(accept_helper::accept_tls_loop(
            listener,
            acceptor.clone(),
            broker.clone(),
        )));

        let listener = TcpListener::bind(&args.wss_addr).await?;
        info!(addr = %args.wss_addr, "MQTT over WebSocket+TLS listening");
        tasks.push(tokio::spawn(accept_helper::accept_wss_loop(
            listener,
            acceptor,
            broker.clone(),
        )));
    }

    let listener = TcpListener::bind(&args.tcp_addr).await?;
    info!(addr = %args.tcp_addr, "MQTT over TCP listening");
    tasks.push(tokio::spawn(accept_helper::accept_tcp_loop(
        listener,
        broker.clone(),
    )));

    let listener = TcpListener::bind(&args.ws_addr).await?;
    info!(addr = %args.ws_addr, "MQTT over WebSocket listening");
    tasks.push(tokio::spawn(accept_helper::accept_ws_loop(
        listener,
        broker.clone(),
    )));

    let listener = TcpListener::bind(&args.http_addr).await?;
    info!(addr = %args.http_addr, "HTTP publish bridge listening");
    {
        let broker = broker.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = http_bridge::serve(listener, broker).await {
                error!("HTTP bridge exited: {e}");
            }
        }));
    }

    info!("broker ready");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    for task in &tasks {
        task.abort();
    }
    broker.close().await;

    Ok(())
}
