//! WebSocket transport
//!
//! Each socket gets two tasks: the reader feeds frames to the relay in order,
//! the writer drains the connection's outbox and sends keepalive pings.

use std::future::Future;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::protocol::Signal;
use crate::registry::RegistryStats;
use crate::relay::Relay;

/// Timer period used when pings are off; the tick branch is disabled anyway.
const IDLE_TICK: Duration = Duration::from_secs(3600);

#[derive(Clone)]
struct AppState {
    relay: Relay,
    ping_interval: Option<Duration>,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    #[serde(flatten)]
    stats: RegistryStats,
}

/// Build the HTTP/WebSocket routes around a relay.
pub fn router(relay: Relay, config: &Config) -> Router {
    let state = AppState {
        relay,
        ping_interval: config.ping_interval,
    };

    let mut app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health));
    if config.info_page {
        app = app.route("/", get(info_page));
    }
    app.with_state(state)
}

/// Bind `config.bind_addr` and serve until `shutdown` resolves.
pub async fn serve(config: Config, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    serve_on(listener, Relay::new(), &config, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve_on(
    listener: TcpListener,
    relay: Relay,
    config: &Config,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "Signaling relay listening");

    axum::serve(listener, router(relay, config))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Signaling relay stopped");
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        stats: state.relay.registry().stats().await,
    })
}

async fn info_page() -> Html<&'static str> {
    Html(INFO_PAGE)
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Signal>();

    let id = match state.relay.accept(tx).await {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "Failed to register connection");
            return;
        }
    };

    // Writer: outbox -> socket, plus keepalive
    let ping_interval = state.ping_interval;
    let send_task = tokio::spawn(async move {
        let period = ping_interval.unwrap_or(IDLE_TICK);
        let mut ping = time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                outbound = rx.recv() => {
                    let Some(signal) = outbound else { break };
                    let text = match signal.encode() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(conn = %id, error = %e, "Failed to encode outbound message");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick(), if ping_interval.is_some() => {
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(conn = %id, "Writer finished");
    });

    // Reader: socket -> relay, in arrival order
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => state.relay.handle_text(id, text.as_str()).await,
            Ok(Message::Binary(_)) => debug!(conn = %id, "Ignoring binary frame"),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(conn = %id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    state.relay.disconnect(id).await;
    send_task.abort();
}

const INFO_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>phonecam signaling relay</title>
<style>
  body { font-family: sans-serif; max-width: 46rem; margin: 2rem auto; line-height: 1.5; }
  code, pre { background: #f3f3f3; padding: 0 .25rem; }
  table { border-collapse: collapse; }
  td, th { border: 1px solid #ccc; padding: .25rem .5rem; text-align: left; }
</style>
</head>
<body>
<h1>phonecam signaling relay</h1>
<p>
  This service pairs a <b>phone</b> (camera) with a <b>viewer</b> and passes their
  WebRTC handshake between them. Media never goes through here.
</p>
<p>Connect a WebSocket to <code>/ws</code> and exchange JSON text frames:</p>
<table>
  <tr><th>type</th><th>direction</th><th>fields</th></tr>
  <tr><td><code>register</code></td><td>client &rarr; relay</td><td><code>role</code>: <code>"phone"</code> or <code>"viewer"</code></td></tr>
  <tr><td><code>phone-ready</code></td><td>relay &rarr; viewer</td><td></td></tr>
  <tr><td><code>viewer-ready</code></td><td>relay &rarr; phone</td><td></td></tr>
  <tr><td><code>offer</code></td><td>phone &rarr; viewer</td><td><code>sdp</code>, <code>from</code> (added)</td></tr>
  <tr><td><code>answer</code></td><td>viewer &rarr; phone</td><td><code>sdp</code>, <code>from</code> (added)</td></tr>
  <tr><td><code>ice-candidate</code></td><td>either &rarr; peer</td><td><code>candidate</code>, <code>from</code> (added)</td></tr>
  <tr><td><code>peer-disconnected</code></td><td>relay &rarr; client</td><td></td></tr>
</table>
<h2>Typical session</h2>
<pre>
phone  -> {"type":"register","role":"phone"}
viewer -> {"type":"register","role":"viewer"}
phone  -> {"type":"offer","sdp":{...}}
viewer -> {"type":"answer","sdp":{...}}
both   -> {"type":"ice-candidate","candidate":{...}}
</pre>
<p>Current load: <a href="/health">/health</a></p>
</body>
</html>
"#;
