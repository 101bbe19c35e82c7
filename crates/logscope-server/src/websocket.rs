//! WebSocket transport for the broadcast hub.
//!
//! Each connection registers a [`ChannelSink`] with the hub. Frames the hub
//! delivers are queued on an unbounded channel and a writer task forwards
//! them to the socket, so a slow client never blocks ingestion.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use logscope_core::{BroadcastHub, Deliverable, DeliveryError, SubscriberId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Hub sink that queues frames for a connection's writer task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    /// Creates a sink and the receiver its writer task drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Deliverable for ChannelSink {
    fn send(&self, frame: &str) -> Result<(), DeliveryError> {
        self.tx
            .send(frame.to_string())
            .map_err(|_| DeliveryError::Closed)
    }
}

/// Handle WebSocket upgrade request for /ws.
pub async fn ws_upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    let hub = Arc::clone(state.service().hub());
    ws.on_upgrade(move |socket| handle_ws_connection(socket, hub))
}

/// Handle an active WebSocket connection.
async fn handle_ws_connection(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let (mut sender, mut receiver) = socket.split();
    let (sink, frames) = ChannelSink::channel();
    let id = hub.on_connect(Arc::new(sink));
    info!(subscriber_id = %id, "WebSocket client connected");

    let mut send_task = tokio::spawn(async move {
        forward_frames(&mut sender, frames).await;
    });

    let recv_hub = Arc::clone(&hub);
    let mut recv_task = tokio::spawn(async move {
        handle_incoming_messages(&mut receiver, &recv_hub, id).await;
    });

    tokio::select! {
        _ = &mut send_task => {
            debug!(subscriber_id = %id, "WebSocket send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            debug!(subscriber_id = %id, "WebSocket receive task completed");
            send_task.abort();
        }
    }

    hub.on_disconnect(id);
    info!(subscriber_id = %id, "WebSocket connection closed");
}

/// Forward queued frames to the WebSocket until either side closes.
async fn forward_frames(
    sender: &mut SplitSink<WebSocket, Message>,
    mut frames: mpsc::UnboundedReceiver<String>,
) {
    while let Some(frame) = frames.recv().await {
        if sender.send(Message::Text(frame.into())).await.is_err() {
            break;
        }
    }
}

/// Route client frames to the hub.
async fn handle_incoming_messages(
    receiver: &mut SplitStream<WebSocket>,
    hub: &BroadcastHub,
    id: SubscriberId,
) {
    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => hub.on_message(id, text.as_str()),
            Ok(Message::Close(_)) => {
                debug!(subscriber_id = %id, "Received close frame");
                break;
            }
            Ok(Message::Binary(_)) => {
                debug!(subscriber_id = %id, "Received binary message (ignored)");
            }
            // Pong replies are handled by axum
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                warn!(subscriber_id = %id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use logscope_core::{IncomingLog, IncomingSource, LogLevel, Runtime};
    use serde_json::Value;
    use tempfile::TempDir;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;

    use crate::config::ServerConfig;
    use crate::routes::create_router;
    use crate::server::build_service;

    #[test]
    fn channel_sink_queues_frames() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.send("hello").expect("send");
        assert_eq!(rx.try_recv().expect("queued"), "hello");
    }

    #[test]
    fn channel_sink_reports_closed() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        assert!(matches!(sink.send("x"), Err(DeliveryError::Closed)));
    }

    async fn next_json<S>(stream: &mut S) -> Value
    where
        S: futures::Stream<Item = Result<ClientMessage, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .expect("frame before timeout")
                .expect("stream open")
                .expect("frame");
            if let ClientMessage::Text(text) = msg {
                return serde_json::from_str(text.as_str()).expect("json frame");
            }
        }
    }

    fn incoming(level: LogLevel, subject: &str) -> IncomingLog {
        IncomingLog {
            timestamp: "2024-05-01T12:00:00Z".to_string(),
            level,
            subject: subject.to_string(),
            message: None,
            data: None,
            source: IncomingSource {
                function: None,
                file: None,
                process: None,
                runtime: Runtime::Backend,
                service_name: None,
            },
            correlation: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn live_stream_honours_subscription() {
        let dir = TempDir::new().expect("temp dir");
        let config = ServerConfig::default().with_log_dir(dir.path());
        let service = build_service(&config);
        service.bootstrap().expect("bootstrap");
        let state = Arc::new(AppState::new(config, Arc::clone(&service)));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr: SocketAddr = listener.local_addr().expect("addr");
        let app = create_router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .expect("connect");

        let connected = next_json(&mut ws).await;
        assert_eq!(connected["type"], "connected");
        assert!(
            connected["data"]["clientId"]
                .as_str()
                .is_some_and(|id| id.starts_with("client-"))
        );

        ws.send(ClientMessage::Text(
            r#"{"type":"subscribe","filters":{"level":"error"}}"#.into(),
        ))
        .await
        .expect("subscribe");
        let subscribed = next_json(&mut ws).await;
        assert_eq!(subscribed["type"], "subscribed");
        assert_eq!(subscribed["data"]["filters"]["level"], "error");

        service.ingest(incoming(LogLevel::Info, "quiet")).expect("ingest");
        service.ingest(incoming(LogLevel::Error, "loud")).expect("ingest");

        let log = next_json(&mut ws).await;
        assert_eq!(log["type"], "log");
        assert_eq!(log["data"]["subject"], "loud");

        ws.close(None).await.expect("close");
        for _ in 0..50 {
            if service.hub().active_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(service.hub().active_count(), 0);
    }
}
