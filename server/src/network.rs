//! Server network layer handling WebSocket sessions and the dispatch loop

use crate::client_manager::Outgoing;
use crate::relay::{Relay, RelayConfig};
use crate::status;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{Method, Uri};
use axum::response::Response;
use axum::routing::get;
use axum::{Error as WsError, Router};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

/// Events sent from connection tasks to the dispatch loop
#[derive(Debug)]
pub enum NetworkEvent {
    NewConnection {
        client_id: u32,
        addr: SocketAddr,
        sender: mpsc::Sender<Outgoing>,
    },
    Frame {
        client_id: u32,
        text: String,
    },
    ClientError {
        client_id: u32,
        error: String,
    },
    ClientDisconnect {
        client_id: u32,
    },
    StatusRequest {
        reply: oneshot::Sender<usize>,
    },
}

/// Main server: serves HTTP and WebSocket on one listener and feeds every
/// session's events through one dispatch loop that owns the relay.
pub struct Server {
    listener: TcpListener,
    relay: Relay,
    config: RelayConfig,

    event_tx: mpsc::Sender<NetworkEvent>,
    event_rx: mpsc::Receiver<NetworkEvent>,
}

impl Server {
    pub async fn new(addr: &str, config: RelayConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (event_tx, event_rx) = mpsc::channel(config.event_queue.max(1));

        Ok(Server {
            listener,
            relay: Relay::new(&config),
            config,
            event_tx,
            event_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves connections and runs the dispatch loop until the HTTP server
    /// stops or the process is interrupted.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let Server {
            listener,
            mut relay,
            config,
            event_tx,
            mut event_rx,
        } = self;

        let app = router(event_tx, config);
        let mut serve = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
        });
        info!("Server started successfully");

        let result = loop {
            tokio::select! {
                Some(event) = event_rx.recv() => dispatch(&mut relay, event),
                result = &mut serve => break result,
            }
        };

        info!(
            "Server shutting down with {} players and {} chat lines",
            relay.registry().len(),
            relay.chat_log().len()
        );
        result??;
        Ok(())
    }
}

#[derive(Clone)]
struct AppState {
    event_tx: mpsc::Sender<NetworkEvent>,
    next_client_id: Arc<AtomicU32>,
    config: RelayConfig,
}

/// Routes for the relay port: WebSocket upgrades on any path, the status
/// page on `GET /`, and a 404 for everything else.
pub fn router(event_tx: mpsc::Sender<NetworkEvent>, config: RelayConfig) -> Router {
    let state = AppState {
        event_tx,
        next_client_id: Arc::new(AtomicU32::new(1)),
        config,
    };

    Router::new()
        .route("/", get(root).fallback(fallback))
        .fallback(fallback)
        .with_state(state)
}

async fn root(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(ws) => upgrade(ws, addr, state),
        None => status::status_page(&state.event_tx).await,
    }
}

async fn fallback(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(ws) => upgrade(ws, addr, state),
        None => status::not_found(&method, &uri),
    }
}

fn upgrade(ws: WebSocketUpgrade, addr: SocketAddr, state: AppState) -> Response {
    let client_id = state.next_client_id.fetch_add(1, Ordering::Relaxed);

    ws.on_failed_upgrade(move |e| warn!("WebSocket handshake with {} failed: {}", addr, e))
        .on_upgrade(move |socket| {
            handle_socket(socket, addr, client_id, state.event_tx, state.config)
        })
}

async fn handle_socket(
    socket: WebSocket,
    addr: SocketAddr,
    client_id: u32,
    event_tx: mpsc::Sender<NetworkEvent>,
    config: RelayConfig,
) {
    let (sink, stream) = socket.split();
    let (sender, receiver) = mpsc::channel(config.send_queue);

    if event_tx
        .send(NetworkEvent::NewConnection {
            client_id,
            addr,
            sender,
        })
        .await
        .is_err()
    {
        error!("Dispatch loop gone, dropping client {}", client_id);
        return;
    }

    // Whichever half finishes first ends the session.
    tokio::select! {
        _ = write_frames(sink, receiver, client_id, config.send_timeout) => {},
        _ = read_frames(stream, client_id, &event_tx) => {},
    }

    let _ = event_tx
        .send(NetworkEvent::ClientDisconnect { client_id })
        .await;
}

/// Applies one network event to the relay. All shared-state mutation goes
/// through here, one event at a time.
pub fn dispatch(relay: &mut Relay, event: NetworkEvent) {
    match event {
        NetworkEvent::NewConnection {
            client_id,
            addr,
            sender,
        } => {
            relay.on_connect(client_id, addr, sender);
        }
        NetworkEvent::Frame { client_id, text } => {
            relay.on_message(client_id, &text);
        }
        NetworkEvent::ClientError { client_id, error } => {
            relay.on_error(client_id, &error);
        }
        NetworkEvent::ClientDisconnect { client_id } => {
            relay.on_close(client_id);
        }
        NetworkEvent::StatusRequest { reply } => {
            let _ = reply.send(relay.player_count());
        }
    }
}

/// Drains a session's queue onto the socket. Each write is bounded by
/// `send_timeout`; a slow or failed write ends the session.
async fn write_frames<S>(
    mut sink: S,
    mut receiver: mpsc::Receiver<Outgoing>,
    client_id: u32,
    send_timeout: Duration,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(frame) = receiver.recv().await {
        match timeout(send_timeout, sink.send(Message::Text(frame.to_string()))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Failed to send to client {}: {}", client_id, e);
                return;
            }
            Err(_) => {
                warn!(
                    "Send to client {} timed out after {:?}",
                    client_id, send_timeout
                );
                return;
            }
        }
    }

    // Queue dropped by the relay: the session was refused.
    let _ = timeout(send_timeout, sink.close()).await;
}

/// Forwards inbound text frames to the dispatch loop until the peer closes.
/// Waits whenever the event queue is full, so a flooding peer is throttled
/// at its own socket.
async fn read_frames<S>(
    mut stream: S,
    client_id: u32,
    event_tx: &mpsc::Sender<NetworkEvent>,
) where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(result) = stream.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => {
                    warn!("Dropping non UTF-8 frame from client {}", client_id);
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("Read from client {} failed: {}", client_id, e);
                let _ = event_tx
                    .send(NetworkEvent::ClientError {
                        client_id,
                        error: e.to_string(),
                    })
                    .await;
                break;
            }
        };

        if event_tx
            .send(NetworkEvent::Frame { client_id, text })
            .await
            .is_err()
        {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{sink, stream};
    use serde_json::Value;
    use std::io;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    #[test]
    fn test_dispatch_new_connection_sends_init() {
        let mut relay = Relay::new(&RelayConfig::default());
        let (sender, mut receiver) = mpsc::channel(8);

        dispatch(
            &mut relay,
            NetworkEvent::NewConnection {
                client_id: 1,
                addr: test_addr(),
                sender,
            },
        );

        let frame = receiver.try_recv().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "init");
        assert_eq!(relay.client_count(), 1);
    }

    #[test]
    fn test_dispatch_frame_and_disconnect() {
        let mut relay = Relay::new(&RelayConfig::default());
        let (sender, _receiver) = mpsc::channel(8);

        dispatch(
            &mut relay,
            NetworkEvent::NewConnection {
                client_id: 1,
                addr: test_addr(),
                sender,
            },
        );
        dispatch(
            &mut relay,
            NetworkEvent::Frame {
                client_id: 1,
                text: r#"{"type":"join","id":"p1","player":{}}"#.to_string(),
            },
        );
        assert_eq!(relay.player_count(), 1);

        dispatch(
            &mut relay,
            NetworkEvent::ClientError {
                client_id: 1,
                error: "reset".to_string(),
            },
        );
        assert_eq!(relay.client_count(), 1);

        dispatch(&mut relay, NetworkEvent::ClientDisconnect { client_id: 1 });
        assert_eq!(relay.player_count(), 0);
        assert_eq!(relay.client_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_status_request() {
        let mut relay = Relay::new(&RelayConfig::default());
        let (reply, reply_rx) = oneshot::channel();

        dispatch(&mut relay, NetworkEvent::StatusRequest { reply });

        assert_eq!(reply_rx.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_frames_forwards_text_and_stops_at_close() {
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let frames = stream::iter(vec![
            Ok(Message::Text("first".to_string())),
            Ok(Message::Ping(vec![1])),
            Ok(Message::Binary(b"second".to_vec())),
            Ok(Message::Binary(vec![0xff, 0xfe])),
            Ok(Message::Close(None)),
            Ok(Message::Text("after close".to_string())),
        ]);

        read_frames(frames, 4, &event_tx).await;

        let mut texts = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            match event {
                NetworkEvent::Frame { client_id, text } => {
                    assert_eq!(client_id, 4);
                    texts.push(text);
                }
                other => panic!("Unexpected event: {:?}", other),
            }
        }
        assert_eq!(texts, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn test_read_frames_reports_transport_error() {
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let frames = stream::iter(vec![Err(WsError::new(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset",
        )))]);

        read_frames(frames, 9, &event_tx).await;

        match event_rx.try_recv() {
            Ok(NetworkEvent::ClientError { client_id, .. }) => assert_eq!(client_id, 9),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_frames_waits_on_full_event_queue() {
        let (event_tx, mut event_rx) = mpsc::channel(1);
        let frames = stream::iter(
            (0..3)
                .map(|n| Ok::<_, WsError>(Message::Text(format!("frame {}", n))))
                .collect::<Vec<_>>(),
        );
        let mut reader = Box::pin(read_frames(frames, 2, &event_tx));

        // Only one event fits; the reader parks instead of buffering the rest.
        assert!(timeout(Duration::from_millis(50), &mut reader).await.is_err());
        assert!(matches!(event_rx.try_recv(), Ok(NetworkEvent::Frame { .. })));
        assert!(event_rx.try_recv().is_err());

        let drain = async {
            let mut texts = Vec::new();
            while texts.len() < 2 {
                if let Some(NetworkEvent::Frame { text, .. }) = event_rx.recv().await {
                    texts.push(text);
                }
            }
            texts
        };
        let ((), texts) = tokio::join!(reader, drain);
        assert_eq!(texts, vec!["frame 1".to_string(), "frame 2".to_string()]);
    }

    #[tokio::test]
    async fn test_write_frames_drains_queue_in_order() {
        let (written_tx, mut written_rx) = mpsc::unbounded_channel();
        let sink = Box::pin(sink::unfold(
            written_tx,
            |written_tx, message: Message| async move {
                let _ = written_tx.send(message);
                Ok::<_, WsError>(written_tx)
            },
        ));
        let (sender, receiver) = mpsc::channel::<Outgoing>(4);

        tokio_test::assert_ok!(sender.try_send(Outgoing::from("a")));
        tokio_test::assert_ok!(sender.try_send(Outgoing::from("b")));
        drop(sender);

        write_frames(sink, receiver, 1, Duration::from_secs(1)).await;

        assert_eq!(written_rx.try_recv().ok(), Some(Message::Text("a".to_string())));
        assert_eq!(written_rx.try_recv().ok(), Some(Message::Text("b".to_string())));
        assert!(written_rx.try_recv().is_err());
    }
}
