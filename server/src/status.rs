//! Plain-HTTP status page sharing the relay's port
//!
//! Requests that are not WebSocket upgrades land here. `GET /` reports how
//! many players are currently registered; anything else is a 404. The count
//! is asked of the dispatch loop, so it always matches the registry.

use crate::network::NetworkEvent;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use log::warn;
use tokio::sync::{mpsc, oneshot};

pub fn status_body(players: usize) -> String {
    format!("Game server is running! Players online: {}", players)
}

pub fn not_found_body(method: &Method, uri: &Uri) -> String {
    format!("Cannot {} {}", method, uri.path())
}

/// Asks the dispatch loop for the current player count. None once the loop
/// has stopped.
pub async fn player_count(event_tx: &mpsc::Sender<NetworkEvent>) -> Option<usize> {
    let (reply, reply_rx) = oneshot::channel();
    event_tx
        .send(NetworkEvent::StatusRequest { reply })
        .await
        .ok()?;
    reply_rx.await.ok()
}

pub async fn status_page(event_tx: &mpsc::Sender<NetworkEvent>) -> Response {
    match player_count(event_tx).await {
        Some(players) => status_body(players).into_response(),
        None => {
            warn!("Status requested after the dispatch loop stopped");
            (StatusCode::SERVICE_UNAVAILABLE, "Game server is shutting down").into_response()
        }
    }
}

pub fn not_found(method: &Method, uri: &Uri) -> Response {
    (StatusCode::NOT_FOUND, not_found_body(method, uri)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_body() {
        assert_eq!(status_body(3), "Game server is running! Players online: 3");
    }

    #[test]
    fn test_not_found_body_drops_query() {
        let uri: Uri = "/nope?debug=1".parse().unwrap();
        assert_eq!(not_found_body(&Method::POST, &uri), "Cannot POST /nope");
    }

    #[tokio::test]
    async fn test_player_count_asks_dispatch_loop() {
        let (event_tx, mut event_rx) = mpsc::channel(4);
        let dispatcher = tokio::spawn(async move {
            if let Some(NetworkEvent::StatusRequest { reply }) = event_rx.recv().await {
                let _ = reply.send(7);
            }
        });

        assert_eq!(player_count(&event_tx).await, Some(7));
        tokio_test::assert_ok!(dispatcher.await);
    }

    #[tokio::test]
    async fn test_player_count_without_dispatch_loop() {
        let (event_tx, event_rx) = mpsc::channel(4);
        drop(event_rx);

        assert_eq!(player_count(&event_tx).await, None);

        let response = status_page(&event_tx).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_not_found_status() {
        let uri: Uri = "/missing".parse().unwrap();
        assert_eq!(not_found(&Method::GET, &uri).status(), StatusCode::NOT_FOUND);
    }
}
