use std::time::Duration;

use flume::Sender;
use futures::StreamExt;
use tokio::{net::TcpStream, time::sleep};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

use crate::error::TransportError;
use crate::overlay::event::{decode_message, GameEvent};

pub const DEFAULT_URL: &str = "ws://127.0.0.1:8088/wss";
pub const DEFAULT_RETRY: Duration = Duration::from_secs(3);

/// Connects to an event server's WebSocket and forwards every decoded event
/// to `sender`.
///
/// Each text frame carries one JSON message. A refused connection, a closed
/// socket or a read error all drop the socket and reconnect after `retry`.
/// Returns once nobody is listening on `sender`.
pub async fn relay_events(url: String, retry: Duration, sender: Sender<GameEvent>) {
    loop {
        let outcome = match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                info!("connected to event server {}", url);
                forward(socket, &sender).await
            }
            Err(error) => Err(TransportError::Disconnected(error)),
        };

        match outcome {
            Ok(()) => warn!("event server {} closed the connection", url),
            Err(TransportError::ReceiverGone) => {
                info!("overlay stopped listening, closing event transport");
                return;
            }
            Err(error) => warn!("{} ({})", error, url),
        }

        if sender.is_disconnected() {
            return;
        }

        debug!("reconnecting to {} in {:?}", url, retry);
        sleep(retry).await;
    }
}

async fn forward(
    mut socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    sender: &Sender<GameEvent>,
) -> Result<(), TransportError> {
    while let Some(message) = socket.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            other => {
                trace!("skipping non-text frame {:?}", other);
                continue;
            }
        };

        if text.trim().is_empty() {
            continue;
        }

        let events = match decode_message(&text) {
            Ok(events) => events,
            Err(error) => {
                warn!("ignoring event message {:?}: {}", text, error);
                continue;
            }
        };

        for event in events {
            sender
                .send_async(event)
                .await
                .map_err(|_| TransportError::ReceiverGone)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::event::Level;
    use flume::unbounded;
    use futures::SinkExt;
    use tokio::{net::TcpListener, time::timeout};
    use tokio_tungstenite::accept_async;

    async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (stream, _) = timeout(Duration::from_secs(2), listener.accept())
            .await
            .expect("relay connects")
            .unwrap();

        accept_async(stream).await.unwrap()
    }

    async fn send_all(socket: &mut WebSocketStream<TcpStream>, messages: &[&str]) {
        for message in messages {
            socket.send(Message::Text(message.to_string())).await.unwrap();
        }
    }

    #[tokio::test]
    async fn forwards_events_and_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/wss", listener.local_addr().unwrap());
        let (sender, receiver) = unbounded();

        let relay = tokio::spawn(relay_events(url, Duration::from_millis(50), sender));

        let mut first = accept(&listener).await;
        send_all(
            &mut first,
            &[
                r#"{"type":"level","level":{"code":"A"}}"#,
                "not json",
                r#"{"type":"bogus"}"#,
                "",
                r#"{"type":"death"}"#,
            ],
        )
        .await;
        first.close(None).await.unwrap();
        drop(first);

        let mut second = accept(&listener).await;
        send_all(&mut second, &[r#"{"type":"clear"}"#]).await;

        let mut received = Vec::new();
        for _ in 0..3 {
            let event = timeout(Duration::from_secs(2), receiver.recv_async())
                .await
                .unwrap()
                .unwrap();
            received.push(event);
        }

        assert_eq!(
            received,
            vec![
                GameEvent::LevelLoaded(Level::new("A", "", "")),
                GameEvent::Death,
                GameEvent::Clear,
            ]
        );

        relay.abort();
    }

    #[tokio::test]
    async fn stops_when_receiver_is_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/wss", listener.local_addr().unwrap());
        let (sender, receiver) = unbounded();
        drop(receiver);

        let relay = tokio::spawn(relay_events(url, Duration::from_millis(50), sender));

        let mut socket = accept(&listener).await;
        send_all(&mut socket, &[r#"{"type":"death"}"#]).await;

        timeout(Duration::from_secs(2), relay)
            .await
            .expect("relay returns")
            .unwrap();
    }
}
