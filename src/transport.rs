//! WebSocket transport backed by `tokio-tungstenite`.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::connection::{Connector, Link, Outgoing, SocketEvent};

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, address: &str) -> Link {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(address.to_string(), out_rx, ev_tx));
        Link {
            outgoing: out_tx,
            events: ev_rx,
        }
    }
}

/// Drive one socket until either side closes it. Always finishes with
/// `SocketEvent::Closed`.
async fn pump(
    address: String,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    let stream = match connect_async(address.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            let _ = events.send(SocketEvent::Error(format!("connect {}: {}", address, e)));
            let _ = events.send(SocketEvent::Closed);
            return;
        }
    };
    let _ = events.send(SocketEvent::Open);

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(SocketEvent::Message(text));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("Peer closed {}: {:?}", address, frame);
                    break;
                }
                // Binary frames carry nothing we understand; pings are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(SocketEvent::Error(e.to_string()));
                    break;
                }
                None => break,
            },
            out = outgoing.recv() => match out {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        let _ = events.send(SocketEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }

    debug!("Socket {} finished", address);
    let _ = events.send(SocketEvent::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn drain_until_closed(link: &mut Link) -> Vec<SocketEvent> {
        let mut seen = Vec::new();
        while let Some(event) = link.events.recv().await {
            let done = event == SocketEvent::Closed;
            seen.push(event);
            if done {
                break;
            }
        }
        seen
    }

    #[tokio::test]
    async fn relays_frames_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"type":"ping","data":{}}"#.to_string()))
                .await
                .unwrap();
            ws.next().await.unwrap().unwrap()
        });

        let mut link = WsConnector.open(&format!("ws://{}", addr));
        assert_eq!(link.events.recv().await, Some(SocketEvent::Open));
        assert_eq!(
            link.events.recv().await,
            Some(SocketEvent::Message(r#"{"type":"ping","data":{}}"#.to_string()))
        );

        link.outgoing.send(Outgoing::Text("hello".to_string())).unwrap();
        assert_eq!(server.await.unwrap(), Message::Text("hello".to_string()));

        // The server dropped its end; the pump reports the close.
        let tail = drain_until_closed(&mut link).await;
        assert_eq!(tail.last(), Some(&SocketEvent::Closed));
    }

    #[tokio::test]
    async fn refused_connection_reports_error_then_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut link = WsConnector.open(&format!("ws://{}", addr));
        let events = drain_until_closed(&mut link).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SocketEvent::Error(_)));
        assert_eq!(events[1], SocketEvent::Closed);
    }
}
