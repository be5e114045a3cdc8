//! Messaging channel transports
//!
//! A transport opens a [`ChannelLink`]: a frame queue out and a frame queue
//! in. The inbound queue closing means the connection dropped.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::rooms::RoomService;
use crate::ws::protocol::{ClientFrame, ServerFrame};
use crate::ws::session;

/// Per-link queue depth in each direction
pub const LINK_QUEUE: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("messaging channel disconnected")]
    Disconnected,

    #[error("outbound queue full")]
    ChannelBusy,

    #[error("failed to encode payload: {0}")]
    Codec(#[from] serde_json::Error),
}

/// An open connection
pub struct ChannelLink {
    pub outbound: mpsc::Sender<ClientFrame>,
    pub inbound: mpsc::Receiver<ServerFrame>,
}

#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn open(&self) -> Result<ChannelLink, ChannelError>;
}

/// WebSocket transport
pub struct WsChannel {
    url: String,
}

impl WsChannel {
    /// `url` is the full socket URL including the `userId` query
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl MessageChannel for WsChannel {
    async fn open(&self) -> Result<ChannelLink, ChannelError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<ClientFrame>(LINK_QUEUE);
        let (in_tx, in_rx) = mpsc::channel::<ServerFrame>(LINK_QUEUE);

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode client frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json)).await {
                    debug!(error = %e, "Socket send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(result) = source.next().await {
                match result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(frame) => {
                            if in_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "Failed to parse server frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!(error = %e, "Socket read failed");
                        break;
                    }
                }
            }
        });

        Ok(ChannelLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// In-process transport running a server session directly
pub struct LocalChannel {
    rooms: Arc<RoomService>,
    user_id: String,
}

impl LocalChannel {
    pub fn new(rooms: Arc<RoomService>, user_id: impl Into<String>) -> Self {
        Self {
            rooms,
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl MessageChannel for LocalChannel {
    async fn open(&self) -> Result<ChannelLink, ChannelError> {
        let (out_tx, out_rx) = mpsc::channel::<ClientFrame>(LINK_QUEUE);
        let (in_tx, in_rx) = mpsc::channel::<ServerFrame>(LINK_QUEUE);
        tokio::spawn(session::serve(
            self.rooms.clone(),
            self.user_id.clone(),
            out_rx,
            in_tx,
        ));
        Ok(ChannelLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::RoomSettings;
    use crate::ws::broker::Broker;

    #[tokio::test]
    async fn local_link_greets_and_answers_ping() {
        let rooms = Arc::new(RoomService::new(Arc::new(Broker::new()), RoomSettings::default()));
        let mut link = LocalChannel::new(rooms, "GUEST_10000").open().await.unwrap();

        assert!(matches!(
            link.inbound.recv().await,
            Some(ServerFrame::Connected { .. })
        ));
        link.outbound.send(ClientFrame::Ping { t: 9 }).await.unwrap();
        assert_eq!(link.inbound.recv().await, Some(ServerFrame::Pong { t: 9 }));
    }

    #[tokio::test]
    async fn unreachable_socket_fails_to_connect() {
        let channel = WsChannel::new("ws://127.0.0.1:1/ws?userId=GUEST_10000");
        assert!(matches!(channel.open().await, Err(ChannelError::Connect(_))));
    }
}
