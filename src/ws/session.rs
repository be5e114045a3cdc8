//! Per-connection messaging session
//!
//! Transport-agnostic: frames arrive on an mpsc receiver and leave on an mpsc
//! sender, so the WebSocket bridge and in-process clients share one loop.
//! Frames are handled strictly in arrival order. Each subscription owns a
//! forwarder task that copies broker messages into the outbound queue.
//! Room-scoped destinations are open to room members only.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::game::{GridError, RemovalError};
use crate::rooms::{RoomError, RoomService, StartError};
use crate::util::rate_limit::FrameRateLimiter;
use crate::util::time::now_millis;

use super::broker::TopicReceiver;
use super::protocol::{
    CellRemoval, ClientFrame, CreateRoomRequest, Destination, JoinRoomRequest, PlayerUpdate,
    RoomId, ServerFrame, Topic,
};

/// Why a client frame could not be handled
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error("removal rejected: {0}")]
    Removal(#[from] RemovalError),

    #[error("board generation failed: {0}")]
    Generation(#[from] GridError),

    #[error("too many frames")]
    RateLimited,
}

impl From<StartError> for FrameError {
    fn from(e: StartError) -> Self {
        match e {
            StartError::Room(e) => Self::Room(e),
            StartError::Generation(e) => Self::Generation(e),
        }
    }
}

impl FrameError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownTopic(_) => "unknown_topic",
            Self::UnknownDestination(_) => "unknown_destination",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Room(e) => e.code(),
            Self::Removal(_) => "removal_rejected",
            Self::Generation(_) => "generation_failed",
            Self::RateLimited => "rate_limited",
        }
    }

    pub fn to_frame(&self) -> ServerFrame {
        ServerFrame::Error {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

struct Subscription {
    topic: Topic,
    forwarder: JoinHandle<()>,
}

/// A topic message addressed to this connection alone
struct Reply {
    topic: Topic,
    body: Value,
}

impl Reply {
    fn new<T: Serialize>(topic: Topic, body: &T) -> Result<Self, FrameError> {
        Ok(Self {
            topic,
            body: serde_json::to_value(body)?,
        })
    }
}

/// Run one connection until the inbound side closes
pub async fn serve(
    rooms: Arc<RoomService>,
    user_id: String,
    mut inbound: mpsc::Receiver<ClientFrame>,
    outbound: mpsc::Sender<ServerFrame>,
) {
    let welcome = ServerFrame::Connected {
        server_time: now_millis(),
    };
    if outbound.send(welcome).await.is_err() {
        return;
    }

    let rate_limiter = FrameRateLimiter::new();
    let mut subscriptions: HashMap<String, Subscription> = HashMap::new();

    while let Some(frame) = inbound.recv().await {
        if !rate_limiter.check() {
            warn!(user_id = %user_id, "Rate limited inbound frame");
            if outbound.send(FrameError::RateLimited.to_frame()).await.is_err() {
                break;
            }
            continue;
        }

        let result = match frame {
            ClientFrame::Subscribe { id, topic } => match Topic::parse(&topic) {
                Some(parsed) => {
                    subscribe(&rooms, &mut subscriptions, id, parsed, &outbound).map(|()| Vec::new())
                }
                None => Err(FrameError::UnknownTopic(topic)),
            },
            ClientFrame::Unsubscribe { id } => {
                match subscriptions.remove(&id) {
                    Some(sub) => sub.forwarder.abort(),
                    None => debug!(user_id = %user_id, subscription = %id, "Unsubscribe for unknown id"),
                }
                Ok(Vec::new())
            }
            ClientFrame::Send { destination, body } => {
                dispatch(&rooms, &user_id, &destination, body)
            }
            ClientFrame::Ping { t } => {
                if outbound.send(ServerFrame::Pong { t }).await.is_err() {
                    break;
                }
                Ok(Vec::new())
            }
        };

        match result {
            Ok(replies) => {
                if !deliver(&subscriptions, replies, &outbound).await {
                    break;
                }
            }
            Err(e) => {
                debug!(user_id = %user_id, code = e.code(), error = %e, "Frame failed");
                if outbound.send(e.to_frame()).await.is_err() {
                    break;
                }
            }
        }
    }

    // Aborted forwarders drop their receivers, which prunes idle topics
    for (_, sub) in subscriptions.drain() {
        sub.forwarder.abort();
    }
    info!(user_id = %user_id, "Messaging session ended");
}

/// Start forwarding a topic under `id`. Room topics need a live room.
fn subscribe(
    rooms: &RoomService,
    subscriptions: &mut HashMap<String, Subscription>,
    id: String,
    topic: Topic,
    outbound: &mpsc::Sender<ServerFrame>,
) -> Result<(), FrameError> {
    if let Some(room_id) = topic.room_id() {
        if rooms.directory().get(room_id).is_none() {
            return Err(RoomError::NotFound(room_id).into());
        }
    }

    let rx = rooms.broker().subscribe(&topic);
    let forwarder = spawn_forwarder(id.clone(), topic, rx, outbound.clone());
    if let Some(previous) = subscriptions.insert(id.clone(), Subscription { topic, forwarder }) {
        debug!(subscription = %id, "Replacing subscription");
        previous.forwarder.abort();
    }
    Ok(())
}

/// Send direct replies on every subscription of this connection that
/// watches their topic. Returns false once the outbound side is gone.
async fn deliver(
    subscriptions: &HashMap<String, Subscription>,
    replies: Vec<Reply>,
    outbound: &mpsc::Sender<ServerFrame>,
) -> bool {
    for reply in replies {
        let path = reply.topic.path();
        let mut delivered = false;
        for (id, sub) in subscriptions.iter().filter(|(_, sub)| sub.topic == reply.topic) {
            let frame = ServerFrame::Message {
                subscription: id.clone(),
                topic: path.clone(),
                body: reply.body.clone(),
            };
            if outbound.send(frame).await.is_err() {
                return false;
            }
            delivered = true;
        }
        if !delivered {
            debug!(topic = %path, "Reply for a topic this connection does not watch");
        }
    }
    true
}

fn spawn_forwarder(
    subscription: String,
    topic: Topic,
    mut rx: TopicReceiver,
    outbound: mpsc::Sender<ServerFrame>,
) -> JoinHandle<()> {
    let path = topic.path();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(body) => {
                    let frame = ServerFrame::Message {
                        subscription: subscription.clone(),
                        topic: path.clone(),
                        body,
                    };
                    if outbound.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(topic = %path, lagged_count = n, "Subscriber lagged, skipping {} messages", n);
                }
                Err(RecvError::Closed) => {
                    debug!(topic = %path, "Topic closed");
                    break;
                }
            }
        }
    })
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T, FrameError> {
    Ok(serde_json::from_value(body)?)
}

/// Membership gate for room-scoped destinations. `Ok(false)` means the
/// room is already gone, which callers treat as a no-op.
fn is_member(rooms: &RoomService, room_id: RoomId, user_id: &str) -> Result<bool, FrameError> {
    match rooms.directory().roster(room_id) {
        Some(roster) if roster.iter().any(|p| p == user_id) => Ok(true),
        Some(_) => Err(RoomError::NotMember.into()),
        None => {
            debug!(room_id = %room_id, user_id = %user_id, "Send to a room that no longer exists");
            Ok(false)
        }
    }
}

/// Route a `send` frame. Authority comes from the connection's user id,
/// not from ids inside the body. Returns replies meant for this
/// connection only.
fn dispatch(
    rooms: &Arc<RoomService>,
    user_id: &str,
    destination: &str,
    body: Value,
) -> Result<Vec<Reply>, FrameError> {
    let Some(parsed) = Destination::parse(destination) else {
        return Err(FrameError::UnknownDestination(destination.to_string()));
    };

    match parsed {
        Destination::CreateRoom => {
            let mut req: CreateRoomRequest = decode(body)?;
            req.user_id = user_id.to_string();
            rooms.create_room(&req)?;
        }
        Destination::JoinRoom => {
            let mut req: JoinRoomRequest = decode(body)?;
            req.user_id = user_id.to_string();
            rooms.join_room(&req)?;
        }
        Destination::PlayerUpdate(room_id) => {
            let update: PlayerUpdate = if body.is_null() {
                PlayerUpdate::default()
            } else {
                decode(body)?
            };
            if let Some(player_id) = &update.player_id {
                debug!(room_id = %room_id, player_id = %player_id, "Player announced");
            }
            if is_member(rooms, room_id, user_id)? {
                rooms.publish_roster(room_id);
            }
        }
        Destination::StartCountdown(room_id) => rooms.start_countdown(room_id, user_id)?,
        Destination::StartGame(room_id) => rooms.start_now(room_id, user_id)?,
        Destination::RequestState(room_id) => {
            // Answered to the requester alone
            if is_member(rooms, room_id, user_id)? {
                if let Some((apples, scores)) = rooms.game_state(room_id) {
                    return Ok(vec![
                        Reply::new(Topic::GameState(room_id), &apples)?,
                        Reply::new(Topic::Scores(room_id), &scores)?,
                    ]);
                }
            }
        }
        Destination::RemoveCells(room_id) => {
            let mut removal: CellRemoval = decode(body)?;
            if is_member(rooms, room_id, user_id)? {
                removal.user_id = Some(user_id.to_string());
                rooms.remove_cells(room_id, &removal)?;
            }
        }
    }
    Ok(Vec::new())
}
