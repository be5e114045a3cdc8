//! Connection context: one messaging connection per screen context
//!
//! Topics, the join announcement and the handler are fixed at construction.
//! The lifecycle is carried in the type: `Uninitialized -> Active -> TornDown`.
//! `activate` consumes the uninitialized context, so subscription setup can
//! only ever run once per context.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ws::protocol::{ClientFrame, Destination, ServerFrame, Topic};

use super::channel::{ChannelError, ChannelLink, MessageChannel};

/// Callbacks for one context. Invoked from the context's connection task,
/// in frame arrival order.
pub trait ContextHandler: Send + Sync + 'static {
    fn on_connect(&self);

    fn on_disconnect(&self);

    fn on_message(&self, topic: Topic, body: Value);

    fn on_error(&self, code: String, message: String);
}

/// What a context subscribes to and announces on every (re)connect
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPlan {
    pub topics: Vec<Topic>,
    pub announcement: Option<(Destination, Value)>,
}

struct Shared {
    plan: ContextPlan,
    channel: Arc<dyn MessageChannel>,
    handler: Arc<dyn ContextHandler>,
    reconnect_delay: Duration,
    /// Present only while connected and fully subscribed
    sender: Mutex<Option<mpsc::Sender<ClientFrame>>>,
}

pub struct Uninitialized;

pub struct Active {
    task: JoinHandle<()>,
}

impl Drop for Active {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct TornDown;

pub struct ConnectionContext<S> {
    shared: Arc<Shared>,
    state: S,
}

fn subscription_id(index: usize) -> String {
    format!("sub-{index}")
}

impl ConnectionContext<Uninitialized> {
    pub fn new(
        plan: ContextPlan,
        channel: Arc<dyn MessageChannel>,
        handler: Arc<dyn ContextHandler>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                plan,
                channel,
                handler,
                reconnect_delay,
                sender: Mutex::new(None),
            }),
            state: Uninitialized,
        }
    }

    /// Start connecting. Reconnects after `reconnect_delay` whenever the
    /// link drops, until torn down.
    pub fn activate(self) -> ConnectionContext<Active> {
        let shared = self.shared;
        let task = tokio::spawn(run(shared.clone()));
        ConnectionContext {
            shared,
            state: Active { task },
        }
    }
}

impl ConnectionContext<Active> {
    pub fn plan(&self) -> &ContextPlan {
        &self.shared.plan
    }

    pub fn is_connected(&self) -> bool {
        self.shared.sender.lock().is_some()
    }

    /// Publish to a destination. Fails immediately while disconnected.
    pub fn publish<T: Serialize + ?Sized>(
        &self,
        destination: Destination,
        body: &T,
    ) -> Result<(), ChannelError> {
        let frame = ClientFrame::Send {
            destination: destination.path(),
            body: serde_json::to_value(body)?,
        };
        let guard = self.shared.sender.lock();
        let sender = guard.as_ref().ok_or(ChannelError::Disconnected)?;
        sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::ChannelBusy,
            TrySendError::Closed(_) => ChannelError::Disconnected,
        })
    }

    /// Release every subscription and stop reconnecting
    pub fn teardown(self) -> ConnectionContext<TornDown> {
        if let Some(sender) = self.shared.sender.lock().take() {
            for index in 0..self.shared.plan.topics.len() {
                let _ = sender.try_send(ClientFrame::Unsubscribe {
                    id: subscription_id(index),
                });
            }
        }
        debug!(topics = self.shared.plan.topics.len(), "Connection context torn down");
        // Dropping `Active` aborts the connection task and with it the link
        ConnectionContext {
            shared: self.shared,
            state: TornDown,
        }
    }
}

impl ConnectionContext<TornDown> {
    pub fn is_connected(&self) -> bool {
        false
    }
}

async fn run(shared: Arc<Shared>) {
    loop {
        match shared.channel.open().await {
            Ok(link) => serve_link(&shared, link).await,
            Err(e) => warn!(error = %e, "Messaging channel connect failed"),
        }
        debug!(delay_ms = shared.reconnect_delay.as_millis() as u64, "Reconnecting");
        tokio::time::sleep(shared.reconnect_delay).await;
    }
}

async fn serve_link(shared: &Shared, link: ChannelLink) {
    let ChannelLink {
        outbound,
        mut inbound,
    } = link;

    for (index, topic) in shared.plan.topics.iter().enumerate() {
        let frame = ClientFrame::Subscribe {
            id: subscription_id(index),
            topic: topic.path(),
        };
        if outbound.send(frame).await.is_err() {
            return;
        }
    }
    if let Some((destination, body)) = &shared.plan.announcement {
        let frame = ClientFrame::Send {
            destination: destination.path(),
            body: body.clone(),
        };
        if outbound.send(frame).await.is_err() {
            return;
        }
    }

    *shared.sender.lock() = Some(outbound);
    info!(topics = shared.plan.topics.len(), "Messaging channel connected");
    shared.handler.on_connect();

    while let Some(frame) = inbound.recv().await {
        match frame {
            ServerFrame::Message { topic, body, .. } => match Topic::parse(&topic) {
                Some(topic) => shared.handler.on_message(topic, body),
                None => warn!(topic = %topic, "Message on unknown topic"),
            },
            ServerFrame::Error { code, message } => shared.handler.on_error(code, message),
            ServerFrame::Connected { .. } | ServerFrame::Pong { .. } => {}
        }
    }

    *shared.sender.lock() = None;
    warn!("Messaging channel disconnected");
    shared.handler.on_disconnect();
}
