//! Messaging channel: wire protocol, topic broker, sessions and the socket bridge

pub mod broker;
pub mod handler;
pub mod protocol;
pub mod session;

pub use broker::{Broker, TopicReceiver};
pub use protocol::{ClientFrame, Destination, Room, RoomId, RoomPhase, ServerFrame, Topic};
