//! Game client core: identity, transports, connection contexts, the session
//! synchronizer, the room state machine and the driver that ties them together

pub mod channel;
pub mod connection;
pub mod directory;
pub mod identity;
pub mod session;
pub mod state_machine;
pub mod synchronizer;

pub use channel::{ChannelError, LocalChannel, MessageChannel, WsChannel};
pub use directory::{DirectoryError, HttpRoomDirectory, LocalRoomDirectory, RoomDirectoryApi};
pub use identity::GuestIdentity;
pub use session::{ClientError, ClientSession};
pub use state_machine::{RoomStateMachine, Screen, StateError, Transition};
pub use synchronizer::{ContextKind, SessionSynchronizer, Stamped, SyncError, SyncEvent};
