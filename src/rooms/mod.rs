//! Room directory and the service that drives room lifecycles

pub mod directory;
pub mod service;

pub use directory::{LeaveOutcome, RoomDirectory, RoomError, MAX_ROOM_CAPACITY};
pub use service::{RoomService, RoomSettings, StartError};
