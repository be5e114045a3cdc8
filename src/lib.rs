//! Apple Game - multiplayer sum-to-ten grid puzzle
//!
//! The library carries both sides of the room/session protocol:
//! - `game`: puzzle engine shared by client and server
//! - `rooms`, `ws`, `http`: the room directory server
//! - `client`: room state machine, session synchronizer and transports

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod rooms;
pub mod util;
pub mod ws;
