//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::rooms::{RoomService, RoomSettings};
use crate::ws::broker::Broker;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub broker: Arc<Broker>,
    pub rooms: Arc<RoomService>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let settings = RoomSettings::from_config(&config);
        Self::with_settings(config, settings)
    }

    /// Build state with explicit room settings (tests shorten the countdown)
    pub fn with_settings(config: Config, settings: RoomSettings) -> Self {
        let broker = Arc::new(Broker::new());
        let rooms = Arc::new(RoomService::new(broker.clone(), settings));

        Self {
            config: Arc::new(config),
            broker,
            rooms,
        }
    }
}
