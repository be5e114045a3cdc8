//! Request/response room directory client

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::rooms::{RoomError, RoomService};
use crate::ws::protocol::{CreateRoomRequest, JoinRoomRequest, LeaveRoomRequest, Room};

/// Directory call failures
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("room full")]
    RoomFull,

    #[error("room not found")]
    RoomNotFound,

    #[error("game already started")]
    AlreadyStarted,

    #[error("request rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },
}

impl DirectoryError {
    fn from_code(code: &str, message: String) -> Self {
        match code {
            "room_full" => Self::RoomFull,
            "room_not_found" => Self::RoomNotFound,
            "already_started" => Self::AlreadyStarted,
            _ => Self::Rejected {
                code: code.to_string(),
                message,
            },
        }
    }
}

impl From<RoomError> for DirectoryError {
    fn from(e: RoomError) -> Self {
        Self::from_code(e.code(), e.to_string())
    }
}

/// The four room directory operations
#[async_trait]
pub trait RoomDirectoryApi: Send + Sync {
    async fn list_rooms(&self) -> Result<Vec<Room>, DirectoryError>;

    async fn create_room(&self, req: &CreateRoomRequest) -> Result<Room, DirectoryError>;

    async fn join_room(&self, req: &JoinRoomRequest) -> Result<Room, DirectoryError>;

    async fn leave_room(&self, req: &LeaveRoomRequest) -> Result<(), DirectoryError>;
}

/// Directory over the REST API
#[derive(Clone)]
pub struct HttpRoomDirectory {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
}

impl HttpRoomDirectory {
    /// `base_url` is the API root, e.g. `http://localhost:8080/api`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, DirectoryError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, DirectoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %body, "Directory request failed");
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) => Err(DirectoryError::from_code(&err.code, err.error)),
            Err(_) => Err(DirectoryError::Api {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

#[async_trait]
impl RoomDirectoryApi for HttpRoomDirectory {
    async fn list_rooms(&self) -> Result<Vec<Room>, DirectoryError> {
        let response = self.client.get(self.url("rooms")).send().await?;
        Self::decode(response).await
    }

    async fn create_room(&self, req: &CreateRoomRequest) -> Result<Room, DirectoryError> {
        self.post("rooms/create", req).await
    }

    async fn join_room(&self, req: &JoinRoomRequest) -> Result<Room, DirectoryError> {
        self.post("rooms/join", req).await
    }

    async fn leave_room(&self, req: &LeaveRoomRequest) -> Result<(), DirectoryError> {
        let _: serde_json::Value = self.post("rooms/leave", req).await?;
        Ok(())
    }
}

/// Directory calling straight into an in-process room service
#[derive(Clone)]
pub struct LocalRoomDirectory {
    rooms: Arc<RoomService>,
}

impl LocalRoomDirectory {
    pub fn new(rooms: Arc<RoomService>) -> Self {
        Self { rooms }
    }
}

#[async_trait]
impl RoomDirectoryApi for LocalRoomDirectory {
    async fn list_rooms(&self) -> Result<Vec<Room>, DirectoryError> {
        Ok(self.rooms.list_rooms())
    }

    async fn create_room(&self, req: &CreateRoomRequest) -> Result<Room, DirectoryError> {
        Ok(self.rooms.create_room(req)?)
    }

    async fn join_room(&self, req: &JoinRoomRequest) -> Result<Room, DirectoryError> {
        Ok(self.rooms.join_room(req)?)
    }

    async fn leave_room(&self, req: &LeaveRoomRequest) -> Result<(), DirectoryError> {
        self.rooms.leave_room(req)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::RoomSettings;
    use crate::ws::broker::Broker;

    fn local(max_players: u32) -> (LocalRoomDirectory, Room) {
        let rooms = Arc::new(RoomService::new(Arc::new(Broker::new()), RoomSettings::default()));
        let room = rooms
            .create_room(&CreateRoomRequest {
                room_name: "orchard".to_string(),
                user_id: "GUEST_10000".to_string(),
                max_players: Some(max_players),
            })
            .unwrap();
        (LocalRoomDirectory::new(rooms), room)
    }

    #[tokio::test]
    async fn full_room_maps_to_room_full() {
        let (directory, room) = local(1);
        let err = directory
            .join_room(&JoinRoomRequest {
                room_id: room.room_id,
                user_id: "GUEST_20000".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::RoomFull));
    }

    #[tokio::test]
    async fn leaving_a_vanished_room_is_room_not_found() {
        let (directory, room) = local(8);
        let req = LeaveRoomRequest {
            room_id: room.room_id,
            user_id: "GUEST_10000".to_string(),
        };
        directory.leave_room(&req).await.unwrap();
        assert!(matches!(
            directory.leave_room(&req).await,
            Err(DirectoryError::RoomNotFound)
        ));
        assert!(directory.list_rooms().await.unwrap().is_empty());
    }

    #[test]
    fn unknown_codes_are_kept() {
        let err = DirectoryError::from_code("invalid_capacity", "too big".to_string());
        assert!(matches!(err, DirectoryError::Rejected { code, .. } if code == "invalid_capacity"));
    }
}
