//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::debug;

use crate::app::AppState;
use crate::rooms::RoomError;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::{CreateRoomRequest, JoinRoomRequest, LeaveRoomRequest, Room};

/// Upper bound on a REST request; WebSocket connections are exempt
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let api_routes = Router::new()
        .route("/rooms", get(list_rooms_handler))
        .route("/rooms/create", post(create_room_handler))
        .route("/rooms/join", post(join_room_handler))
        .route("/rooms/leave", post(leave_room_handler))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .nest("/api", api_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    rooms: usize,
    active_games: usize,
    topics: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        rooms: state.rooms.directory().len(),
        active_games: state.rooms.games().active_games(),
        topics: state.broker.topic_count(),
    })
}

// ============================================================================
// Room directory endpoints
// ============================================================================

async fn list_rooms_handler(State(state): State<AppState>) -> Json<Vec<Room>> {
    Json(state.rooms.list_rooms())
}

async fn create_room_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<Json<Room>, AppError> {
    Ok(Json(state.rooms.create_room(&req)?))
}

async fn join_room_handler(
    State(state): State<AppState>,
    Json(req): Json<JoinRoomRequest>,
) -> Result<Json<Room>, AppError> {
    Ok(Json(state.rooms.join_room(&req)?))
}

#[derive(Serialize)]
struct LeaveResponse {
    success: bool,
}

async fn leave_room_handler(
    State(state): State<AppState>,
    Json(req): Json<LeaveRoomRequest>,
) -> Result<Json<LeaveResponse>, AppError> {
    state.rooms.leave_room(&req)?;
    Ok(Json(LeaveResponse { success: true }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Room(#[from] RoomError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            AppError::Room(e) => {
                let status = match e {
                    RoomError::NotFound(_) => StatusCode::NOT_FOUND,
                    RoomError::Full(_) | RoomError::AlreadyStarted(_) => StatusCode::CONFLICT,
                    RoomError::NotHost | RoomError::NotMember => StatusCode::FORBIDDEN,
                    RoomError::EmptyName | RoomError::InvalidCapacity(_) => StatusCode::BAD_REQUEST,
                };
                (status, e.code())
            }
        };

        debug!(status = %status, error = %self, "Request rejected");

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}
