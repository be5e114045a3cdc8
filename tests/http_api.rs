//! Loopback tests against a real server
//!
//! Binds the router to an ephemeral port and drives it over HTTP and
//! WebSocket, the same way a deployed client would.

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use apple_game::app::AppState;
use apple_game::client::{ClientError, ClientSession, DirectoryError, Screen};
use apple_game::config::{ClientConfig, Config};
use apple_game::http::build_router;
use apple_game::rooms::RoomSettings;
use apple_game::ws::{Room, RoomPhase};

const LIMIT: Duration = Duration::from_secs(5);

async fn spawn_server() -> (SocketAddr, AppState) {
    let state = AppState::with_settings(
        Config::default(),
        RoomSettings {
            default_max_players: 4,
            countdown_secs: 2,
            countdown_tick: Duration::from_millis(20),
        },
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, state)
}

fn client_config(addr: SocketAddr) -> ClientConfig {
    let mut config = ClientConfig::new(format!("http://{addr}"));
    config.reconnect_delay = Duration::from_millis(50);
    config
}

mod rest_tests {
    use super::*;

    #[tokio::test]
    async fn create_list_join_leave() {
        let (addr, _state) = spawn_server().await;
        let http = reqwest::Client::new();
        let api = format!("http://{addr}/api");

        let room: Room = http
            .post(format!("{api}/rooms/create"))
            .json(&json!({ "roomName": "orchard", "userId": "GUEST_10000" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(room.max_players, 4);
        assert_eq!(room.current_players, 1);
        assert_eq!(room.phase, RoomPhase::Waiting);

        let listed: Vec<Room> = http
            .get(format!("{api}/rooms"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed, vec![room.clone()]);

        let res = http
            .post(format!("{api}/rooms/join"))
            .json(&json!({ "roomId": room.room_id, "userId": "GUEST_20000" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let joined: Room = res.json().await.unwrap();
        assert_eq!(joined.current_players, 2);

        let res = http
            .post(format!("{api}/rooms/leave"))
            .json(&json!({ "roomId": room.room_id, "userId": "GUEST_20000" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn errors_carry_status_and_code() {
        let (addr, _state) = spawn_server().await;
        let http = reqwest::Client::new();
        let api = format!("http://{addr}/api");

        let room: Room = http
            .post(format!("{api}/rooms/create"))
            .json(&json!({ "roomName": "solo", "userId": "GUEST_10000", "maxPlayers": 1 }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let res = http
            .post(format!("{api}/rooms/join"))
            .json(&json!({ "roomId": room.room_id, "userId": "GUEST_20000" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 409);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["code"], "room_full");

        let res = http
            .post(format!("{api}/rooms/leave"))
            .json(&json!({ "roomId": room.room_id, "userId": "GUEST_20000" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 403);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["code"], "not_member");

        let res = http
            .post(format!("{api}/rooms/create"))
            .json(&json!({ "roomName": "  ", "userId": "GUEST_10000" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn websocket_requires_a_user_id() {
        let (addr, _state) = spawn_server().await;
        let err = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?userId="))
            .await
            .unwrap_err();
        match err {
            tokio_tungstenite::tungstenite::Error::Http(res) => assert_eq!(res.status(), 400),
            other => panic!("expected HTTP rejection, got {other:?}"),
        }
    }
}

mod session_tests {
    use super::*;

    #[tokio::test]
    async fn two_clients_reach_the_game_over_the_network() {
        let (addr, state) = spawn_server().await;
        let config = client_config(addr);
        let mut host = ClientSession::connect("GUEST_10000", &config);
        let mut guest = ClientSession::connect("GUEST_20000", &config);

        host.enter_lobby().await.unwrap();
        let room = host.create_room("orchard", None).await.unwrap();
        guest.enter_lobby().await.unwrap();
        guest.join_room(room.room_id).await.unwrap();

        assert!(host.run_until(LIMIT, |c| c.state().roster().len() == 2).await);
        assert!(guest.run_until(LIMIT, |c| c.state().roster().len() == 2).await);

        host.start_countdown().unwrap();
        assert!(host.run_until(LIMIT, |c| c.screen() == Screen::InGame).await);
        assert!(guest.run_until(LIMIT, |c| c.screen() == Screen::InGame).await);

        assert!(host.run_until(LIMIT, |c| c.board().grid().total() > 0).await);
        assert!(guest.run_until(LIMIT, |c| c.board().grid().total() > 0).await);
        assert_eq!(host.board().grid(), guest.board().grid());
        assert_eq!(state.rooms.games().active_games(), 1);
    }

    #[tokio::test]
    async fn join_errors_map_to_typed_failures() {
        let (addr, _state) = spawn_server().await;
        let config = client_config(addr);
        let mut host = ClientSession::connect("GUEST_10000", &config);
        let mut guest = ClientSession::connect("GUEST_20000", &config);

        let room = host.create_room("solo", Some(1)).await.unwrap();
        let err = guest.join_room(room.room_id).await.unwrap_err();
        assert!(matches!(err, ClientError::Directory(DirectoryError::RoomFull)));

        let err = guest.join_room(uuid::Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ClientError::Directory(DirectoryError::RoomNotFound)));
        assert_eq!(guest.screen(), Screen::Lobby);
    }
}
