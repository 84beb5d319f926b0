use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use common::Config;
use fleet_host::frames::{Frame, FrameStore};
use fleet_host::server::handlers::{self, ApiState};
use fleet_host::{GamePhase, Host, InMemoryDirectory, PhaseGate, RobotDirectory};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn api_state(phase: GamePhase) -> (ApiState, CancellationToken) {
    let mut config = Config::default();
    config.discovery.port = 0;

    let directory = InMemoryDirectory::new();
    let gate = PhaseGate::new(phase);
    let frames = FrameStore::new();
    let host = Host::new(config, Arc::new(directory.clone()), gate.clone(), frames.clone());
    let state = ApiState {
        host: host.handle(),
        directory,
        phase: gate,
        frames,
    };
    let shutdown = CancellationToken::new();
    tokio::spawn(host.run(shutdown.clone()));
    (state, shutdown)
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(handlers::configure),
        )
        .await
    };
}

mod tests {
    use super::*;

    #[actix_web::test]
    async fn test_phase_transitions() {
        let (state, shutdown) = api_state(GamePhase::MainMenu);
        let app = app!(state);

        let req = test::TestRequest::get().uri("/api/phase").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "phase": "main_menu" }));

        let req = test::TestRequest::put()
            .uri("/api/phase")
            .set_json(json!({ "action": "start" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::put()
            .uri("/api/phase")
            .set_json(json!({ "action": "lobby" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "phase": "lobby" }));
        assert_eq!(state.phase.current(), GamePhase::Lobby);

        let req = test::TestRequest::put()
            .uri("/api/phase")
            .set_json(json!({ "action": "menu" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::put()
            .uri("/api/phase")
            .set_json(json!({ "action": "pause" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        shutdown.cancel();
    }

    #[actix_web::test]
    async fn test_scan_endpoints() {
        let (state, shutdown) = api_state(GamePhase::Lobby);
        let app = app!(state);

        let req = test::TestRequest::get().uri("/api/scan").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post().uri("/api/scan").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "started": true }));

        // Single-flight: a second request while running does not start another scan.
        let req = test::TestRequest::post().uri("/api/scan").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "started": false }));

        let req = test::TestRequest::get().uri("/api/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["scan_in_progress"], json!(true));
        assert_eq!(body["phase"], json!("lobby"));

        shutdown.cancel();
    }

    #[actix_web::test]
    async fn test_robots_and_sessions() {
        let (state, shutdown) = api_state(GamePhase::Lobby);
        state.directory.upsert("AA:BB", Some("Scout"), Some("10.0.0.7"));
        let app = app!(state);

        let req = test::TestRequest::get().uri("/api/robots").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body[0]["robot_id"], json!("AA:BB"));
        assert_eq!(body[0]["callsign"], json!("Scout"));
        assert_eq!(body[0]["assigned_player"], json!("Unassigned"));

        let req = test::TestRequest::get().uri("/api/robots/AA:BB").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/api/robots/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/api/sessions").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!([]));

        shutdown.cancel();
    }

    #[actix_web::test]
    async fn test_rename_and_assign_robot() {
        let (state, shutdown) = api_state(GamePhase::Lobby);
        state.directory.upsert("AA:BB", None, Some("10.0.0.7"));
        let app = app!(state);

        let req = test::TestRequest::put()
            .uri("/api/robots/AA:BB")
            .set_json(json!({ "callsign": "Ranger", "assigned_player": "Player 1" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["callsign"], json!("Ranger"));
        assert_eq!(body["assigned_player"], json!("Player 1"));
        assert_eq!(body["online"], json!(true));

        let req = test::TestRequest::put()
            .uri("/api/robots/AA:BB")
            .set_json(json!({ "online": false }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["online"], json!(false));
        assert_eq!(body["callsign"], json!("Ranger"));
        assert_eq!(state.directory.get("AA:BB").unwrap().callsign, "Ranger");

        let req = test::TestRequest::put()
            .uri("/api/robots/nope")
            .set_json(json!({ "callsign": "Ghost" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        shutdown.cancel();
    }

    #[actix_web::test]
    async fn test_drive_without_tanks_addresses_nobody() {
        let (state, shutdown) = api_state(GamePhase::Playing);
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/drive")
            .set_json(json!({ "left": 0.5, "right": 0.5 }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "sent": 0 }));

        let req = test::TestRequest::post()
            .uri("/api/turret")
            .set_json(json!({ "speed": -3.0 }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "sent": 0 }));

        shutdown.cancel();
    }

    #[actix_web::test]
    async fn test_frame_endpoint() {
        let (state, shutdown) = api_state(GamePhase::Lobby);
        let app = app!(state);

        let req = test::TestRequest::get().uri("/api/frame").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        state.frames.store(Frame {
            session_id: "s1".to_string(),
            device_id: Some("cam".to_string()),
            received_at: chrono::Utc::now(),
            data: Arc::from(&[0xffu8, 0xd8, 0xff][..]),
        });
        let req = test::TestRequest::get().uri("/api/frame").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-type").unwrap(), "image/jpeg");
        let body = test::read_body(resp).await;
        assert_eq!(&body[..], &[0xff, 0xd8, 0xff]);

        shutdown.cancel();
    }
}
