//! HTTP request handlers for the control API
//!
//! Scan and session state live in the host loop and are reached through
//! [`HostHandle`]; the directory, phase and frames are shared directly.

use actix_web::{http::header, web, HttpResponse, Responder};
use common::{FleetError, Result};
use log::info;
use serde_json::json;
use crate::directory::InMemoryDirectory;
use crate::frames::FrameStore;
use crate::host::HostHandle;
use crate::models::{DriveRequest, PhaseAction, PhaseRequest, RobotUpdateRequest, TurretRequest};
use crate::phase::PhaseGate;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct ApiState {
    pub host: HostHandle,
    pub directory: InMemoryDirectory,
    pub phase: PhaseGate,
    pub frames: FrameStore,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(web::resource("/status").route(web::get().to(get_status)))
            .service(web::resource("/robots").route(web::get().to(get_robots)))
            .service(
                web::resource("/robots/{robot_id}")
                    .route(web::get().to(get_robot))
                    .route(web::put().to(update_robot)),
            )
            .service(web::resource("/sessions").route(web::get().to(get_sessions)))
            .service(
                web::resource("/phase")
                    .route(web::get().to(get_phase))
                    .route(web::put().to(set_phase)),
            )
            .service(
                web::resource("/scan")
                    .route(web::get().to(get_scan))
                    .route(web::post().to(start_scan)),
            )
            .service(web::resource("/drive").route(web::post().to(drive)))
            .service(web::resource("/turret").route(web::post().to(turret)))
            .service(web::resource("/frame").route(web::get().to(get_frame))),
    );
}

pub async fn get_status(state: web::Data<ApiState>) -> Result<HttpResponse> {
    let status = state.host.status().await?;
    Ok(HttpResponse::Ok().json(status))
}

pub async fn get_robots(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.directory.list())
}

pub async fn get_robot(state: web::Data<ApiState>, robot_id: web::Path<String>) -> Result<HttpResponse> {
    match state.directory.get(&robot_id) {
        Some(robot) => Ok(HttpResponse::Ok().json(robot)),
        None => Err(FleetError::NotFound(format!("robot {}", robot_id))),
    }
}

/// Operator edits: rename, assign a player, mark online or offline.
pub async fn update_robot(
    state: web::Data<ApiState>,
    robot_id: web::Path<String>,
    request: web::Json<RobotUpdateRequest>,
) -> Result<HttpResponse> {
    let robot_id = robot_id.into_inner();
    let not_found = || FleetError::NotFound(format!("robot {}", robot_id));

    let mut robot = state.directory.get(&robot_id).ok_or_else(not_found)?;
    if let Some(callsign) = request.callsign.as_deref() {
        robot = state.directory.set_callsign(&robot_id, callsign).ok_or_else(not_found)?;
    }
    if let Some(player) = request.assigned_player.as_deref() {
        robot = state.directory.set_assigned_player(&robot_id, player).ok_or_else(not_found)?;
    }
    if let Some(online) = request.online {
        robot = state.directory.set_online(&robot_id, online).ok_or_else(not_found)?;
    }
    Ok(HttpResponse::Ok().json(robot))
}

pub async fn get_sessions(state: web::Data<ApiState>) -> Result<HttpResponse> {
    let sessions = state.host.sessions().await?;
    Ok(HttpResponse::Ok().json(sessions))
}

pub async fn get_phase(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(json!({ "phase": state.phase.current() }))
}

pub async fn set_phase(state: web::Data<ApiState>, request: web::Json<PhaseRequest>) -> Result<HttpResponse> {
    let phase = match request.action {
        PhaseAction::Lobby => state.phase.go_to_lobby()?,
        PhaseAction::Start => state.phase.start_game()?,
        PhaseAction::End => state.phase.end_game()?,
        PhaseAction::Menu => state.phase.back_to_menu(),
    };
    Ok(HttpResponse::Ok().json(json!({ "phase": phase })))
}

pub async fn start_scan(state: web::Data<ApiState>) -> Result<HttpResponse> {
    let started = state.host.start_scan().await?;
    if started {
        info!("Scan requested over HTTP");
    }
    Ok(HttpResponse::Accepted().json(json!({ "started": started })))
}

pub async fn get_scan(state: web::Data<ApiState>) -> Result<HttpResponse> {
    match state.host.last_scan().await? {
        Some(report) => Ok(HttpResponse::Ok().json(report)),
        None => Err(FleetError::NotFound("no scan has finished yet".to_string())),
    }
}

pub async fn drive(state: web::Data<ApiState>, request: web::Json<DriveRequest>) -> Result<HttpResponse> {
    let sent = state.host.drive(request.left, request.right).await?;
    Ok(HttpResponse::Ok().json(json!({ "sent": sent })))
}

pub async fn turret(state: web::Data<ApiState>, request: web::Json<TurretRequest>) -> Result<HttpResponse> {
    let sent = state.host.turret(request.speed).await?;
    Ok(HttpResponse::Ok().json(json!({ "sent": sent })))
}

pub async fn get_frame(state: web::Data<ApiState>) -> Result<HttpResponse> {
    match state.frames.latest() {
        Some(frame) => Ok(HttpResponse::Ok()
            .content_type("image/jpeg")
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .body(frame.data.to_vec())),
        None => Err(FleetError::NotFound("no frame received".to_string())),
    }
}
