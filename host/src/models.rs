use chrono::{DateTime, Utc};
use common::Sector;
use serde::{Deserialize, Serialize};
use crate::phase::GamePhase;
use crate::scan::Estimate;

/// Outcome of one finished scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub hits: Vec<Sector>,
    pub estimate: Estimate,
    pub ready_acked: bool,
    /// Directions whose `emit_done` arrived before the timeout
    pub emit_acks: usize,
    pub results_received: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub device_id: Option<String>,
    pub role: Option<String>,
    pub peer: Option<String>,
    pub connected_ms: u64,
    pub last_seen_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostStatus {
    pub phase: GamePhase,
    pub sessions: usize,
    pub roles: Vec<RoleCount>,
    pub scan_in_progress: bool,
    pub scanning_sector: Option<Sector>,
    pub last_estimate: Option<Estimate>,
    /// Bound port while discovery is open
    pub discovery_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleCount {
    pub role: String,
    pub sessions: usize,
}

/// Body of `PUT /api/phase`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseAction {
    Lobby,
    Start,
    End,
    Menu,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhaseRequest {
    pub action: PhaseAction,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DriveRequest {
    pub left: f32,
    pub right: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TurretRequest {
    pub speed: f32,
}

/// Body of `PUT /api/robots/{robot_id}`; absent fields stay as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RobotUpdateRequest {
    pub callsign: Option<String>,
    pub assigned_player: Option<String>,
    pub online: Option<bool>,
}
