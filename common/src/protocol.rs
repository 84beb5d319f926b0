//! Wire formats shared by the host and the robots
//!
//! Discovery uses small JSON datagrams; the session channel carries JSON text
//! frames tagged by a `cmd` field.

use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::types::Sector;

/// Announce datagram a robot broadcasts while looking for the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryAnnounce {
    pub robot_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
}

impl DiscoveryAnnounce {
    /// Parses an announce, returning `None` for anything without a usable robot id.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let mut announce: DiscoveryAnnounce = serde_json::from_slice(payload).ok()?;
        announce.robot_id = announce.robot_id.trim().to_string();
        if announce.robot_id.is_empty() {
            return None;
        }
        announce.callsign = announce
            .callsign
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        Some(announce)
    }
}

/// Unicast reply carrying the session endpoint URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryReply {
    pub ws: String,
}

/// Messages a robot sends over its session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum RobotMessage {
    Hello {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
    Hb,
    Ready,
    EmitDone,
    HitDetectDone,
    ScanResults {
        #[serde(default)]
        hits: Vec<String>,
    },
    /// Anything that failed to decode or carried an unknown `cmd`
    #[serde(other)]
    Unrecognized,
}

impl RobotMessage {
    /// Decodes one text frame. Never fails: bad input becomes `Unrecognized`.
    pub fn decode(text: &str) -> Self {
        match serde_json::from_str::<RobotMessage>(text) {
            Ok(RobotMessage::Hello { id, role }) => {
                let id = id.trim().to_string();
                if id.is_empty() {
                    return RobotMessage::Unrecognized;
                }
                let role = role.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
                RobotMessage::Hello { id, role }
            }
            Ok(message) => message,
            Err(_) => RobotMessage::Unrecognized,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Hit labels mapped onto the sector ring; unknown labels are skipped.
    pub fn hit_sectors(hits: &[String]) -> Vec<Sector> {
        let mut sectors: Vec<Sector> = hits.iter().filter_map(|h| h.parse().ok()).collect();
        sectors.sort();
        sectors.dedup();
        sectors
    }
}

/// Commands the host sends to robots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum HostCommand {
    ListenPrepare,
    CarrierOn,
    CarrierOff,
    Emit { dir: Sector },
    Mark { dir: Sector },
    ListenFinish,
    MotorsOn,
    Drive { left: f32, right: f32 },
    Turret { speed: f32 },
}

impl HostCommand {
    pub fn drive(left: f32, right: f32) -> Self {
        HostCommand::Drive {
            left: clamp_unit(left),
            right: clamp_unit(right),
        }
    }

    pub fn turret(speed: f32) -> Self {
        HostCommand::Turret { speed: clamp_unit(speed) }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decoding is only needed on the robot side.
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}
