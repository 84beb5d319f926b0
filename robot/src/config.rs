use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use clap::ValueEnum;
use log::warn;
use uuid::Uuid;

/// What the simulated robot does when commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RobotKind {
    /// Listens and reports hit sectors
    Board,
    /// Drives and emits
    Tank,
    /// Connects and heartbeats only
    Idle,
}

impl RobotKind {
    /// Role announced in hello; idle robots stay role-less.
    pub fn role(&self) -> Option<&'static str> {
        match self {
            RobotKind::Board => Some("test_board"),
            RobotKind::Tank => Some("robot_tank"),
            RobotKind::Idle => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RobotConfig {
    pub robot_id: String,
    pub callsign: Option<String>,
    pub kind: RobotKind,
    /// Where announce datagrams are sent
    pub discovery_addr: SocketAddr,
    /// Skips discovery when set
    pub endpoint: Option<String>,
    pub announce_interval: Duration,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    /// Compass bearing of the simulated signal source, for boards
    pub source_bearing: f64,
    /// Chance that a board misses a hit it should have seen
    pub dropout: f64,
    pub seed: Option<u64>,
}

impl RobotConfig {
    pub fn new(robot_id: impl Into<String>, kind: RobotKind) -> Self {
        Self {
            robot_id: robot_id.into(),
            callsign: None,
            kind,
            discovery_addr: SocketAddr::from((Ipv4Addr::BROADCAST, 30560)),
            endpoint: None,
            announce_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(1),
            source_bearing: 90.0,
            dropout: 0.0,
            seed: None,
        }
    }
}

/// MAC address of this machine, or a random id when there is none.
pub fn default_robot_id() -> String {
    match mac_address::get_mac_address() {
        Ok(Some(addr)) => addr.to_string(),
        Ok(None) => Uuid::new_v4().to_string(),
        Err(e) => {
            warn!("Could not read MAC address: {}", e);
            Uuid::new_v4().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles() {
        assert_eq!(RobotKind::Board.role(), Some("test_board"));
        assert_eq!(RobotKind::Tank.role(), Some("robot_tank"));
        assert_eq!(RobotKind::Idle.role(), None);
    }

    #[test]
    fn test_defaults_broadcast_to_discovery_port() {
        let config = RobotConfig::new("bot", RobotKind::Tank);
        assert_eq!(config.discovery_addr.port(), 30560);
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn test_default_robot_id_is_not_empty() {
        assert!(!default_robot_id().is_empty());
    }
}
