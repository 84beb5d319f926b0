//! Robot directory
//!
//! The session registry and the discovery responder only ever push updates
//! into the directory through [`RobotDirectory`]; reads come from the
//! control API.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use log::{debug, info};

/// Write-only view of the directory used by discovery and the session registry.
pub trait RobotDirectory: Send + Sync {
    fn upsert(&self, robot_id: &str, callsign: Option<&str>, ip: Option<&str>);
    fn remove(&self, robot_id: &str);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotInfo {
    pub robot_id: String,
    pub callsign: String,
    pub ip: String,
    pub assigned_player: String,
    pub online: bool,
    pub last_update: DateTime<Utc>,
}

#[derive(Default)]
struct DirectoryState {
    robots: HashMap<String, RobotInfo>,
    generic_counter: u32,
}

/// In-memory directory shared between the host loop and the control API.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    state: Arc<RwLock<DirectoryState>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> Vec<RobotInfo> {
        let state = self.state.read();
        let mut robots: Vec<RobotInfo> = state.robots.values().cloned().collect();
        robots.sort_by(|a, b| a.robot_id.cmp(&b.robot_id));
        robots
    }

    pub fn get(&self, robot_id: &str) -> Option<RobotInfo> {
        self.state.read().robots.get(robot_id).cloned()
    }

    /// Renames a robot. Blank names are ignored. `None` if the robot is unknown.
    pub fn set_callsign(&self, robot_id: &str, callsign: &str) -> Option<RobotInfo> {
        let callsign = callsign.trim();
        self.edit(robot_id, |robot| {
            if callsign.is_empty() || robot.callsign == callsign {
                return false;
            }
            info!("Robot {} renamed from {} to {}", robot.robot_id, robot.callsign, callsign);
            robot.callsign = callsign.to_string();
            true
        })
    }

    pub fn set_assigned_player(&self, robot_id: &str, player: &str) -> Option<RobotInfo> {
        let player = player.trim();
        self.edit(robot_id, |robot| {
            if player.is_empty() || robot.assigned_player == player {
                return false;
            }
            info!("Robot {} assigned to {}", robot.robot_id, player);
            robot.assigned_player = player.to_string();
            true
        })
    }

    pub fn set_online(&self, robot_id: &str, online: bool) -> Option<RobotInfo> {
        self.edit(robot_id, |robot| {
            if robot.online == online {
                return false;
            }
            robot.online = online;
            true
        })
    }

    fn edit(&self, robot_id: &str, apply: impl FnOnce(&mut RobotInfo) -> bool) -> Option<RobotInfo> {
        let mut state = self.state.write();
        let robot = state.robots.get_mut(robot_id)?;
        if apply(robot) {
            robot.last_update = Utc::now();
        }
        Some(robot.clone())
    }

    pub fn len(&self) -> usize {
        self.state.read().robots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RobotDirectory for InMemoryDirectory {
    fn upsert(&self, robot_id: &str, callsign: Option<&str>, ip: Option<&str>) {
        let robot_id = robot_id.trim();
        if robot_id.is_empty() {
            return;
        }
        let callsign = callsign.map(str::trim).filter(|c| !c.is_empty());
        let ip = ip.filter(|ip| !ip.is_empty());

        let mut state = self.state.write();
        if let Some(robot) = state.robots.get_mut(robot_id) {
            let mut changed = false;
            if let Some(callsign) = callsign {
                if robot.callsign != callsign {
                    robot.callsign = callsign.to_string();
                    changed = true;
                }
            }
            if let Some(ip) = ip {
                if robot.ip != ip {
                    robot.ip = ip.to_string();
                    changed = true;
                }
            }
            if !robot.online {
                robot.online = true;
                changed = true;
            }
            if changed {
                robot.last_update = Utc::now();
                debug!("Updated robot {} ({}, {})", robot.robot_id, robot.callsign, robot.ip);
            }
            return;
        }

        let callsign = match callsign {
            Some(c) => c.to_string(),
            None => {
                state.generic_counter += 1;
                format!("robot-{:02}", state.generic_counter)
            }
        };
        let robot = RobotInfo {
            robot_id: robot_id.to_string(),
            callsign,
            ip: ip.unwrap_or_default().to_string(),
            assigned_player: "Unassigned".to_string(),
            online: true,
            last_update: Utc::now(),
        };
        info!("Robot {} added as {}", robot.robot_id, robot.callsign);
        state.robots.insert(robot.robot_id.clone(), robot);
    }

    fn remove(&self, robot_id: &str) {
        if self.state.write().robots.remove(robot_id).is_some() {
            info!("Robot {} removed", robot_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_generates_generic_names() {
        let dir = InMemoryDirectory::new();
        dir.upsert("a", None, Some("10.0.0.2"));
        dir.upsert("b", Some("  "), None);
        assert_eq!(dir.get("a").unwrap().callsign, "robot-01");
        assert_eq!(dir.get("b").unwrap().callsign, "robot-02");
        assert_eq!(dir.get("a").unwrap().ip, "10.0.0.2");
    }

    #[test]
    fn test_upsert_keeps_existing_fields_when_blank() {
        let dir = InMemoryDirectory::new();
        dir.upsert("a", Some("Scout"), Some("10.0.0.2"));
        dir.upsert("a", None, None);
        let robot = dir.get("a").unwrap();
        assert_eq!(robot.callsign, "Scout");
        assert_eq!(robot.ip, "10.0.0.2");

        dir.upsert("a", Some("Ranger"), Some("10.0.0.9"));
        let robot = dir.get("a").unwrap();
        assert_eq!(robot.callsign, "Ranger");
        assert_eq!(robot.ip, "10.0.0.9");
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_blank_id_is_ignored() {
        let dir = InMemoryDirectory::new();
        dir.upsert(" ", Some("x"), None);
        assert!(dir.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = InMemoryDirectory::new();
        dir.upsert("a", None, None);
        dir.remove("a");
        dir.remove("a");
        assert!(dir.is_empty());
    }

    #[test]
    fn test_list_is_sorted() {
        let dir = InMemoryDirectory::new();
        dir.upsert("c", None, None);
        dir.upsert("a", None, None);
        let ids: Vec<String> = dir.list().into_iter().map(|r| r.robot_id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_operator_edits() {
        let dir = InMemoryDirectory::new();
        dir.upsert("a", Some("Scout"), None);

        assert_eq!(dir.set_callsign("a", " Ranger ").unwrap().callsign, "Ranger");
        assert_eq!(dir.set_callsign("a", "   ").unwrap().callsign, "Ranger");
        assert_eq!(dir.set_assigned_player("a", "Player 2").unwrap().assigned_player, "Player 2");
        assert_eq!(dir.set_assigned_player("a", "").unwrap().assigned_player, "Player 2");
        assert!(!dir.set_online("a", false).unwrap().online);

        assert!(dir.set_callsign("missing", "x").is_none());
        assert!(dir.set_online("missing", true).is_none());
        assert!(dir.get("missing").is_none());
    }

    #[test]
    fn test_upsert_after_rename_keeps_new_callsign() {
        let dir = InMemoryDirectory::new();
        dir.upsert("a", None, Some("10.0.0.2"));
        dir.set_callsign("a", "Ranger");
        dir.set_online("a", false);
        dir.upsert("a", None, Some("10.0.0.3"));

        let robot = dir.get("a").unwrap();
        assert_eq!(robot.callsign, "Ranger");
        assert!(robot.online);
    }
}
