use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use log::{debug, info, warn};
use tokio::time::Instant;
use crate::directory::RobotDirectory;
use crate::models::{RoleCount, SessionSummary};
use crate::phase::PhaseGate;
use super::{SessionId, SessionLink};

/// One live connection.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub peer: Option<SocketAddr>,
    pub device_id: Option<String>,
    pub role: Option<String>,
    pub opened_at: Instant,
    pub last_seen: Instant,
    pub(super) link: SessionLink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloOutcome {
    Registered,
    /// Hello arrived outside the accepting phase; the session was asked to close.
    Rejected,
    /// The session is no longer registered (closed or evicted).
    UnknownSession,
}

/// Owns every live session and the role-sets derived from them.
///
/// Invariants: a session id is in at most one role-set, and only the one named
/// by its `role`; a device id maps to at most one session; every removal path
/// goes through [`SessionRegistry::evict`].
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    pub(super) roles: HashMap<String, HashSet<SessionId>>,
    devices: HashMap<String, SessionId>,
    directory: Arc<dyn RobotDirectory>,
    phase: PhaseGate,
}

impl SessionRegistry {
    pub fn new(directory: Arc<dyn RobotDirectory>, phase: PhaseGate) -> Self {
        Self {
            sessions: HashMap::new(),
            roles: HashMap::new(),
            devices: HashMap::new(),
            directory,
            phase,
        }
    }

    /// Registers a bare session with no identity or role.
    pub fn on_open(&mut self, id: SessionId, peer: Option<SocketAddr>, link: SessionLink, now: Instant) {
        if let Some(previous) = self.evict(&id) {
            warn!("Session {} reopened, dropping the previous registration", id);
            previous.link.close();
        }
        self.sessions.insert(
            id.clone(),
            Session {
                id,
                peer,
                device_id: None,
                role: None,
                opened_at: now,
                last_seen: now,
                link,
            },
        );
    }

    pub fn on_hello(&mut self, id: &SessionId, device_id: &str, role: Option<&str>, now: Instant) -> HelloOutcome {
        let Some(session) = self.sessions.get(id) else {
            return HelloOutcome::UnknownSession;
        };

        let phase = self.phase.current();
        if !phase.is_discovery_open() {
            info!("Rejecting hello from {} on session {}: phase is {}", device_id, id, phase);
            session.link.close();
            return HelloOutcome::Rejected;
        }

        // A reconnecting robot replaces its stale session without leaving the directory.
        if let Some(stale) = self.devices.get(device_id).filter(|owner| *owner != id).cloned() {
            warn!("Robot {} reconnected on session {}, closing stale session {}", device_id, id, stale);
            if let Some((old, _)) = self.detach(&stale) {
                old.link.close();
            }
        }

        let (previous_device, previous_role, peer) = match self.sessions.get_mut(id) {
            Some(session) => {
                session.last_seen = now;
                (
                    session.device_id.replace(device_id.to_string()),
                    std::mem::replace(&mut session.role, role.map(str::to_string)),
                    session.peer,
                )
            }
            None => return HelloOutcome::UnknownSession,
        };

        if previous_role.as_deref() != role {
            if let Some(old_role) = previous_role {
                self.leave_role(&old_role, id);
            }
            if let Some(new_role) = role {
                self.roles.entry(new_role.to_string()).or_default().insert(id.clone());
            }
        }

        if let Some(old_device) = previous_device.filter(|d| d != device_id) {
            if self.devices.get(&old_device) == Some(id) {
                self.devices.remove(&old_device);
                self.directory.remove(&old_device);
            }
        }
        self.devices.insert(device_id.to_string(), id.clone());

        let ip = peer.map(|p| p.ip().to_string());
        self.directory.upsert(device_id, None, ip.as_deref());
        info!(
            "Hello from {} on session {} as {}",
            device_id,
            id,
            role.unwrap_or("(no role)")
        );
        HelloOutcome::Registered
    }

    /// Refreshes liveness. Returns `false` for unknown sessions.
    pub fn on_heartbeat(&mut self, id: &SessionId, now: Instant) -> bool {
        match self.sessions.get_mut(id) {
            Some(session) => {
                session.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Transport closed. Returns `false` if the session was already gone.
    pub fn on_close(&mut self, id: &SessionId) -> bool {
        match self.evict(id) {
            Some(session) => {
                info!(
                    "Session {} closed (robot {})",
                    id,
                    session.device_id.as_deref().unwrap_or("unknown")
                );
                true
            }
            None => false,
        }
    }

    /// Evicts every session whose last heartbeat is older than `timeout`.
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> Vec<SessionId> {
        let expired: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| now.saturating_duration_since(s.last_seen) > timeout)
            .map(|s| s.id.clone())
            .collect();

        let mut evicted = Vec::with_capacity(expired.len());
        for id in expired {
            let Some(session) = self.evict(&id) else {
                continue;
            };
            let age = now.saturating_duration_since(session.last_seen);
            warn!(
                "Missed heartbeat: robot {} session {} age {:.2}s > {:.2}s, removing",
                session.device_id.as_deref().unwrap_or("unknown"),
                id,
                age.as_secs_f64(),
                timeout.as_secs_f64()
            );
            session.link.close();
            evicted.push(id);
        }
        evicted
    }

    /// Closes and forgets every session, e.g. on shutdown.
    pub fn close_all(&mut self) {
        let ids: Vec<SessionId> = self.sessions.keys().cloned().collect();
        for id in ids {
            if let Some(session) = self.evict(&id) {
                session.link.close();
            }
        }
    }

    pub fn role_of(&self, id: &SessionId) -> Option<&str> {
        self.sessions.get(id).and_then(|s| s.role.as_deref())
    }

    pub fn device_of(&self, id: &SessionId) -> Option<&str> {
        self.sessions.get(id).and_then(|s| s.device_id.as_deref())
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn role_members(&self, role: &str) -> usize {
        self.roles.get(role).map_or(0, HashSet::len)
    }

    pub fn role_counts(&self) -> Vec<RoleCount> {
        let mut counts: Vec<RoleCount> = self
            .roles
            .iter()
            .map(|(role, members)| RoleCount {
                role: role.clone(),
                sessions: members.len(),
            })
            .collect();
        counts.sort_by(|a, b| a.role.cmp(&b.role));
        counts
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn summaries(&self, now: Instant) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .values()
            .map(|s| SessionSummary {
                session_id: s.id.to_string(),
                device_id: s.device_id.clone(),
                role: s.role.clone(),
                peer: s.peer.map(|p| p.to_string()),
                connected_ms: now.saturating_duration_since(s.opened_at).as_millis() as u64,
                last_seen_ms: now.saturating_duration_since(s.last_seen).as_millis() as u64,
            })
            .collect();
        summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        summaries
    }

    /// The single removal path: session map, role-set, device index, directory.
    fn evict(&mut self, id: &SessionId) -> Option<Session> {
        let (session, owned_device) = self.detach(id)?;
        if let Some(device_id) = owned_device {
            self.directory.remove(&device_id);
        }
        Some(session)
    }

    /// Removes a session from every index, returning the device id it still
    /// owned. The directory is left alone.
    fn detach(&mut self, id: &SessionId) -> Option<(Session, Option<String>)> {
        let session = self.sessions.remove(id)?;
        if let Some(role) = &session.role {
            self.leave_role(role, id);
        }
        let owned_device = session
            .device_id
            .as_ref()
            .filter(|device_id| self.devices.get(*device_id) == Some(id))
            .cloned();
        if let Some(device_id) = &owned_device {
            self.devices.remove(device_id);
        }
        debug!("Session {} detached", id);
        Some((session, owned_device))
    }

    fn leave_role(&mut self, role: &str, id: &SessionId) {
        if let Some(members) = self.roles.get_mut(role) {
            members.remove(id);
            if members.is_empty() {
                self.roles.remove(role);
            }
        }
    }
}
