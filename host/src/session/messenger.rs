use std::sync::Arc;
use common::HostCommand;
use log::{debug, error};
use super::{SessionId, SessionRegistry};

/// Sends one command to every live session holding a role.
pub trait RoleSender {
    /// Returns how many sessions were addressed; zero when the role is empty.
    fn send_to_role(&mut self, role: &str, command: &HostCommand) -> usize;
}

impl SessionRegistry {
    /// Sends an already-encoded payload to a point-in-time copy of the role-set.
    pub fn send_text_to_role(&self, role: &str, text: Arc<str>) -> usize {
        let targets: Vec<SessionId> = match self.roles.get(role) {
            Some(members) => members.iter().cloned().collect(),
            None => return 0,
        };

        for id in &targets {
            let delivered = self
                .get(id)
                .map(|session| session.link.send_text(Arc::clone(&text)))
                .unwrap_or(false);
            if !delivered {
                debug!("Dropped message to {} on session {}", role, id);
            }
        }
        targets.len()
    }
}

impl RoleSender for SessionRegistry {
    fn send_to_role(&mut self, role: &str, command: &HostCommand) -> usize {
        let text: Arc<str> = match command.encode() {
            Ok(text) => Arc::from(text),
            Err(e) => {
                error!("Failed to encode {:?}: {}", command, e);
                return 0;
            }
        };
        let addressed = self.send_text_to_role(role, text);
        debug!("Sent {:?} to {} session(s) of {}", command, addressed, role);
        addressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::registry::tests::{lobby_registry, open};
    use crate::session::LinkMessage;
    use common::Sector;
    use tokio::time::Instant;

    #[test]
    fn test_send_to_empty_role_has_no_side_effects() {
        let (mut registry, directory, _phase) = lobby_registry();
        let now = Instant::now();
        let mut rx = open(&mut registry, "s1", now);

        assert_eq!(registry.send_to_role("test_board", &HostCommand::ListenPrepare), 0);
        assert!(rx.try_recv().is_err());
        assert!(directory.ops.lock().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_send_reaches_every_member_once() {
        let (mut registry, _directory, _phase) = lobby_registry();
        let now = Instant::now();
        let mut a = open(&mut registry, "a", now);
        let mut b = open(&mut registry, "b", now);
        let mut c = open(&mut registry, "c", now);
        registry.on_hello(&"a".into(), "bot-a", Some("robot_tank"), now);
        registry.on_hello(&"b".into(), "bot-b", Some("robot_tank"), now);
        registry.on_hello(&"c".into(), "bot-c", Some("test_board"), now);

        let sent = registry.send_to_role("robot_tank", &HostCommand::Emit { dir: Sector::SW });
        assert_eq!(sent, 2);
        let expected = LinkMessage::Text(Arc::from(r#"{"cmd":"emit","dir":"SW"}"#));
        assert_eq!(a.try_recv().unwrap(), expected);
        assert_eq!(b.try_recv().unwrap(), expected);
        assert!(a.try_recv().is_err());
        assert!(c.try_recv().is_err());
    }

    #[test]
    fn test_failed_delivery_does_not_stop_others() {
        let (mut registry, _directory, _phase) = lobby_registry();
        let now = Instant::now();
        let dead = open(&mut registry, "dead", now);
        let mut live = open(&mut registry, "live", now);
        registry.on_hello(&"dead".into(), "bot-1", Some("robot_tank"), now);
        registry.on_hello(&"live".into(), "bot-2", Some("robot_tank"), now);
        drop(dead);

        assert_eq!(registry.send_to_role("robot_tank", &HostCommand::CarrierOn), 2);
        assert_eq!(
            live.try_recv().unwrap(),
            LinkMessage::Text(Arc::from(r#"{"cmd":"carrier_on"}"#))
        );
    }

    #[test]
    fn test_roleless_sessions_are_never_addressed() {
        let (mut registry, _directory, _phase) = lobby_registry();
        let now = Instant::now();
        let mut rx = open(&mut registry, "s1", now);
        registry.on_hello(&"s1".into(), "bot-1", None, now);
        assert_eq!(registry.send_to_role("", &HostCommand::MotorsOn), 0);
        assert!(rx.try_recv().is_err());
    }
}
