//! Latest camera frame received from any robot.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// One binary frame as received; the payload is treated as an opaque JPEG.
#[derive(Debug, Clone)]
pub struct Frame {
    pub session_id: String,
    pub device_id: Option<String>,
    pub received_at: DateTime<Utc>,
    pub data: Arc<[u8]>,
}

#[derive(Clone, Default)]
pub struct FrameStore {
    latest: Arc<RwLock<Option<Frame>>>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, frame: Frame) {
        *self.latest.write() = Some(frame);
    }

    pub fn latest(&self) -> Option<Frame> {
        self.latest.read().clone()
    }

    /// Drops the frame if it came from `session_id`.
    pub fn forget_session(&self, session_id: &str) {
        let mut latest = self.latest.write();
        if latest.as_ref().map_or(false, |f| f.session_id == session_id) {
            *latest = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(session: &str, bytes: &[u8]) -> Frame {
        Frame {
            session_id: session.to_string(),
            device_id: None,
            received_at: Utc::now(),
            data: Arc::from(bytes),
        }
    }

    #[test]
    fn test_latest_frame_wins() {
        let store = FrameStore::new();
        assert!(store.latest().is_none());
        store.store(frame("a", &[0xff, 0xd8]));
        store.store(frame("b", &[0xff, 0xd9]));
        assert_eq!(&*store.latest().unwrap().data, &[0xff, 0xd9]);
    }

    #[test]
    fn test_forget_only_matching_session() {
        let store = FrameStore::new();
        store.store(frame("a", &[1]));
        store.forget_session("b");
        assert!(store.latest().is_some());
        store.forget_session("a");
        assert!(store.latest().is_none());
    }
}
