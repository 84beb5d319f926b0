//! The host loop
//!
//! One task owns the session registry and the scan orchestrator. Network
//! tasks and the HTTP API only talk to it through [`HostEvent`]s, which are
//! drained one at a time.

use std::net::SocketAddr;
use std::sync::Arc;
use chrono::Utc;
use common::{Config, FleetError, HostCommand, Result, RobotMessage};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use crate::directory::RobotDirectory;
use crate::discovery::{DiscoveryHandle, DiscoveryResponder};
use crate::frames::{Frame, FrameStore};
use crate::models::{HostStatus, ScanReport, SessionSummary};
use crate::phase::{GamePhase, PhaseGate};
use crate::scan::ScanOrchestrator;
use crate::session::{HelloOutcome, RoleSender, SessionId, SessionLink, SessionRegistry};

const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Everything that can happen to the host.
pub enum HostEvent {
    RobotAnnounced {
        robot_id: String,
        callsign: Option<String>,
        peer: SocketAddr,
    },
    SessionOpened {
        session_id: SessionId,
        peer: Option<SocketAddr>,
        link: SessionLink,
    },
    SessionText {
        session_id: SessionId,
        text: String,
    },
    SessionFrame {
        session_id: SessionId,
        data: Vec<u8>,
    },
    SessionClosed {
        session_id: SessionId,
    },
    Control(ControlRequest),
}

/// Requests from the control API, each answered on its own channel.
pub enum ControlRequest {
    StartScan { reply: oneshot::Sender<bool> },
    LastScan { reply: oneshot::Sender<Option<ScanReport>> },
    Status { reply: oneshot::Sender<HostStatus> },
    Sessions { reply: oneshot::Sender<Vec<SessionSummary>> },
    Drive { left: f32, right: f32, reply: oneshot::Sender<usize> },
    Turret { speed: f32, reply: oneshot::Sender<usize> },
}

/// Cloneable front door to a running [`Host`].
#[derive(Clone)]
pub struct HostHandle {
    events: mpsc::Sender<HostEvent>,
}

impl HostHandle {
    pub fn events(&self) -> mpsc::Sender<HostEvent> {
        self.events.clone()
    }

    /// Returns `false` if a scan was already running.
    pub async fn start_scan(&self) -> Result<bool> {
        self.request(|reply| ControlRequest::StartScan { reply }).await
    }

    pub async fn last_scan(&self) -> Result<Option<ScanReport>> {
        self.request(|reply| ControlRequest::LastScan { reply }).await
    }

    pub async fn status(&self) -> Result<HostStatus> {
        self.request(|reply| ControlRequest::Status { reply }).await
    }

    pub async fn sessions(&self) -> Result<Vec<SessionSummary>> {
        self.request(|reply| ControlRequest::Sessions { reply }).await
    }

    /// Returns how many sessions the command was sent to.
    pub async fn drive(&self, left: f32, right: f32) -> Result<usize> {
        self.request(|reply| ControlRequest::Drive { left, right, reply }).await
    }

    pub async fn turret(&self, speed: f32) -> Result<usize> {
        self.request(|reply| ControlRequest::Turret { speed, reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> ControlRequest) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(HostEvent::Control(make(tx)))
            .await
            .map_err(|_| FleetError::InternalError("host loop is not running".to_string()))?;
        rx.await
            .map_err(|_| FleetError::InternalError("host loop dropped the request".to_string()))
    }
}

/// Owner of all session and scan state.
pub struct Host {
    config: Config,
    registry: SessionRegistry,
    scanner: ScanOrchestrator,
    phase: PhaseGate,
    directory: Arc<dyn RobotDirectory>,
    frames: FrameStore,
    events_tx: mpsc::Sender<HostEvent>,
    events_rx: mpsc::Receiver<HostEvent>,
    discovery: Option<DiscoveryHandle>,
    last_report: Option<ScanReport>,
}

impl Host {
    pub fn new(config: Config, directory: Arc<dyn RobotDirectory>, phase: PhaseGate, frames: FrameStore) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        Self {
            registry: SessionRegistry::new(directory.clone(), phase.clone()),
            scanner: ScanOrchestrator::new(config.scan.clone()),
            config,
            phase,
            directory,
            frames,
            events_tx,
            events_rx,
            discovery: None,
            last_report: None,
        }
    }

    /// Port put into discovery replies, once the session endpoint knows it.
    pub fn advertise_session_port(&mut self, port: u16) {
        self.config.session.port = port;
    }

    pub fn handle(&self) -> HostHandle {
        HostHandle {
            events: self.events_tx.clone(),
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut phase_rx = self.phase.subscribe();
        let initial = *phase_rx.borrow_and_update();
        self.apply_phase(initial).await;

        let mut sweep = time::interval(self.config.session.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut scan_tick = time::interval(self.config.scan.tick);
        scan_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Host loop running in phase {}", initial);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(event) = self.events_rx.recv() => {
                    if let Err(e) = self.handle_event(event) {
                        warn!("Failed to handle event: {}", e);
                    }
                    self.step_scan();
                }
                _ = sweep.tick() => self.sweep(),
                _ = scan_tick.tick(), if self.scanner.in_progress() => self.step_scan(),
                changed = phase_rx.changed() => {
                    if changed.is_ok() {
                        let phase = *phase_rx.borrow_and_update();
                        self.apply_phase(phase).await;
                    }
                }
            }
        }

        if let Some(discovery) = self.discovery.take() {
            discovery.stop().await;
        }
        self.registry.close_all();
        info!("Host loop stopped");
    }

    fn handle_event(&mut self, event: HostEvent) -> Result<()> {
        let now = Instant::now();
        match event {
            HostEvent::RobotAnnounced { robot_id, callsign, peer } => {
                let ip = peer.ip().to_string();
                self.directory.upsert(&robot_id, callsign.as_deref(), Some(&ip));
            }
            HostEvent::SessionOpened { session_id, peer, link } => {
                self.registry.on_open(session_id, peer, link, now);
            }
            HostEvent::SessionText { session_id, text } => {
                self.handle_text(&session_id, &text, now);
            }
            HostEvent::SessionFrame { session_id, data } => {
                if self.registry.get(&session_id).is_none() {
                    debug!("Dropping frame from unknown session {}", session_id);
                    return Ok(());
                }
                self.frames.store(Frame {
                    session_id: session_id.to_string(),
                    device_id: self.registry.device_of(&session_id).map(str::to_string),
                    received_at: Utc::now(),
                    data: Arc::from(data),
                });
            }
            HostEvent::SessionClosed { session_id } => {
                self.registry.on_close(&session_id);
                self.frames.forget_session(session_id.as_str());
            }
            HostEvent::Control(request) => self.handle_control(request, now)?,
        }
        Ok(())
    }

    fn handle_text(&mut self, session_id: &SessionId, text: &str, now: Instant) {
        match RobotMessage::decode(text) {
            RobotMessage::Hello { id, role } => {
                if self.registry.on_hello(session_id, &id, role.as_deref(), now) == HelloOutcome::UnknownSession {
                    debug!("Hello on unknown session {}", session_id);
                }
            }
            RobotMessage::Hb => {
                self.registry.on_heartbeat(session_id, now);
            }
            RobotMessage::Unrecognized => {
                debug!("Dropping unrecognized message on session {}: {}", session_id, text);
            }
            message => {
                let role = self.registry.role_of(session_id);
                if !self.scanner.on_message(role, &message) {
                    debug!("Ignored {:?} from session {} ({:?})", message, session_id, role);
                }
            }
        }
    }

    fn handle_control(&mut self, request: ControlRequest, now: Instant) -> Result<()> {
        match request {
            ControlRequest::StartScan { reply } => {
                let started = self.scanner.start(now, &mut self.registry);
                respond(reply, started)
            }
            ControlRequest::LastScan { reply } => respond(reply, self.last_report.clone()),
            ControlRequest::Status { reply } => respond(reply, self.status()),
            ControlRequest::Sessions { reply } => respond(reply, self.registry.summaries(now)),
            ControlRequest::Drive { left, right, reply } => {
                let role = self.config.scan.drive_role.clone();
                let sent = self.registry.send_to_role(&role, &HostCommand::drive(left, right));
                respond(reply, sent)
            }
            ControlRequest::Turret { speed, reply } => {
                let role = self.config.scan.drive_role.clone();
                let sent = self.registry.send_to_role(&role, &HostCommand::turret(speed));
                respond(reply, sent)
            }
        }
    }

    fn status(&self) -> HostStatus {
        HostStatus {
            phase: self.phase.current(),
            sessions: self.registry.len(),
            roles: self.registry.role_counts(),
            scan_in_progress: self.scanner.in_progress(),
            scanning_sector: self.scanner.current_sector(),
            last_estimate: self.last_report.as_ref().map(|r| r.estimate),
            discovery_port: self.discovery.as_ref().map(|d| d.local_addr().port()),
        }
    }

    fn step_scan(&mut self) {
        if let Some(report) = self.scanner.step(Instant::now(), &mut self.registry) {
            self.last_report = Some(report);
        }
    }

    fn sweep(&mut self) {
        let evicted = self
            .registry
            .sweep(Instant::now(), self.config.session.heartbeat_timeout);
        for session_id in evicted {
            self.frames.forget_session(session_id.as_str());
        }
    }

    /// Opens or closes discovery to match the phase.
    async fn apply_phase(&mut self, phase: GamePhase) {
        if phase.is_discovery_open() {
            if self.discovery.is_some() {
                return;
            }
            match self.start_discovery().await {
                Ok(handle) => self.discovery = Some(handle),
                Err(e) => error!("Failed to start discovery: {}", e),
            }
        } else if let Some(discovery) = self.discovery.take() {
            discovery.stop().await;
        }
    }

    async fn start_discovery(&self) -> Result<DiscoveryHandle> {
        let responder =
            DiscoveryResponder::bind(&self.config.discovery, &self.config.session, self.events_tx.clone()).await?;
        let handle = responder.spawn()?;
        if self.config.session.port == 0 {
            warn!("Session port is 0; discovery replies will not be reachable");
        }
        Ok(handle)
    }
}

fn respond<T>(reply: oneshot::Sender<T>, value: T) -> Result<()> {
    reply
        .send(value)
        .map_err(|_| FleetError::InternalError("control caller went away".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::scan::Estimate;
    use crate::session::LinkMessage;
    use common::Sector;
    use std::time::Duration;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.discovery.port = 0;
        config.session.port = 18080;
        config
    }

    fn spawn_host(phase: GamePhase) -> (HostHandle, InMemoryDirectory, PhaseGate, CancellationToken) {
        let directory = InMemoryDirectory::new();
        let gate = PhaseGate::new(phase);
        let host = Host::new(test_config(), Arc::new(directory.clone()), gate.clone(), FrameStore::new());
        let handle = host.handle();
        let shutdown = CancellationToken::new();
        tokio::spawn(host.run(shutdown.clone()));
        (handle, directory, gate, shutdown)
    }

    async fn connect(handle: &HostHandle, id: &str) -> mpsc::Receiver<LinkMessage> {
        let (link, rx) = SessionLink::new();
        handle
            .events()
            .send(HostEvent::SessionOpened {
                session_id: SessionId::from(id),
                peer: Some("127.0.0.1:40000".parse().unwrap()),
                link,
            })
            .await
            .unwrap();
        rx
    }

    async fn say(handle: &HostHandle, id: &str, text: &str) {
        handle
            .events()
            .send(HostEvent::SessionText {
                session_id: SessionId::from(id),
                text: text.to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_session_is_swept() {
        let (handle, directory, _gate, shutdown) = spawn_host(GamePhase::Lobby);
        let mut rx = connect(&handle, "s1").await;
        say(&handle, "s1", r#"{"cmd":"hello","id":"bot-1","role":"robot_tank"}"#).await;

        assert_eq!(handle.sessions().await.unwrap().len(), 1);
        assert!(directory.get("bot-1").is_some());

        time::sleep(Duration::from_secs(8)).await;
        assert!(handle.sessions().await.unwrap().is_empty());
        assert!(directory.get("bot-1").is_none());
        assert_eq!(rx.recv().await, Some(LinkMessage::Close));
        shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_keep_session() {
        let (handle, _directory, _gate, shutdown) = spawn_host(GamePhase::Lobby);
        let _rx = connect(&handle, "s1").await;
        for _ in 0..10 {
            time::sleep(Duration::from_secs(2)).await;
            say(&handle, "s1", r#"{"cmd":"hb"}"#).await;
        }
        assert_eq!(handle.sessions().await.unwrap().len(), 1);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_hello_outside_lobby_is_rejected() {
        let (handle, directory, _gate, shutdown) = spawn_host(GamePhase::Playing);
        let mut rx = connect(&handle, "s1").await;
        say(&handle, "s1", r#"{"cmd":"hello","id":"bot-1","role":"robot_tank"}"#).await;
        assert_eq!(rx.recv().await, Some(LinkMessage::Close));
        assert!(directory.is_empty());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_drive_goes_to_drive_role() {
        let (handle, _directory, _gate, shutdown) = spawn_host(GamePhase::Lobby);
        let mut tank = connect(&handle, "tank").await;
        say(&handle, "tank", r#"{"cmd":"hello","id":"bot-1","role":"robot_tank"}"#).await;

        assert_eq!(handle.drive(2.0, -0.5).await.unwrap(), 1);
        match tank.recv().await {
            Some(LinkMessage::Text(text)) => {
                assert_eq!(HostCommand::decode(&text).unwrap(), HostCommand::Drive { left: 1.0, right: -0.5 });
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(handle.turret(0.25).await.unwrap(), 1);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_discovery_follows_phase() {
        let (handle, _directory, gate, shutdown) = spawn_host(GamePhase::MainMenu);
        assert_eq!(handle.status().await.unwrap().discovery_port, None);

        gate.go_to_lobby().unwrap();
        let mut port = None;
        for _ in 0..50 {
            port = handle.status().await.unwrap().discovery_port;
            if port.is_some() {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert!(port.is_some());

        gate.start_game().unwrap();
        for _ in 0..50 {
            port = handle.status().await.unwrap().discovery_port;
            if port.is_none() {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert!(port.is_none());
        shutdown.cancel();
    }

    /// Answers commands the way a board or tank would.
    fn spawn_fake_robot(handle: HostHandle, id: &'static str, mut rx: mpsc::Receiver<LinkMessage>, hits: Vec<&'static str>) {
        tokio::spawn(async move {
            while let Some(LinkMessage::Text(text)) = rx.recv().await {
                let reply = match HostCommand::decode(&text) {
                    Ok(HostCommand::ListenPrepare) => Some(r#"{"cmd":"ready"}"#.to_string()),
                    Ok(HostCommand::Emit { .. }) => Some(r#"{"cmd":"emit_done"}"#.to_string()),
                    Ok(HostCommand::ListenFinish) => Some(
                        RobotMessage::ScanResults {
                            hits: hits.iter().map(|h| h.to_string()).collect(),
                        }
                        .encode()
                        .unwrap(),
                    ),
                    _ => None,
                };
                if let Some(reply) = reply {
                    say(&handle, id, &reply).await;
                }
            }
        });
    }

    #[tokio::test]
    async fn test_scan_through_host_loop() {
        let (handle, _directory, _gate, shutdown) = spawn_host(GamePhase::Lobby);
        let board = connect(&handle, "board").await;
        let tank = connect(&handle, "tank").await;
        say(&handle, "board", r#"{"cmd":"hello","id":"bot-b","role":"test_board"}"#).await;
        say(&handle, "tank", r#"{"cmd":"hello","id":"bot-t","role":"robot_tank"}"#).await;
        spawn_fake_robot(handle.clone(), "board", board, vec!["E", "SE", "N"]);
        spawn_fake_robot(handle.clone(), "tank", tank, vec![]);

        assert!(handle.start_scan().await.unwrap());
        assert!(!handle.start_scan().await.unwrap());

        let mut report = None;
        for _ in 0..300 {
            report = handle.last_scan().await.unwrap();
            if report.is_some() {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        let report = report.expect("scan did not finish");
        assert_eq!(report.hits, vec![Sector::N, Sector::E, Sector::SE]);
        assert_eq!(report.estimate, Estimate::Toward(Sector::SE));
        assert!(report.ready_acked);
        assert_eq!(report.emit_acks, 8);
        assert!(!handle.status().await.unwrap().scan_in_progress);
        shutdown.cancel();
    }

    async fn next_command(rx: &mut mpsc::Receiver<LinkMessage>) -> HostCommand {
        match rx.recv().await {
            Some(LinkMessage::Text(text)) => HostCommand::decode(&text).unwrap(),
            other => panic!("expected a command, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_traffic_does_not_cut_settle_ticks() {
        let tick = test_config().scan.tick;
        let (handle, _directory, _gate, shutdown) = spawn_host(GamePhase::Lobby);
        let mut board = connect(&handle, "board").await;
        let mut tank = connect(&handle, "tank").await;
        let _camera = connect(&handle, "camera").await;
        say(&handle, "board", r#"{"cmd":"hello","id":"bot-b","role":"test_board"}"#).await;
        say(&handle, "tank", r#"{"cmd":"hello","id":"bot-t","role":"robot_tank"}"#).await;

        assert!(handle.start_scan().await.unwrap());
        assert_eq!(next_command(&mut board).await, HostCommand::ListenPrepare);
        say(&handle, "board", r#"{"cmd":"ready"}"#).await;
        say(&handle, "board", r#"{"cmd":"hb"}"#).await;

        assert_eq!(next_command(&mut tank).await, HostCommand::CarrierOn);
        let carrier_on = Instant::now();
        say(&handle, "board", r#"{"cmd":"hb"}"#).await;
        handle
            .events()
            .send(HostEvent::SessionFrame {
                session_id: SessionId::from("camera"),
                data: vec![0xff, 0xd8],
            })
            .await
            .unwrap();
        handle.status().await.unwrap();

        assert_eq!(next_command(&mut tank).await, HostCommand::Emit { dir: Sector::N });
        assert!(Instant::now() - carrier_on >= tick);

        say(&handle, "tank", r#"{"cmd":"emit_done"}"#).await;
        let emit_done = Instant::now();
        say(&handle, "board", r#"{"cmd":"hb"}"#).await;
        handle.sessions().await.unwrap();

        assert_eq!(next_command(&mut board).await, HostCommand::Mark { dir: Sector::N });
        assert!(Instant::now() - emit_done >= tick);
        assert_eq!(next_command(&mut tank).await, HostCommand::Emit { dir: Sector::NE });
        shutdown.cancel();
    }
}
