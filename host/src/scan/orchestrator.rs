//! Scan orchestration
//!
//! Drives one 8-direction emit/listen cycle across the board and tank roles.
//! The orchestrator never blocks: the host loop calls [`ScanOrchestrator::step`]
//! on every tick and after every inbound message, and each wait is a deadline
//! compared against the clock it is handed. The settle pauses after
//! `carrier_on` and before each `mark` last one full tick no matter how often
//! `step` is called.

use std::collections::BTreeSet;
use chrono::Utc;
use common::{HostCommand, RobotMessage, ScanConfig, Sector};
use log::{debug, info};
use serde::Serialize;
use tokio::time::Instant;
use crate::models::ScanReport;
use crate::session::RoleSender;
use super::estimator::estimate_direction;

/// Where the running scan is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    /// `listen_prepare` sent, waiting for `ready`.
    Preparing { deadline: Instant },
    /// `carrier_on` sent; the first emit goes out once `not_before` passes.
    CarrierSettling { not_before: Instant },
    /// `emit` sent for `index`, waiting for `emit_done`.
    Emitting { index: usize, deadline: Instant },
    /// Emit finished for `index`; `mark` goes out once `not_before` passes.
    Marking { index: usize, not_before: Instant },
    /// `listen_finish` sent, waiting for `scan_results`.
    Finishing { deadline: Instant },
}

/// Acknowledgement flags, each set only by its expected role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseFlags {
    pub ready: bool,
    pub emit_done: bool,
    pub results_received: bool,
}

/// Bookkeeping for the run in progress
#[derive(Debug)]
struct RunStats {
    started: Instant,
    started_at: chrono::DateTime<Utc>,
    ready_acked: bool,
    emit_acks: usize,
}

/// Single-flight scan state machine
pub struct ScanOrchestrator {
    /// Roles and timeouts
    config: ScanConfig,
    /// Current state
    phase: ScanPhase,
    /// Flags set by inbound acknowledgements
    flags: PhaseFlags,
    /// Sectors reported by the board's results
    hits: BTreeSet<Sector>,
    /// Present while a run is in progress
    run: Option<RunStats>,
}

impl ScanOrchestrator {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            phase: ScanPhase::Idle,
            flags: PhaseFlags::default(),
            hits: BTreeSet::new(),
            run: None,
        }
    }

    pub fn in_progress(&self) -> bool {
        self.phase != ScanPhase::Idle
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn flags(&self) -> PhaseFlags {
        self.flags
    }

    pub fn hits(&self) -> Vec<Sector> {
        self.hits.iter().copied().collect()
    }

    /// Sector currently being emitted or marked.
    pub fn current_sector(&self) -> Option<Sector> {
        match self.phase {
            ScanPhase::Emitting { index, .. } | ScanPhase::Marking { index, .. } => Some(Sector::from_index(index)),
            _ => None,
        }
    }

    /// Starts a scan. Returns `false`, sending nothing, when one is already running.
    pub fn start(&mut self, now: Instant, out: &mut impl RoleSender) -> bool {
        if self.in_progress() {
            debug!("Scan already in progress, ignoring start");
            return false;
        }

        self.flags = PhaseFlags::default();
        self.hits.clear();
        self.run = Some(RunStats {
            started: now,
            started_at: Utc::now(),
            ready_acked: false,
            emit_acks: 0,
        });

        let boards = out.send_to_role(&self.config.board_role, &HostCommand::ListenPrepare);
        info!("Scan started, {} {} session(s) preparing to listen", boards, self.config.board_role);
        self.phase = ScanPhase::Preparing {
            deadline: now + self.config.ack_timeout,
        };
        true
    }

    /// Applies an inbound message from a session holding `role`.
    ///
    /// Returns `true` if a flag or the hit set changed. Messages from the wrong
    /// role, or while idle, are ignored.
    pub fn on_message(&mut self, role: Option<&str>, message: &RobotMessage) -> bool {
        if !self.in_progress() {
            return false;
        }
        let from_board = role == Some(self.config.board_role.as_str());
        let from_tank = role == Some(self.config.tank_role.as_str());

        match message {
            RobotMessage::Ready if from_board => {
                self.flags.ready = true;
                true
            }
            RobotMessage::EmitDone | RobotMessage::HitDetectDone if from_tank => {
                self.flags.emit_done = true;
                true
            }
            RobotMessage::ScanResults { hits } if from_board => {
                self.hits = RobotMessage::hit_sectors(hits).into_iter().collect();
                self.flags.results_received = true;
                debug!("Scan results: {:?}", self.hits);
                true
            }
            _ => false,
        }
    }

    /// Advances the state machine as far as `now` allows.
    ///
    /// Returns the report when the run finishes on this step.
    pub fn step(&mut self, now: Instant, out: &mut impl RoleSender) -> Option<ScanReport> {
        match self.phase {
            ScanPhase::Idle => None,
            ScanPhase::Preparing { deadline } => {
                if !self.flags.ready && now < deadline {
                    return None;
                }
                if self.flags.ready {
                    if let Some(run) = self.run.as_mut() {
                        run.ready_acked = true;
                    }
                } else {
                    debug!("No ready from {}, continuing", self.config.board_role);
                }
                out.send_to_role(&self.config.tank_role, &HostCommand::CarrierOn);
                self.phase = ScanPhase::CarrierSettling {
                    not_before: now + self.config.tick,
                };
                None
            }
            ScanPhase::CarrierSettling { not_before } => {
                if now < not_before {
                    return None;
                }
                self.emit(0, now, out);
                None
            }
            ScanPhase::Emitting { index, deadline } => {
                if !self.flags.emit_done && now < deadline {
                    return None;
                }
                if self.flags.emit_done {
                    if let Some(run) = self.run.as_mut() {
                        run.emit_acks += 1;
                    }
                } else {
                    debug!("No emit_done for {}, continuing", Sector::from_index(index));
                }
                self.phase = ScanPhase::Marking {
                    index,
                    not_before: now + self.config.tick,
                };
                None
            }
            ScanPhase::Marking { index, not_before } => {
                if now < not_before {
                    return None;
                }
                let dir = Sector::from_index(index);
                out.send_to_role(&self.config.board_role, &HostCommand::Mark { dir });
                if index + 1 < Sector::ALL.len() {
                    self.emit(index + 1, now, out);
                } else {
                    self.flags.results_received = false;
                    self.hits.clear();
                    out.send_to_role(&self.config.board_role, &HostCommand::ListenFinish);
                    self.phase = ScanPhase::Finishing {
                        deadline: now + self.config.result_timeout,
                    };
                }
                None
            }
            ScanPhase::Finishing { deadline } => {
                if !self.flags.results_received && now < deadline {
                    return None;
                }
                Some(self.finish(now, out))
            }
        }
    }

    fn emit(&mut self, index: usize, now: Instant, out: &mut impl RoleSender) {
        let dir = Sector::from_index(index);
        self.flags.emit_done = false;
        out.send_to_role(&self.config.tank_role, &HostCommand::Emit { dir });
        debug!("Emitting {}", dir);
        self.phase = ScanPhase::Emitting {
            index,
            deadline: now + self.config.emit_timeout,
        };
    }

    fn finish(&mut self, now: Instant, out: &mut impl RoleSender) -> ScanReport {
        out.send_to_role(&self.config.board_role, &HostCommand::MotorsOn);
        out.send_to_role(&self.config.tank_role, &HostCommand::CarrierOff);

        let hits = self.hits();
        let estimate = estimate_direction(&hits);
        let run = self.run.take();
        let report = ScanReport {
            hits,
            estimate,
            ready_acked: run.as_ref().map_or(false, |r| r.ready_acked),
            emit_acks: run.as_ref().map_or(0, |r| r.emit_acks),
            results_received: self.flags.results_received,
            started_at: run.as_ref().map_or_else(Utc::now, |r| r.started_at),
            duration_ms: run
                .as_ref()
                .map_or(0, |r| now.saturating_duration_since(r.started).as_millis() as u64),
        };
        self.phase = ScanPhase::Idle;
        info!(
            "Scan finished: estimate {} from hits {:?} ({} of 8 emits acknowledged)",
            report.estimate, report.hits, report.emit_acks
        );
        report
    }
}
