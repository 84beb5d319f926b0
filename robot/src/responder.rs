use common::{HostCommand, RobotMessage, Sector};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::config::{RobotConfig, RobotKind};

/// Sectors within this many degrees of the source count as hits.
const HIT_HALF_WIDTH_DEG: f64 = 45.0;

/// Firmware behaviour without the network: one command in, replies out.
pub struct Responder {
    kind: RobotKind,
    source_bearing: f64,
    dropout: f64,
    rng: StdRng,
    listening: bool,
    motors_on: bool,
    carrier_on: bool,
    marks: Vec<Sector>,
}

impl Responder {
    pub fn new(config: &RobotConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            kind: config.kind,
            source_bearing: config.source_bearing,
            dropout: config.dropout.clamp(0.0, 1.0),
            rng,
            listening: false,
            motors_on: true,
            carrier_on: false,
            marks: Vec::new(),
        }
    }

    pub fn motors_on(&self) -> bool {
        self.motors_on
    }

    pub fn carrier_on(&self) -> bool {
        self.carrier_on
    }

    pub fn respond(&mut self, command: &HostCommand) -> Vec<RobotMessage> {
        match self.kind {
            RobotKind::Board => self.board(command),
            RobotKind::Tank => self.tank(command),
            RobotKind::Idle => Vec::new(),
        }
    }

    fn board(&mut self, command: &HostCommand) -> Vec<RobotMessage> {
        match command {
            HostCommand::ListenPrepare => {
                self.listening = true;
                self.motors_on = false;
                self.marks.clear();
                vec![RobotMessage::Ready]
            }
            HostCommand::Mark { dir } if self.listening => {
                self.marks.push(*dir);
                Vec::new()
            }
            HostCommand::ListenFinish => {
                self.listening = false;
                let marks = std::mem::take(&mut self.marks);
                let hits: Vec<String> = marks
                    .into_iter()
                    .filter(|dir| dir.distance_to(self.source_bearing) <= HIT_HALF_WIDTH_DEG)
                    .filter(|_| !self.rng.gen_bool(self.dropout))
                    .map(|dir| dir.label().to_string())
                    .collect();
                info!("Reporting hits {:?}", hits);
                vec![RobotMessage::ScanResults { hits }]
            }
            HostCommand::MotorsOn => {
                self.motors_on = true;
                Vec::new()
            }
            other => {
                debug!("Board ignoring {:?}", other);
                Vec::new()
            }
        }
    }

    fn tank(&mut self, command: &HostCommand) -> Vec<RobotMessage> {
        match command {
            HostCommand::CarrierOn => {
                self.carrier_on = true;
                Vec::new()
            }
            HostCommand::CarrierOff => {
                self.carrier_on = false;
                Vec::new()
            }
            HostCommand::Emit { dir } => {
                debug!("Emitting toward {} (carrier {})", dir, self.carrier_on);
                vec![RobotMessage::EmitDone]
            }
            HostCommand::Drive { left, right } => {
                debug!("Drive left={:.2} right={:.2}", left, right);
                Vec::new()
            }
            HostCommand::Turret { speed } => {
                debug!("Turret speed={:.2}", speed);
                Vec::new()
            }
            other => {
                debug!("Tank ignoring {:?}", other);
                Vec::new()
            }
        }
    }
}
