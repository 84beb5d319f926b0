//! Simulated robot: finds the host over UDP, holds a session, and answers scan
//! commands the way the board and tank firmware do.

pub mod config;
pub mod responder;
pub mod sim;

pub use config::{RobotConfig, RobotKind};
pub use responder::Responder;
pub use sim::RobotSim;
