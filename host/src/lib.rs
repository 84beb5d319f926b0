pub mod directory;
pub mod discovery;
pub mod frames;
pub mod host;
pub mod models;
pub mod phase;
pub mod scan;
pub mod server;
pub mod session;

pub use directory::{InMemoryDirectory, RobotDirectory, RobotInfo};
pub use host::{Host, HostEvent, HostHandle};
pub use phase::{GamePhase, PhaseGate};
pub use server::FleetServer;
