pub mod error;
pub mod types;
pub mod config;
pub mod protocol;

pub use error::{FleetError, Result};
pub use types::*;
pub use config::*;
pub use protocol::{DiscoveryAnnounce, DiscoveryReply, HostCommand, RobotMessage};
