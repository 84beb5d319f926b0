//! Discovery: robots broadcast an announce datagram and get the session URL back.

mod responder;

pub use responder::{DiscoveryHandle, DiscoveryResponder};
