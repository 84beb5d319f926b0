use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::error::FleetError;

/// One of the eight 45°-spaced directions used for emitting and for reporting hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sector {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Sector {
    /// The sector ring in emission order.
    pub const ALL: [Sector; 8] = [
        Sector::N,
        Sector::NE,
        Sector::E,
        Sector::SE,
        Sector::S,
        Sector::SW,
        Sector::W,
        Sector::NW,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Ring position modulo 8.
    pub fn from_index(index: usize) -> Sector {
        Self::ALL[index % 8]
    }

    pub fn bearing_deg(self) -> f64 {
        self.index() as f64 * 45.0
    }

    pub fn label(self) -> &'static str {
        match self {
            Sector::N => "N",
            Sector::NE => "NE",
            Sector::E => "E",
            Sector::SE => "SE",
            Sector::S => "S",
            Sector::SW => "SW",
            Sector::W => "W",
            Sector::NW => "NW",
        }
    }

    /// Smallest angular distance to `bearing_deg`, in degrees.
    pub fn distance_to(self, bearing_deg: f64) -> f64 {
        let diff = (self.bearing_deg() - bearing_deg).rem_euclid(360.0);
        diff.min(360.0 - diff)
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Sector {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sector::ALL
            .iter()
            .copied()
            .find(|sector| sector.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FleetError::ProtocolError(format!("unknown sector label {:?}", s)))
    }
}
