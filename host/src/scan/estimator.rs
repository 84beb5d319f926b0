use common::Sector;
use serde::{Serialize, Serializer};
use std::f64::consts::FRAC_1_SQRT_2;
use std::fmt;

/// Best-guess incoming direction of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimate {
    Toward(Sector),
    Unknown,
}

impl Estimate {
    pub fn label(&self) -> &'static str {
        match self {
            Estimate::Toward(sector) => sector.label(),
            Estimate::Unknown => "unknown",
        }
    }

    pub fn sector(&self) -> Option<Sector> {
        match self {
            Estimate::Toward(sector) => Some(*sector),
            Estimate::Unknown => None,
        }
    }
}

impl fmt::Display for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Estimate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Unit vector of each sector as `(a, b)` pairs per axis, meaning `a + b/√2`.
/// Summing integers keeps opposite hits cancelling to an exact zero.
const UNIT: [((i32, i32), (i32, i32)); 8] = [
    ((0, 0), (1, 0)),   // N
    ((0, 1), (0, 1)),   // NE
    ((1, 0), (0, 0)),   // E
    ((0, 1), (0, -1)),  // SE
    ((0, 0), (-1, 0)),  // S
    ((0, -1), (0, -1)), // SW
    ((-1, 0), (0, 0)),  // W
    ((0, -1), (0, 1)),  // NW
];

/// Collapses the hit sectors of one scan into a single direction.
///
/// The longest circular run of adjacent hits wins when one of length two or
/// more exists (ties go to the run starting earliest on the ring); otherwise
/// every hit counts. The selected bearings are averaged as unit vectors and
/// the result snapped to the nearest sector. Bearings are compass style, so
/// N is 0° and E is 90°.
pub fn estimate_direction(hits: &[Sector]) -> Estimate {
    let mut present = [false; 8];
    for sector in hits {
        present[sector.index()] = true;
    }

    let selected: Vec<usize> = match longest_run(&present) {
        Some((start, len)) if len >= 2 => (start..start + len).map(|i| i % 8).collect(),
        _ => (0..8).filter(|&i| present[i]).collect(),
    };
    if selected.is_empty() {
        return Estimate::Unknown;
    }

    let (mut ex, mut ey) = ((0, 0), (0, 0));
    for &i in &selected {
        let (x, y) = UNIT[i];
        ex = (ex.0 + x.0, ex.1 + x.1);
        ey = (ey.0 + y.0, ey.1 + y.1);
    }
    if ex == (0, 0) && ey == (0, 0) {
        return Estimate::Unknown;
    }

    let x = ex.0 as f64 + ex.1 as f64 * FRAC_1_SQRT_2;
    let y = ey.0 as f64 + ey.1 as f64 * FRAC_1_SQRT_2;
    let bearing = x.atan2(y).to_degrees().rem_euclid(360.0);
    Estimate::Toward(snap(bearing))
}

/// Nearest sector, halfway bearings rounding clockwise.
fn snap(bearing: f64) -> Sector {
    let index = (bearing / 45.0 + 0.5 + 1e-9).floor() as usize;
    Sector::from_index(index)
}

/// `(start, len)` of the longest circular run of `true`, earliest start on ties.
fn longest_run(present: &[bool; 8]) -> Option<(usize, usize)> {
    if present.iter().all(|&p| p) {
        return Some((0, 8));
    }

    let mut best: Option<(usize, usize)> = None;
    for start in 0..8 {
        // Only begin at a run's first member so wrapped runs are counted once.
        if !present[start] || present[(start + 7) % 8] {
            continue;
        }
        let len = (0..8).take_while(|&k| present[(start + k) % 8]).count();
        if best.map_or(true, |(_, best_len)| len > best_len) {
            best = Some((start, len));
        }
    }
    best
}
