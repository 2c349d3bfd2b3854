// Density targets: how many hits a role should have in a bar.
//
// Selection treats the target as an opaque count; this module is the
// stock way of producing one. `EnergyDensity` starts from a per-role rate
// in hits per beat, scales it linearly with the bar's energy, and boosts
// fill voices (snare, toms) inside fill windows.

use crate::bar::{Bar, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source of per-(bar, role) density targets.
pub trait DensityCalculator: Send + Sync {
    fn target(&self, bar: &Bar, role: &Role) -> usize;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyDensity {
    /// Hits per beat at energy 0.5. Roles not listed get 0.
    pub hits_per_beat: BTreeMap<Role, f64>,
    /// Multiplier at energy 0.0.
    pub low_scale: f64,
    /// Multiplier at energy 1.0.
    pub high_scale: f64,
    /// Extra multiplier for fill voices in a fill window.
    pub fill_boost: f64,
}

impl Default for EnergyDensity {
    fn default() -> Self {
        EnergyDensity {
            hits_per_beat: [
                (Role::Kick, 0.75),
                (Role::Snare, 0.75),
                (Role::ClosedHat, 2.0),
                (Role::OpenHat, 0.25),
                (Role::Ride, 2.0),
                (Role::Crash, 0.25),
                (Role::HighTom, 0.25),
                (Role::MidTom, 0.25),
                (Role::FloorTom, 0.25),
            ]
            .into_iter()
            .collect(),
            low_scale: 0.5,
            high_scale: 1.5,
            fill_boost: 3.0,
        }
    }
}

impl EnergyDensity {
    pub fn with_rate(mut self, role: Role, hits_per_beat: f64) -> Self {
        self.hits_per_beat.insert(role, hits_per_beat);
        self
    }

    fn is_fill_voice(role: &Role) -> bool {
        matches!(role, Role::Snare | Role::HighTom | Role::MidTom | Role::FloorTom)
    }
}

impl DensityCalculator for EnergyDensity {
    fn target(&self, bar: &Bar, role: &Role) -> usize {
        let rate = self.hits_per_beat.get(role).copied().unwrap_or(0.0);
        let scale = self.low_scale + (self.high_scale - self.low_scale) * bar.energy_level;
        let mut target = rate * bar.beats_per_bar as f64 * scale;
        if bar.is_fill_window && EnergyDensity::is_fill_voice(role) {
            target *= self.fill_boost;
        }
        if target.is_finite() && target > 0.0 {
            target.round() as usize
        } else {
            0
        }
    }
}

/// A fixed target for every role. Handy in tests and for callers that
/// compute density elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedDensity(pub usize);

impl DensityCalculator for FixedDensity {
    fn target(&self, _bar: &Bar, _role: &Role) -> usize {
        self.0
    }
}
