// Groove presets: the anchor layer under every bar.
//
// A preset is the fixed skeleton a style always plays (kick on one, snare
// on the backbeats, hats on the eighths...). Anchors are produced only for
// roles active in the bar, and their velocities are hashed from the bar's
// seed so repeated bars are not mechanically identical.

use crate::bar::{Bar, Beat, EIGHTH, Role};
use crate::onset::GrooveOnset;
use groove_prng::{hash_to_range, onset_hash};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroovePreset {
    /// Kick on 1 and 3, snare on the backbeats, eighth-note hats.
    #[default]
    Rock,
    /// Kick on 1, snare on the middle beat, eighth-note hats.
    HalfTime,
    /// Kick on every beat, snare on the backbeats, hats on the offbeats.
    FourOnFloor,
}

impl GroovePreset {
    pub const ALL: [GroovePreset; 3] = [GroovePreset::Rock, GroovePreset::HalfTime, GroovePreset::FourOnFloor];

    pub fn name(self) -> &'static str {
        match self {
            GroovePreset::Rock => "rock",
            GroovePreset::HalfTime => "half-time",
            GroovePreset::FourOnFloor => "four-on-floor",
        }
    }

    pub fn parse(name: &str) -> Option<GroovePreset> {
        let key = name.trim().to_ascii_lowercase().replace('_', "-");
        GroovePreset::ALL.into_iter().find(|p| p.name() == key)
    }

    /// Anchors for one role in `bar`. Empty if the role is inactive.
    pub fn anchors(self, bar: &Bar, role: &Role) -> Vec<GrooveOnset> {
        if !bar.has_role(role) {
            return Vec::new();
        }
        self.positions(bar, role)
            .into_iter()
            .map(|(beat, (lo, hi))| {
                let salt = format!("anchor/{role}");
                let h = onset_hash(bar.bar_number, beat.units(), bar.seed, &salt);
                GrooveOnset::anchor(bar, role.clone(), beat, hash_to_range(h, lo, hi) as u8)
            })
            .collect()
    }

    /// Anchors for every active role, ordered by role then beat.
    pub fn anchors_for_bar(self, bar: &Bar) -> Vec<GrooveOnset> {
        bar.active_roles.iter().flat_map(|role| self.anchors(bar, role)).collect()
    }

    /// Anchor positions with their velocity ranges.
    fn positions(self, bar: &Bar, role: &Role) -> Vec<(Beat, (u64, u64))> {
        let beats = bar.beats_per_bar;
        let middle = (beats >= 2 && beats % 2 == 0).then(|| beats / 2 + 1);
        match (self, role) {
            (GroovePreset::Rock, Role::Kick) => std::iter::once(1)
                .chain(middle)
                .map(|b| (Beat::whole(b), (104, 118)))
                .collect(),
            (GroovePreset::HalfTime, Role::Kick) => vec![(Beat::DOWNBEAT, (104, 118))],
            (GroovePreset::FourOnFloor, Role::Kick) => (1..=beats).map(|b| (Beat::whole(b), (100, 116))).collect(),

            (GroovePreset::HalfTime, Role::Snare) => middle
                .map(|b| (Beat::whole(b), (104, 120)))
                .into_iter()
                .collect(),
            (_, Role::Snare) => bar
                .backbeat_beats
                .iter()
                .filter(|&&b| b <= beats)
                .map(|&b| (Beat::whole(b), (98, 114)))
                .collect(),

            (GroovePreset::FourOnFloor, Role::ClosedHat) => {
                (1..=beats).map(|b| (Beat::at(b, EIGHTH), (70, 86))).collect()
            }
            (_, Role::ClosedHat) => bar
                .grid(EIGHTH)
                .map(|beat| {
                    let range = if beat.is_whole() { (78, 92) } else { (60, 74) };
                    (beat, range)
                })
                .collect(),

            (_, Role::Ride) => (1..=beats).step_by(2).map(|b| (Beat::whole(b), (76, 90))).collect(),

            _ => Vec::new(),
        }
    }
}
