// Per-bar context and the positional vocabulary shared by every module.
//
// A `Bar` is produced upstream by the arrangement layer (or by `song.rs` in
// this repo's CLI) and is read-only to the generator. Everything an
// operator may react to lives here: meter, backbeat positions, section
// type and boundaries, fill window, energy, the active-role set, and the
// seed that drives all hash-based variation.
//
// Positions are `Beat`s: fixed-point, 1/480 of a beat per unit, counted
// from beat 1. Integer positions keep `(bar, beat, role)` keys exact and
// totally ordered, and 480 divides evenly into straight and triplet grids
// down to 32nd notes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// Fixed-point units per beat.
pub const BEAT_DIVISIONS: i64 = 480;
pub const EIGHTH: i64 = BEAT_DIVISIONS / 2;
pub const SIXTEENTH: i64 = BEAT_DIVISIONS / 4;
pub const TRIPLET: i64 = BEAT_DIVISIONS / 3;

// ---------------------------------------------------------------------------
// Beat
// ---------------------------------------------------------------------------

/// A 1-based position inside a bar. `Beat::whole(1)` is the downbeat.
///
/// Stored as signed units from beat 1 so that malformed operator output
/// (a position before the bar starts) is representable and can be rejected
/// by validation instead of wrapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Beat(i64);

impl Beat {
    pub const DOWNBEAT: Beat = Beat(0);

    pub const fn from_units(units: i64) -> Self {
        Self(units)
    }

    /// Beat `n` exactly (1-based).
    pub const fn whole(n: u32) -> Self {
        Self((n as i64 - 1) * BEAT_DIVISIONS)
    }

    /// Beat `n` plus `units` (e.g. `Beat::at(2, EIGHTH)` is beat 2.5).
    pub const fn at(n: u32, units: i64) -> Self {
        Self((n as i64 - 1) * BEAT_DIVISIONS + units)
    }

    /// Nearest fixed-point position to a decimal beat such as `2.5`.
    pub fn from_f64(beat: f64) -> Self {
        Self(((beat - 1.0) * BEAT_DIVISIONS as f64).round() as i64)
    }

    pub const fn units(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        1.0 + self.0 as f64 / BEAT_DIVISIONS as f64
    }

    #[must_use]
    pub const fn offset(self, units: i64) -> Self {
        Self(self.0 + units)
    }

    pub const fn is_whole(self) -> bool {
        self.0.rem_euclid(BEAT_DIVISIONS) == 0
    }

    /// The 1-based whole beat this position falls in.
    pub const fn whole_beat(self) -> i64 {
        self.0.div_euclid(BEAT_DIVISIONS) + 1
    }

    /// Units past the enclosing whole beat, in `[0, BEAT_DIVISIONS)`.
    pub const fn fraction_units(self) -> i64 {
        self.0.rem_euclid(BEAT_DIVISIONS)
    }
}

impl fmt::Display for Beat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_whole() {
            return write!(f, "{}", self.whole_beat());
        }
        let text = format!("{:.3}", self.as_f64());
        write!(f, "{}", text.trim_end_matches('0'))
    }
}

// ---------------------------------------------------------------------------
// Roles and onset classification
// ---------------------------------------------------------------------------

/// An instrument lane. The named variants are the kit pieces the limb
/// model knows about; `Custom` carries lanes (percussion overdubs, a bass
/// line) that pass through generation but are skipped by physicality checks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Kick,
    Snare,
    ClosedHat,
    OpenHat,
    PedalHat,
    Ride,
    Crash,
    HighTom,
    MidTom,
    FloorTom,
    Custom(String),
}

impl Role {
    pub const KIT: [Role; 10] = [
        Role::Kick,
        Role::Snare,
        Role::ClosedHat,
        Role::OpenHat,
        Role::PedalHat,
        Role::Ride,
        Role::Crash,
        Role::HighTom,
        Role::MidTom,
        Role::FloorTom,
    ];

    pub fn name(&self) -> &str {
        match self {
            Role::Kick => "Kick",
            Role::Snare => "Snare",
            Role::ClosedHat => "ClosedHat",
            Role::OpenHat => "OpenHat",
            Role::PedalHat => "PedalHat",
            Role::Ride => "Ride",
            Role::Crash => "Crash",
            Role::HighTom => "HighTom",
            Role::MidTom => "MidTom",
            Role::FloorTom => "FloorTom",
            Role::Custom(name) => name,
        }
    }

    /// Parse a role name case-insensitively; unknown names become `Custom`.
    pub fn parse(name: &str) -> Role {
        Role::KIT
            .iter()
            .find(|r| r.name().eq_ignore_ascii_case(name))
            .cloned()
            .unwrap_or_else(|| Role::Custom(name.to_string()))
    }

    pub fn is_blank(&self) -> bool {
        self.name().trim().is_empty()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Serialize as the bare name so roles work as JSON map keys (per-role caps
// in `GrooveConfig`).
impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Role::parse(&s))
    }
}

/// Coarse rhythmic importance of an onset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strength {
    Downbeat,
    Backbeat,
    Strong,
    Offbeat,
    Pickup,
    Ghost,
}

impl Strength {
    /// Bucket implied by grid position alone. Ghosts are a dynamic choice
    /// and never come out of this; operators assign them explicitly.
    pub fn classify(beat: Beat, bar: &Bar) -> Strength {
        if beat == Beat::DOWNBEAT {
            Strength::Downbeat
        } else if beat.is_whole() && bar.is_backbeat(beat) {
            Strength::Backbeat
        } else if beat.is_whole() {
            Strength::Strong
        } else if beat.fraction_units() >= BEAT_DIVISIONS - SIXTEENTH {
            Strength::Pickup
        } else {
            Strength::Offbeat
        }
    }
}

/// Position of an onset within a fill gesture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FillRole {
    #[default]
    None,
    Setup,
    FillStart,
    FillBody,
    FillEnd,
}

impl FillRole {
    /// Fill endings land the phrase; pruning must keep them.
    pub fn is_protected(self) -> bool {
        matches!(self, FillRole::FillEnd)
    }
}

/// Playing technique hint carried through to the event layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Articulation {
    Flam,
    Drag,
    Rimshot,
    CrossStick,
    OpenHat,
    Choke,
    Bell,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SectionType {
    Intro,
    Verse,
    PreChorus,
    Chorus,
    Bridge,
    Breakdown,
    Outro,
}

impl SectionType {
    pub const ALL: [SectionType; 7] = [
        SectionType::Intro,
        SectionType::Verse,
        SectionType::PreChorus,
        SectionType::Chorus,
        SectionType::Bridge,
        SectionType::Breakdown,
        SectionType::Outro,
    ];

    pub fn parse(name: &str) -> Option<SectionType> {
        SectionType::ALL
            .into_iter()
            .find(|s| format!("{s:?}").eq_ignore_ascii_case(name))
    }
}

// ---------------------------------------------------------------------------
// Bar
// ---------------------------------------------------------------------------

/// Energy used when the arrangement layer does not supply one.
pub const DEFAULT_ENERGY: f64 = 0.5;

/// Immutable facts about one bar of one generation pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// 1-based bar index within the song.
    pub bar_number: u32,
    pub beats_per_bar: u32,
    /// Whole beats that carry the backbeat (2 and 4 in common time).
    pub backbeat_beats: BTreeSet<u32>,
    /// True on the first bar of a section.
    pub is_at_section_boundary: bool,
    /// True where a fill is musically expected (usually a section's last bar).
    pub is_fill_window: bool,
    /// 1 on the last bar of a section, 2 on the one before, and so on.
    pub bars_until_section_end: u32,
    pub section_type: SectionType,
    /// 0.0 (sparse) to 1.0 (full). Out-of-range input is clamped.
    pub energy_level: f64,
    /// Roles playing in this bar. Operators for other roles stay silent.
    pub active_roles: BTreeSet<Role>,
    pub seed: u64,
}

impl Bar {
    /// A verse bar with default backbeats, no boundary flags, default energy
    /// and the full kit active. Bar numbers and meters below 1 are raised to 1.
    pub fn new(bar_number: u32, beats_per_bar: u32, seed: u64) -> Self {
        let beats_per_bar = beats_per_bar.max(1);
        Bar {
            bar_number: bar_number.max(1),
            beats_per_bar,
            backbeat_beats: default_backbeats(beats_per_bar),
            is_at_section_boundary: false,
            is_fill_window: false,
            bars_until_section_end: 1,
            section_type: SectionType::Verse,
            energy_level: DEFAULT_ENERGY,
            active_roles: Role::KIT.into_iter().collect(),
            seed,
        }
    }

    pub fn with_section(mut self, section_type: SectionType) -> Self {
        self.section_type = section_type;
        self
    }

    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy_level = if energy.is_finite() { energy.clamp(0.0, 1.0) } else { DEFAULT_ENERGY };
        self
    }

    pub fn with_fill_window(mut self, is_fill_window: bool) -> Self {
        self.is_fill_window = is_fill_window;
        self
    }

    pub fn with_section_boundary(mut self, is_at_boundary: bool) -> Self {
        self.is_at_section_boundary = is_at_boundary;
        self
    }

    pub fn with_bars_until_section_end(mut self, bars: u32) -> Self {
        self.bars_until_section_end = bars;
        self
    }

    pub fn with_active_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.active_roles = roles.into_iter().collect();
        self
    }

    pub fn with_backbeats(mut self, beats: impl IntoIterator<Item = u32>) -> Self {
        self.backbeat_beats = beats.into_iter().collect();
        self
    }

    /// True for positions in `[1, beats_per_bar + 1)`.
    pub fn contains(&self, beat: Beat) -> bool {
        beat.units() >= 0 && beat.units() < self.beats_per_bar as i64 * BEAT_DIVISIONS
    }

    pub fn is_backbeat(&self, beat: Beat) -> bool {
        beat.is_whole() && self.backbeat_beats.contains(&(beat.whole_beat() as u32))
    }

    pub fn is_phrase_end(&self) -> bool {
        self.bars_until_section_end <= 1
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.active_roles.contains(role)
    }

    /// The last beat of the bar (e.g. beat 4 in 4/4).
    pub fn last_beat(&self) -> Beat {
        Beat::whole(self.beats_per_bar)
    }

    /// Every position on a grid of `step` units, in order.
    pub fn grid(&self, step: i64) -> impl Iterator<Item = Beat> + '_ {
        let end = self.beats_per_bar as i64 * BEAT_DIVISIONS;
        let step = step.max(1);
        (0..end).step_by(step as usize).map(Beat::from_units)
    }
}

fn default_backbeats(beats_per_bar: u32) -> BTreeSet<u32> {
    match beats_per_bar {
        1 => BTreeSet::new(),
        3 => [2, 3].into_iter().collect(),
        n => (2..=n).step_by(2).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beat_constructors_agree() {
        assert_eq!(Beat::whole(1), Beat::DOWNBEAT);
        assert_eq!(Beat::at(2, EIGHTH), Beat::from_f64(2.5));
        assert_eq!(Beat::whole(3).units(), 2 * BEAT_DIVISIONS);
        assert_eq!(Beat::at(1, TRIPLET), Beat::from_f64(1.0 + 1.0 / 3.0));
    }

    #[test]
    fn beat_display_is_one_based_decimal() {
        assert_eq!(Beat::whole(3).to_string(), "3");
        assert_eq!(Beat::at(2, EIGHTH).to_string(), "2.5");
        assert_eq!(Beat::at(4, 3 * SIXTEENTH).to_string(), "4.75");
        assert_eq!(Beat::at(1, TRIPLET).to_string(), "1.333");
    }

    #[test]
    fn whole_beat_and_fraction() {
        let b = Beat::at(3, SIXTEENTH);
        assert_eq!(b.whole_beat(), 3);
        assert_eq!(b.fraction_units(), SIXTEENTH);
        assert!(!b.is_whole());
        assert_eq!(Beat::from_units(-SIXTEENTH).whole_beat(), 0);
    }

    #[test]
    fn default_backbeats_by_meter() {
        assert_eq!(Bar::new(1, 4, 0).backbeat_beats, [2, 4].into_iter().collect());
        assert_eq!(Bar::new(1, 3, 0).backbeat_beats, [2, 3].into_iter().collect());
        assert_eq!(Bar::new(1, 6, 0).backbeat_beats, [2, 4, 6].into_iter().collect());
        assert!(Bar::new(1, 1, 0).backbeat_beats.is_empty());
    }

    #[test]
    fn bar_contains_only_its_own_span() {
        let bar = Bar::new(2, 4, 0);
        assert!(bar.contains(Beat::DOWNBEAT));
        assert!(bar.contains(Beat::at(4, 3 * SIXTEENTH)));
        assert!(!bar.contains(Beat::whole(5)));
        assert!(!bar.contains(Beat::from_units(-1)));
    }

    #[test]
    fn strength_classification() {
        let bar = Bar::new(1, 4, 0);
        assert_eq!(Strength::classify(Beat::whole(1), &bar), Strength::Downbeat);
        assert_eq!(Strength::classify(Beat::whole(2), &bar), Strength::Backbeat);
        assert_eq!(Strength::classify(Beat::whole(3), &bar), Strength::Strong);
        assert_eq!(Strength::classify(Beat::at(3, EIGHTH), &bar), Strength::Offbeat);
        assert_eq!(Strength::classify(Beat::at(4, 3 * SIXTEENTH), &bar), Strength::Pickup);
    }

    #[test]
    fn energy_is_clamped() {
        assert_eq!(Bar::new(1, 4, 0).with_energy(1.7).energy_level, 1.0);
        assert_eq!(Bar::new(1, 4, 0).with_energy(f64::NAN).energy_level, DEFAULT_ENERGY);
    }

    #[test]
    fn grid_walks_the_bar() {
        let bar = Bar::new(1, 2, 0);
        let eighths: Vec<Beat> = bar.grid(EIGHTH).collect();
        assert_eq!(eighths.len(), 4);
        assert_eq!(eighths[3], Beat::at(2, EIGHTH));
    }

    #[test]
    fn role_parse_roundtrip() {
        for role in Role::KIT {
            assert_eq!(Role::parse(role.name()), role);
        }
        assert_eq!(Role::parse("kick"), Role::Kick);
        assert_eq!(Role::parse("Shaker"), Role::Custom("Shaker".into()));
        assert!(Role::Custom("  ".into()).is_blank());
    }
}
