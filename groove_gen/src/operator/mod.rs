// Operators: pluggable strategies that propose onset candidates.
//
// An operator targets one role and belongs to one musical family. It
// decides whether it applies to a bar (`can_apply`) and, if so, yields a
// finite, restartable stream of candidates. Calling `generate_candidates`
// twice with the same bar and seed yields the same stream.
//
// Shared building blocks live here:
// - `Gate`: the common gating predicates (role active, energy window,
//   section allow-list, fill-window rule, minimum meter, phrase position).
// - `ScoreShaping`: base score with multiplicative boundary, phrase-end and
//   energy adjustments, clamped to [0, 1].
// - `VelocityRange` / `timing_nudge`: hash-derived hints, see `groove_prng`.
//
// The four families are in `micro_addition.rs`, `subdivision.rs`,
// `substitution.rs` and `punctuation.rs`. The registry (`registry.rs`)
// holds the concrete instances.

pub mod micro_addition;
pub mod punctuation;
pub mod subdivision;
pub mod substitution;

use crate::bar::{Bar, Beat, Role, SectionType};
use crate::candidate::OnsetCandidate;
use crate::error::OperatorError;
use groove_prng::{hash_to_range, hash_to_signed_range, hash_unit, onset_hash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Lazily produced candidates. An `Err` item aborts that operator's run.
pub type CandidateStream<'a> = Box<dyn Iterator<Item = Result<OnsetCandidate, OperatorError>> + 'a>;

/// Musical intent of an operator. Declaration order is the stable group order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperatorFamily {
    /// Single ornamental hits: ghost notes, pickups, barks.
    MicroAddition,
    /// Re-gridding a voice: sixteenths, triplets, thinning.
    SubdivisionTransform,
    /// Swapping in a different groove shape for a voice.
    PatternSubstitution,
    /// Marking phrase and section edges: crashes, setups, fills.
    PhrasePunctuation,
}

impl OperatorFamily {
    pub const ALL: [OperatorFamily; 4] = [
        OperatorFamily::MicroAddition,
        OperatorFamily::SubdivisionTransform,
        OperatorFamily::PatternSubstitution,
        OperatorFamily::PhrasePunctuation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OperatorFamily::MicroAddition => "MicroAddition",
            OperatorFamily::SubdivisionTransform => "SubdivisionTransform",
            OperatorFamily::PatternSubstitution => "PatternSubstitution",
            OperatorFamily::PhrasePunctuation => "PhrasePunctuation",
        }
    }

    /// Tag stamped on groups and onsets for provenance.
    pub fn tag(self) -> &'static str {
        match self {
            OperatorFamily::MicroAddition => "family:micro-addition",
            OperatorFamily::SubdivisionTransform => "family:subdivision",
            OperatorFamily::PatternSubstitution => "family:substitution",
            OperatorFamily::PhrasePunctuation => "family:punctuation",
        }
    }
}

impl fmt::Display for OperatorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A candidate-producing strategy for one role.
///
/// Implementors provide `meta` and `propose`; `can_apply` and
/// `generate_candidates` are provided so the gate and the generator can
/// never disagree. Override `applies_to` for operator-specific gating.
pub trait Operator: fmt::Debug + Send + Sync {
    fn meta(&self) -> &OperatorMeta;

    /// Produce candidates. Only reached when `can_apply` holds.
    fn propose<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a>;

    fn applies_to(&self, _bar: &Bar) -> bool {
        true
    }

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn family(&self) -> OperatorFamily {
        self.meta().family
    }

    fn role(&self) -> &Role {
        &self.meta().role
    }

    fn can_apply(&self, bar: &Bar) -> bool {
        let meta = self.meta();
        meta.gate.allows(bar, &meta.role) && self.applies_to(bar)
    }

    /// Candidates for `bar`, or an empty stream when the operator does not apply.
    fn generate_candidates<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a> {
        if !self.can_apply(bar) {
            return Box::new(std::iter::empty());
        }
        self.propose(bar, seed)
    }
}

/// Identity and shared tuning of an operator.
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorMeta {
    pub id: String,
    pub role: Role,
    pub family: OperatorFamily,
    pub gate: Gate,
    pub shaping: ScoreShaping,
    pub velocity: VelocityRange,
}

impl OperatorMeta {
    pub fn new(id: &str, role: Role, family: OperatorFamily) -> Self {
        OperatorMeta {
            id: id.to_string(),
            role,
            family,
            gate: Gate::default(),
            shaping: ScoreShaping::default(),
            velocity: VelocityRange::new(60, 100),
        }
    }

    pub fn gate(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }

    pub fn shaping(mut self, shaping: ScoreShaping) -> Self {
        self.shaping = shaping;
        self
    }

    pub fn velocity(mut self, min: u8, max: u8) -> Self {
        self.velocity = VelocityRange::new(min, max);
        self
    }

    /// Onset hash for `beat` salted with this operator's id.
    pub fn hash(&self, bar: &Bar, beat: Beat, seed: u64) -> u64 {
        onset_hash(bar.bar_number, beat.units(), seed, &self.id)
    }

    pub fn velocity_at(&self, bar: &Bar, beat: Beat, seed: u64) -> u8 {
        self.velocity.pick(self.hash(bar, beat, seed))
    }

    /// Shaped score for this bar times a positional weight, clamped to [0, 1].
    pub fn score_at(&self, bar: &Bar, weight: f64) -> f64 {
        clamp_score(self.shaping.score(bar) * weight)
    }

    /// Deterministic value in [0, 1) for optional-position decisions. Uses a
    /// different salt from the velocity hash so the two are uncorrelated.
    pub fn coin(&self, bar: &Bar, beat: Beat, seed: u64) -> f64 {
        let salted = format!("{}/coin", self.id);
        hash_unit(onset_hash(bar.bar_number, beat.units(), seed, &salted))
    }

    /// Signed tick nudge in `[-max_ticks, max_ticks]`.
    pub fn timing_nudge(&self, bar: &Bar, beat: Beat, seed: u64, max_ticks: i32) -> i32 {
        if max_ticks <= 0 {
            return 0;
        }
        let salted = format!("{}/timing", self.id);
        let h = onset_hash(bar.bar_number, beat.units(), seed, &salted);
        hash_to_signed_range(h, -(max_ticks as i64), max_ticks as i64) as i32
    }
}

// ---------------------------------------------------------------------------
// Gating
// ---------------------------------------------------------------------------

/// How an operator relates to the bar's fill window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillWindowRule {
    #[default]
    Any,
    /// Stay quiet while a fill is expected.
    Suppressed,
    /// Only run inside a fill window.
    Required,
}

/// Composable gating predicates checked by `Operator::can_apply`.
#[derive(Clone, Debug, PartialEq)]
pub struct Gate {
    pub min_energy: f64,
    pub max_energy: f64,
    /// Allow-list; `None` admits every section type.
    pub sections: Option<BTreeSet<SectionType>>,
    pub fill_window: FillWindowRule,
    pub min_beats_per_bar: u32,
    pub requires_section_start: bool,
    pub requires_phrase_end: bool,
}

impl Default for Gate {
    fn default() -> Self {
        Gate {
            min_energy: 0.0,
            max_energy: 1.0,
            sections: None,
            fill_window: FillWindowRule::Any,
            min_beats_per_bar: 1,
            requires_section_start: false,
            requires_phrase_end: false,
        }
    }
}

impl Gate {
    pub fn energy(mut self, min: f64, max: f64) -> Self {
        self.min_energy = min;
        self.max_energy = max;
        self
    }

    pub fn sections(mut self, sections: impl IntoIterator<Item = SectionType>) -> Self {
        self.sections = Some(sections.into_iter().collect());
        self
    }

    pub fn fill_window(mut self, rule: FillWindowRule) -> Self {
        self.fill_window = rule;
        self
    }

    pub fn min_beats(mut self, beats: u32) -> Self {
        self.min_beats_per_bar = beats;
        self
    }

    pub fn at_section_start(mut self) -> Self {
        self.requires_section_start = true;
        self
    }

    pub fn at_phrase_end(mut self) -> Self {
        self.requires_phrase_end = true;
        self
    }

    pub fn allows(&self, bar: &Bar, role: &Role) -> bool {
        if !bar.has_role(role) {
            return false;
        }
        if bar.energy_level < self.min_energy || bar.energy_level > self.max_energy {
            return false;
        }
        if let Some(sections) = &self.sections {
            if !sections.contains(&bar.section_type) {
                return false;
            }
        }
        let fill_ok = match self.fill_window {
            FillWindowRule::Any => true,
            FillWindowRule::Suppressed => !bar.is_fill_window,
            FillWindowRule::Required => bar.is_fill_window,
        };
        fill_ok
            && bar.beats_per_bar >= self.min_beats_per_bar
            && (!self.requires_section_start || bar.is_at_section_boundary)
            && (!self.requires_phrase_end || bar.is_phrase_end())
    }
}

// ---------------------------------------------------------------------------
// Scoring and hints
// ---------------------------------------------------------------------------

/// Base score with multiplicative context adjustments.
///
/// `score = base * (1 + boundary_boost)?  * (1 + phrase_end_boost)?
///          * (1 + energy_sensitivity * (energy - 0.5))`, clamped to [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreShaping {
    pub base: f64,
    /// Applied on the first bar of a section.
    pub boundary_boost: f64,
    /// Applied on the last bar of a section.
    pub phrase_end_boost: f64,
    /// Positive favours high energy, negative favours low energy.
    pub energy_sensitivity: f64,
}

impl Default for ScoreShaping {
    fn default() -> Self {
        ScoreShaping {
            base: 0.5,
            boundary_boost: 0.0,
            phrase_end_boost: 0.0,
            energy_sensitivity: 0.0,
        }
    }
}

impl ScoreShaping {
    pub fn base(base: f64) -> Self {
        ScoreShaping {
            base,
            ..Default::default()
        }
    }

    pub fn boundary(mut self, boost: f64) -> Self {
        self.boundary_boost = boost;
        self
    }

    pub fn phrase_end(mut self, boost: f64) -> Self {
        self.phrase_end_boost = boost;
        self
    }

    pub fn energy(mut self, sensitivity: f64) -> Self {
        self.energy_sensitivity = sensitivity;
        self
    }

    pub fn score(&self, bar: &Bar) -> f64 {
        let mut s = self.base;
        if bar.is_at_section_boundary {
            s *= 1.0 + self.boundary_boost;
        }
        if bar.is_phrase_end() {
            s *= 1.0 + self.phrase_end_boost;
        }
        s *= 1.0 + self.energy_sensitivity * (bar.energy_level - 0.5);
        clamp_score(s)
    }
}

/// Clamp to [0, 1], mapping non-finite values to 0.
pub fn clamp_score(s: f64) -> f64 {
    if s.is_finite() { s.clamp(0.0, 1.0) } else { 0.0 }
}

/// Inclusive MIDI velocity range, sampled by hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityRange {
    pub min: u8,
    pub max: u8,
}

impl VelocityRange {
    pub fn new(min: u8, max: u8) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        VelocityRange {
            min: min.clamp(1, 127),
            max: max.clamp(1, 127),
        }
    }

    pub fn pick(self, hash: u64) -> u8 {
        hash_to_range(hash, self.min as u64, self.max as u64) as u8
    }

    /// Interpolate between `min` and `max` by `t` in [0, 1], then add a
    /// hashed wobble of up to `wobble` either way. Used for crescendos.
    pub fn ramp(self, t: f64, hash: u64, wobble: u8) -> u8 {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let centre = self.min as f64 + (self.max as f64 - self.min as f64) * t;
        let jitter = hash_to_signed_range(hash, -(wobble as i64), wobble as i64) as f64;
        (centre + jitter).round().clamp(1.0, 127.0) as u8
    }
}
