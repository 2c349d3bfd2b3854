// Onset candidates and the per-family groups they are collected into.
//
// An `OnsetCandidate` is a proposed hit: where, for which role, how hard,
// and how much the producing operator wants it (`score`, a selection
// weight in [0, 1], not a probability). Every field an operator might want
// to pass downstream is typed here; there is no free-form metadata bag.
//
// Candidates are built by operators, validated and grouped by
// `collection.rs`, ranked by `selection.rs`, and discarded once the bar's
// `GrooveOnset`s exist.

use crate::bar::{Articulation, Bar, Beat, FillRole, Role, Strength};
use crate::operator::OperatorFamily;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Tag applied to candidates that overcrowding pruning must never remove.
pub const TAG_PROTECTED: &str = "protected";

/// Tag for hits that take over their limb from whatever else (anchors
/// included) lands there at the same instant, e.g. an open hat in place of
/// the closed hat.
pub const TAG_SUBSTITUTE: &str = "substitute";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OnsetCandidate {
    pub role: Role,
    pub onset_beat: Beat,
    pub strength: Strength,
    /// Selection weight in [0, 1].
    pub score: f64,
    /// MIDI velocity hint, 1..=127.
    pub velocity_hint: u8,
    /// Signed tick offset from the grid position.
    pub timing_hint: Option<i32>,
    pub fill_role: FillRole,
    pub articulation_hint: Option<Articulation>,
    /// Provenance and diagnostics tags. Ordered so output is stable.
    pub tags: BTreeSet<String>,
    pub operator_id: String,
    /// Stable identity used for tie-breaking and protection lookups.
    pub candidate_id: String,
}

impl OnsetCandidate {
    /// Build a candidate with a deterministic id derived from the producing
    /// operator, bar and position. FillEnd candidates are tagged protected.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        operator_id: &str,
        bar: &Bar,
        role: Role,
        onset_beat: Beat,
        strength: Strength,
        score: f64,
        velocity_hint: u8,
        fill_role: FillRole,
    ) -> Self {
        let mut tags = BTreeSet::new();
        if fill_role.is_protected() {
            tags.insert(TAG_PROTECTED.to_string());
        }
        OnsetCandidate {
            candidate_id: candidate_id(operator_id, bar.bar_number, onset_beat),
            role,
            onset_beat,
            strength,
            score,
            velocity_hint: velocity_hint.clamp(1, 127),
            timing_hint: None,
            fill_role,
            articulation_hint: None,
            tags,
            operator_id: operator_id.to_string(),
        }
    }

    pub fn with_timing(mut self, ticks: i32) -> Self {
        self.timing_hint = (ticks != 0).then_some(ticks);
        self
    }

    pub fn with_articulation(mut self, articulation: Articulation) -> Self {
        self.articulation_hint = Some(articulation);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn is_protected(&self) -> bool {
        self.fill_role.is_protected() || self.tags.contains(TAG_PROTECTED)
    }

    pub fn is_substitute(&self) -> bool {
        self.tags.contains(TAG_SUBSTITUTE)
    }

    /// Check the structural invariants collection enforces.
    pub fn validate(&self, bar: &Bar) -> Result<(), CandidateDefect> {
        if self.role.is_blank() {
            return Err(CandidateDefect::EmptyRole);
        }
        if self.onset_beat.units() < 0 {
            return Err(CandidateDefect::BeforeBarStart(self.onset_beat));
        }
        if !bar.contains(self.onset_beat) {
            return Err(CandidateDefect::PastBarEnd(self.onset_beat));
        }
        if !self.score.is_finite() {
            return Err(CandidateDefect::NonFiniteScore);
        }
        if self.candidate_id.is_empty() {
            return Err(CandidateDefect::MissingId);
        }
        Ok(())
    }
}

/// Stable candidate id: `<operator>@<bar>:<beat>`.
pub fn candidate_id(operator_id: &str, bar_number: u32, beat: Beat) -> String {
    format!("{operator_id}@{bar_number}:{beat}")
}

/// Why a candidate was rejected during collection.
#[derive(Clone, Debug, PartialEq)]
pub enum CandidateDefect {
    EmptyRole,
    BeforeBarStart(Beat),
    PastBarEnd(Beat),
    NonFiniteScore,
    MissingId,
    /// Produced for a different role than the one being collected.
    WrongRole(Role),
}

impl fmt::Display for CandidateDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateDefect::EmptyRole => write!(f, "empty role"),
            CandidateDefect::BeforeBarStart(b) => write!(f, "beat {b} is before beat 1"),
            CandidateDefect::PastBarEnd(b) => write!(f, "beat {b} is past the end of the bar"),
            CandidateDefect::NonFiniteScore => write!(f, "score is not finite"),
            CandidateDefect::MissingId => write!(f, "missing candidate id"),
            CandidateDefect::WrongRole(r) => write!(f, "role {r} does not match the collected role"),
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate groups
// ---------------------------------------------------------------------------

/// Candidates from one operator family for one bar and role.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateGroup {
    /// Equal to the family name, so iteration order is stable across runs.
    pub group_id: String,
    pub family: OperatorFamily,
    pub group_tags: BTreeSet<String>,
    pub max_adds_per_bar: usize,
    /// Arithmetic mean of member scores (0 for an empty group).
    pub base_probability_bias: f64,
    pub candidates: Vec<OnsetCandidate>,
}

impl CandidateGroup {
    pub fn new(family: OperatorFamily, max_adds_per_bar: usize, candidates: Vec<OnsetCandidate>) -> Self {
        let base_probability_bias = if candidates.is_empty() {
            0.0
        } else {
            candidates.iter().map(|c| c.score).sum::<f64>() / candidates.len() as f64
        };
        let mut group_tags = BTreeSet::new();
        group_tags.insert(family.tag().to_string());
        CandidateGroup {
            group_id: family.name().to_string(),
            family,
            group_tags,
            max_adds_per_bar,
            base_probability_bias,
            candidates,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::SIXTEENTH;

    fn sample(bar: &Bar, beat: Beat, score: f64) -> OnsetCandidate {
        OnsetCandidate::new("test-op", bar, Role::Snare, beat, Strength::Ghost, score, 40, FillRole::None)
    }

    #[test]
    fn ids_are_stable_and_readable() {
        let bar = Bar::new(7, 4, 1);
        let c = sample(&bar, Beat::at(2, SIXTEENTH * 3), 0.5);
        assert_eq!(c.candidate_id, "test-op@7:2.75");
    }

    #[test]
    fn fill_end_is_protected() {
        let bar = Bar::new(1, 4, 1);
        let c = OnsetCandidate::new("f", &bar, Role::Snare, Beat::whole(4), Strength::Strong, 0.2, 100, FillRole::FillEnd);
        assert!(c.is_protected());
        assert!(c.tags.contains(TAG_PROTECTED));
        assert!(!sample(&bar, Beat::whole(4), 0.2).is_protected());
    }

    #[test]
    fn velocity_hint_clamped() {
        let bar = Bar::new(1, 4, 1);
        let c = OnsetCandidate::new("v", &bar, Role::Kick, Beat::DOWNBEAT, Strength::Downbeat, 1.0, 0, FillRole::None);
        assert_eq!(c.velocity_hint, 1);
    }

    #[test]
    fn validation_rejects_malformed_candidates() {
        let bar = Bar::new(1, 4, 1);
        assert_eq!(sample(&bar, Beat::whole(2), 0.5).validate(&bar), Ok(()));
        assert!(matches!(
            sample(&bar, Beat::from_units(-10), 0.5).validate(&bar),
            Err(CandidateDefect::BeforeBarStart(_))
        ));
        assert!(matches!(
            sample(&bar, Beat::whole(5), 0.5).validate(&bar),
            Err(CandidateDefect::PastBarEnd(_))
        ));
        assert_eq!(sample(&bar, Beat::whole(2), f64::NAN).validate(&bar), Err(CandidateDefect::NonFiniteScore));
        let mut blank = sample(&bar, Beat::whole(2), 0.5);
        blank.role = Role::Custom(String::new());
        assert_eq!(blank.validate(&bar), Err(CandidateDefect::EmptyRole));
    }

    #[test]
    fn group_bias_is_mean_score() {
        let bar = Bar::new(1, 4, 1);
        let group = CandidateGroup::new(
            OperatorFamily::MicroAddition,
            2,
            vec![sample(&bar, Beat::whole(2), 0.8), sample(&bar, Beat::whole(3), 0.4)],
        );
        assert_eq!(group.group_id, "MicroAddition");
        assert!((group.base_probability_bias - 0.6).abs() < 1e-12);
        assert_eq!(CandidateGroup::new(OperatorFamily::MicroAddition, 2, vec![]).base_probability_bias, 0.0);
    }
}
