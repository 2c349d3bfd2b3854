// Final onsets and anchor merging.
//
// A `GrooveOnset` is a hit that survived selection (or an anchor that was
// always going to be there). It carries its provenance so diagnostics and
// the event layer can trace every hit back to an operator candidate or to
// the preset groove.
//
// `merge_onsets` enforces the key invariant: at most one onset per
// `(bar, beat, role)`, with anchors winning every collision.

use crate::bar::{Articulation, Bar, Beat, FillRole, Role, Strength};
use crate::candidate::{OnsetCandidate, TAG_SUBSTITUTE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Where an onset came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnsetSource {
    /// Part of the precomputed groove foundation.
    Anchor,
    /// Selected from an operator candidate.
    Operator { group_id: String, operator_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: OnsetSource,
    pub candidate_id: String,
    /// Tags carried over from the candidate (or `anchor` for anchors).
    pub tags: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrooveOnset {
    pub role: Role,
    pub bar_number: u32,
    pub beat: Beat,
    pub velocity: u8,
    pub timing_offset_ticks: i32,
    pub strength: Strength,
    pub fill_role: FillRole,
    pub articulation: Option<Articulation>,
    /// Selection weight, used to rank onsets when pruning. Anchors carry 1.0.
    pub score: f64,
    pub provenance: Provenance,
    pub is_protected: bool,
}

/// Identity of a slot in the bar: one onset per role per position.
pub type OnsetKey = (u32, Beat, Role);

impl GrooveOnset {
    /// An anchor hit with grid-derived strength and no timing offset.
    pub fn anchor(bar: &Bar, role: Role, beat: Beat, velocity: u8) -> Self {
        let candidate_id = format!("anchor@{}:{}:{}", bar.bar_number, role, beat);
        GrooveOnset {
            strength: Strength::classify(beat, bar),
            role,
            bar_number: bar.bar_number,
            beat,
            velocity: velocity.clamp(1, 127),
            timing_offset_ticks: 0,
            fill_role: FillRole::None,
            articulation: None,
            score: 1.0,
            provenance: Provenance {
                source: OnsetSource::Anchor,
                candidate_id,
                tags: ["anchor".to_string()].into_iter().collect(),
            },
            is_protected: false,
        }
    }

    /// Promote a selected candidate. `group_id` names the family group it
    /// was selected from.
    pub fn from_candidate(candidate: &OnsetCandidate, group_id: &str, bar_number: u32) -> Self {
        GrooveOnset {
            role: candidate.role.clone(),
            bar_number,
            beat: candidate.onset_beat,
            velocity: candidate.velocity_hint.clamp(1, 127),
            timing_offset_ticks: candidate.timing_hint.unwrap_or(0),
            strength: candidate.strength,
            fill_role: candidate.fill_role,
            articulation: candidate.articulation_hint,
            score: candidate.score,
            provenance: Provenance {
                source: OnsetSource::Operator {
                    group_id: group_id.to_string(),
                    operator_id: candidate.operator_id.clone(),
                },
                candidate_id: candidate.candidate_id.clone(),
                tags: candidate.tags.clone(),
            },
            is_protected: candidate.is_protected(),
        }
    }

    pub fn with_articulation(mut self, articulation: Articulation) -> Self {
        self.articulation = Some(articulation);
        self
    }

    pub fn key(&self) -> OnsetKey {
        (self.bar_number, self.beat, self.role.clone())
    }

    /// Takes its limb over from other hits at the same instant.
    pub fn is_substitute(&self) -> bool {
        self.provenance.tags.contains(TAG_SUBSTITUTE)
    }

    pub fn is_anchor(&self) -> bool {
        self.provenance.source == OnsetSource::Anchor
    }

    pub fn candidate_id(&self) -> &str {
        &self.provenance.candidate_id
    }
}

/// Combine anchors and selected onsets, one per `(bar, beat, role)`.
///
/// Anchors are inserted first and never displaced; among operator onsets
/// the first occurrence wins. Output is ordered by bar, beat, then role.
pub fn merge_onsets(anchors: &[GrooveOnset], selected: &[GrooveOnset]) -> Vec<GrooveOnset> {
    let mut slots: BTreeMap<OnsetKey, GrooveOnset> = BTreeMap::new();
    for onset in anchors.iter().chain(selected) {
        slots.entry(onset.key()).or_insert_with(|| onset.clone());
    }
    slots.into_values().collect()
}
