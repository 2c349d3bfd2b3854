// Selection engine: greedy, capped, deterministic.
//
// Given the bar's anchors for a role, the collected candidate groups and a
// density target, choose which candidates to add:
//
// 1. Drop candidates whose (beat, role) is held by an anchor.
// 2. Rank the rest by score descending, ties by candidate id ascending
//    (then group order, so the ranking is total even for hand-built groups
//    that reuse ids).
// 3. Walk the ranking, accepting while anchors + accepted < target. A
//    candidate is skipped if its group's `max_adds_per_bar` is used up or
//    its (beat, role) was already taken by a higher-ranked candidate.
//
// Nothing here reads a clock or an RNG; the output is a pure function of
// the inputs. The target itself comes from `density.rs` and is treated as
// an opaque count.

use crate::bar::{Bar, Beat, Role};
use crate::candidate::{CandidateGroup, OnsetCandidate};
use crate::onset::GrooveOnset;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A candidate chosen by selection, with the group it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectedCandidate {
    pub candidate: OnsetCandidate,
    pub group_id: String,
}

impl SelectedCandidate {
    pub fn to_onset(&self, bar: &Bar) -> GrooveOnset {
        GrooveOnset::from_candidate(&self.candidate, &self.group_id, bar.bar_number)
    }
}

/// Counters from one selection pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionDiagnostics {
    pub target_count: usize,
    /// Distinct anchor positions for the role in this bar.
    pub anchor_count: usize,
    pub considered: usize,
    pub anchor_collisions: usize,
    pub group_cap_skips: usize,
    pub duplicate_skips: usize,
    pub selected: usize,
    /// Groups whose cap was reached, in the order they filled up.
    pub exhausted_groups: Vec<String>,
}

/// Choose candidates until `anchors + selected` reaches `target_count`.
///
/// Only anchors in `bar` for `role` count toward the target; anchors for
/// other roles are ignored. Returns the accepted candidates in ranking
/// order.
pub fn select_until_target_reached(
    bar: &Bar,
    role: &Role,
    groups: &[CandidateGroup],
    target_count: usize,
    anchors: &[GrooveOnset],
    diagnostics: &mut SelectionDiagnostics,
) -> Vec<SelectedCandidate> {
    let anchored: BTreeSet<Beat> = anchors
        .iter()
        .filter(|a| a.bar_number == bar.bar_number && &a.role == role)
        .map(|a| a.beat)
        .collect();

    diagnostics.target_count = target_count;
    diagnostics.anchor_count = anchored.len();

    let mut ranked: Vec<(usize, &OnsetCandidate)> = Vec::new();
    for (group_index, group) in groups.iter().enumerate() {
        for candidate in &group.candidates {
            diagnostics.considered += 1;
            if &candidate.role != role {
                continue;
            }
            if anchored.contains(&candidate.onset_beat) {
                diagnostics.anchor_collisions += 1;
                continue;
            }
            ranked.push((group_index, candidate));
        }
    }
    ranked.sort_by(|a, b| rank(a, b));

    let mut selected = Vec::new();
    let mut total = anchored.len();
    let mut taken: BTreeSet<Beat> = BTreeSet::new();
    let mut group_adds: BTreeMap<usize, usize> = BTreeMap::new();

    for (group_index, candidate) in ranked {
        if total >= target_count {
            break;
        }
        let group = &groups[group_index];
        let adds = group_adds.entry(group_index).or_insert(0);
        if *adds >= group.max_adds_per_bar {
            diagnostics.group_cap_skips += 1;
            continue;
        }
        if !taken.insert(candidate.onset_beat) {
            diagnostics.duplicate_skips += 1;
            continue;
        }
        *adds += 1;
        if *adds == group.max_adds_per_bar {
            diagnostics.exhausted_groups.push(group.group_id.clone());
        }
        total += 1;
        selected.push(SelectedCandidate {
            candidate: candidate.clone(),
            group_id: group.group_id.clone(),
        });
    }

    diagnostics.selected = selected.len();
    debug!(
        bar = bar.bar_number,
        %role,
        target = target_count,
        anchors = diagnostics.anchor_count,
        selected = diagnostics.selected,
        "selection complete"
    );
    selected
}

fn rank(a: &(usize, &OnsetCandidate), b: &(usize, &OnsetCandidate)) -> Ordering {
    b.1.score
        .total_cmp(&a.1.score)
        .then_with(|| a.1.candidate_id.cmp(&b.1.candidate_id))
        .then_with(|| a.0.cmp(&b.0))
}
