// Repair passes: overcrowding pruning and limb-conflict resolution.
//
// `prevent_overcrowding` enforces a hard per-bar cap. Protected onsets are
// never removed, even if they alone exceed the cap; unprotected onsets are
// ranked by score descending, ties by candidate id ascending, and the top
// `cap - protected` survive. Anchors carry score 1.0, so they go last.
//
// `resolve_limb_conflicts` looks for pairs of hits that land on the same
// limb at the same instant. In each clash the highest-priority onset stays:
// protected first, then substitutes (an open hat replacing the closed hat),
// then anchors, then higher score, then smaller candidate id. Every dropped onset is reported as a
// `limb-conflict` violation naming both ids.
//
// Both passes are pure and deterministic. Overcrowding output is sorted by
// (bar, beat, role); conflict resolution keeps the input order.

use super::limb::{LimbAssignment, LimbModel};
use super::sticking::{RULE_LIMB_CONFLICT, StickingViolation};
use crate::bar::Role;
use crate::onset::GrooveOnset;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Outcome of an overcrowding pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OvercrowdingOutcome {
    pub kept: Vec<GrooveOnset>,
    /// Removed onsets, lowest priority last.
    pub pruned: Vec<GrooveOnset>,
    /// True when protected onsets alone fill the cap (or more).
    pub cap_exceeded_by_protected: bool,
}

/// Prune `onsets` down to `max_hits` (if any), never dropping a protected
/// onset.
pub fn prevent_overcrowding(onsets: Vec<GrooveOnset>, max_hits: Option<usize>) -> OvercrowdingOutcome {
    let Some(cap) = max_hits.filter(|&cap| onsets.len() > cap) else {
        return OvercrowdingOutcome {
            kept: onsets,
            ..Default::default()
        };
    };

    let (mut kept, mut unprotected): (Vec<GrooveOnset>, Vec<GrooveOnset>) =
        onsets.into_iter().partition(|o| o.is_protected);
    let cap_exceeded_by_protected = kept.len() >= cap;
    let room = cap.saturating_sub(kept.len());

    unprotected.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.candidate_id().cmp(b.candidate_id()))
    });
    let pruned = unprotected.split_off(room.min(unprotected.len()));
    kept.extend(unprotected);
    kept.sort_by_key(GrooveOnset::key);

    OvercrowdingOutcome {
        kept,
        pruned,
        cap_exceeded_by_protected,
    }
}

/// Outcome of a limb-conflict pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConflictResolution {
    pub kept: Vec<GrooveOnset>,
    pub dropped: Vec<GrooveOnset>,
    pub violations: Vec<StickingViolation>,
}

/// Ordering where `Less` means "keep first".
fn conflict_priority(a: &GrooveOnset, b: &GrooveOnset) -> Ordering {
    b.is_protected
        .cmp(&a.is_protected)
        .then_with(|| b.is_substitute().cmp(&a.is_substitute()))
        .then_with(|| b.is_anchor().cmp(&a.is_anchor()))
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| a.candidate_id().cmp(b.candidate_id()))
}

/// Find same-limb, same-instant clashes. When `repair` is false the
/// onsets are returned untouched and the clashes only reported.
pub fn resolve_limb_conflicts(onsets: Vec<GrooveOnset>, model: &LimbModel, repair: bool) -> ConflictResolution {
    // Each clash is a set of assignments that all conflict with its first.
    let mut clashes: Vec<Vec<(usize, LimbAssignment)>> = Vec::new();
    for (i, assignment) in onsets.iter().enumerate().filter_map(|(i, o)| Some((i, model.assign(o)?))) {
        match clashes.iter_mut().find(|c| c[0].1.conflicts_with(&assignment)) {
            Some(clash) => clash.push((i, assignment)),
            None => clashes.push(vec![(i, assignment)]),
        }
    }
    clashes.retain(|c| c.len() > 1);
    clashes.sort_by_key(|c| (c[0].1.bar_number, c[0].1.beat, c[0].1.limb));

    let mut losers = vec![false; onsets.len()];
    let mut violations = Vec::new();
    for mut members in clashes {
        members.sort_by(|(a, _), (b, _)| conflict_priority(&onsets[*a], &onsets[*b]));
        let (winner_index, winner_slot) = &members[0];
        let winner = &onsets[*winner_index];
        for (loser, _) in &members[1..] {
            let dropped = &onsets[*loser];
            violations.push(StickingViolation {
                rule_id: RULE_LIMB_CONFLICT.to_string(),
                message: format!(
                    "{} and {} both need the {}; keeping {}",
                    winner.role, dropped.role, winner_slot.limb, winner.role
                ),
                candidate_ids: vec![winner.candidate_id().to_string(), dropped.candidate_id().to_string()],
                bar_number: winner_slot.bar_number,
                beat: Some(winner_slot.beat),
                limb_involved: Some(winner_slot.limb),
            });
            losers[*loser] = repair;
        }
    }

    let (kept, dropped): (Vec<(usize, GrooveOnset)>, Vec<(usize, GrooveOnset)>) =
        onsets.into_iter().enumerate().partition(|(i, _)| !losers[*i]);
    if !dropped.is_empty() {
        debug!(dropped = dropped.len(), "resolved limb conflicts");
    }
    ConflictResolution {
        kept: kept.into_iter().map(|(_, o)| o).collect(),
        dropped: dropped.into_iter().map(|(_, o)| o).collect(),
        violations,
    }
}

// ---------------------------------------------------------------------------
// PhysicalityFilter
// ---------------------------------------------------------------------------

/// Per-role caps plus the limb model, applied as one unit by the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct PhysicalityFilter {
    pub model: LimbModel,
    pub max_hits_per_bar: BTreeMap<Role, usize>,
    pub resolve_conflicts: bool,
}

/// Everything a bar-level physicality pass found and did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhysicalityReport {
    pub pruned: Vec<GrooveOnset>,
    pub conflicts_dropped: Vec<GrooveOnset>,
    pub violations: Vec<StickingViolation>,
    /// Roles whose protected onsets alone exceeded the cap.
    pub protected_over_cap: Vec<Role>,
}

impl PhysicalityFilter {
    pub fn new(model: LimbModel) -> Self {
        PhysicalityFilter {
            model,
            max_hits_per_bar: BTreeMap::new(),
            resolve_conflicts: true,
        }
    }

    pub fn with_cap(mut self, role: Role, max_hits: usize) -> Self {
        self.max_hits_per_bar.insert(role, max_hits);
        self
    }

    pub fn with_conflict_resolution(mut self, enabled: bool) -> Self {
        self.resolve_conflicts = enabled;
        self
    }

    /// Apply the cap for `role` to that role's onsets.
    pub fn apply_role(&self, role: &Role, onsets: Vec<GrooveOnset>) -> OvercrowdingOutcome {
        prevent_overcrowding(onsets, self.max_hits_per_bar.get(role).copied())
    }

    /// Cap every role, then resolve limb conflicts across roles. Output is
    /// sorted by (bar, beat, role).
    pub fn apply_bar(&self, onsets: Vec<GrooveOnset>) -> (Vec<GrooveOnset>, PhysicalityReport) {
        let mut by_role: BTreeMap<Role, Vec<GrooveOnset>> = BTreeMap::new();
        for onset in onsets {
            by_role.entry(onset.role.clone()).or_default().push(onset);
        }

        let mut report = PhysicalityReport::default();
        let mut capped = Vec::new();
        for (role, role_onsets) in by_role {
            let outcome = self.apply_role(&role, role_onsets);
            if outcome.cap_exceeded_by_protected {
                report.protected_over_cap.push(role);
            }
            report.pruned.extend(outcome.pruned);
            capped.extend(outcome.kept);
        }

        let resolution = resolve_limb_conflicts(capped, &self.model, self.resolve_conflicts);
        report.conflicts_dropped = resolution.dropped;
        report.violations = resolution.violations;
        let mut kept = resolution.kept;
        kept.sort_by_key(GrooveOnset::key);
        (kept, report)
    }
}
