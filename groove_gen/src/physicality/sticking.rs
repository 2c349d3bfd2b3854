// Sticking rules: human-feasibility checks over a time-ordered sequence.
//
// Two checks, both report-only:
//
// - Ghost density: per bar, count onsets with `Strength::Ghost` (every
//   role, mapped or not) and flag bars above `max_ghosts_per_bar`.
// - Same-limb streaks: place every mapped onset at its absolute tick, then
//   walk each limb's hits in time order. A hit within
//   `min_gap_between_fast_hits` ticks of the previous hit on the same limb
//   extends the streak; a wider gap resets it to 1. Every position where
//   the streak exceeds `max_consecutive_same_limb` is reported, not just
//   the first.
//
// Unmapped roles never enter the streak walk.

use super::limb::{Limb, LimbModel};
use crate::bar::{Beat, Strength};
use crate::config::GrooveConfig;
use crate::events::EventTiming;
use crate::onset::GrooveOnset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const RULE_MAX_GHOSTS: &str = "max-ghosts-per-bar";
pub const RULE_MAX_CONSECUTIVE: &str = "max-consecutive-same-limb";
pub const RULE_LIMB_CONFLICT: &str = "limb-conflict";

/// A physicality finding. Never an error; callers decide what to do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickingViolation {
    pub rule_id: String,
    pub message: String,
    pub candidate_ids: Vec<String>,
    pub bar_number: u32,
    /// `None` for bar-level findings (ghost density).
    pub beat: Option<Beat>,
    pub limb_involved: Option<Limb>,
}

impl fmt::Display for StickingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] bar {}", self.rule_id, self.bar_number)?;
        if let Some(beat) = self.beat {
            write!(f, " beat {beat}")?;
        }
        write!(f, ": {}", self.message)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StickingRules {
    pub max_consecutive_same_limb: usize,
    pub max_ghosts_per_bar: usize,
    /// In ticks at `timing.ticks_per_beat`.
    pub min_gap_between_fast_hits: u32,
    pub timing: EventTiming,
}

impl StickingRules {
    /// Rules with the stock thresholds: 4 consecutive, 4 ghosts, one
    /// sixteenth.
    pub fn new(timing: EventTiming) -> Self {
        StickingRules {
            max_consecutive_same_limb: 4,
            max_ghosts_per_bar: 4,
            min_gap_between_fast_hits: timing.ticks_per_beat / 4,
            timing,
        }
    }

    pub fn from_config(config: &GrooveConfig, beats_per_bar: u32) -> Self {
        StickingRules {
            max_consecutive_same_limb: config.sticking.max_consecutive_same_limb,
            max_ghosts_per_bar: config.sticking.max_ghosts_per_bar,
            min_gap_between_fast_hits: config.fast_hit_gap(),
            timing: EventTiming::new(config.ticks_per_beat, beats_per_bar),
        }
    }

    /// Check a sequence of onsets. Input order does not matter; findings
    /// come out grouped by rule, then in time order.
    pub fn validate(&self, onsets: &[GrooveOnset], model: &LimbModel) -> Vec<StickingViolation> {
        let mut violations = self.check_ghosts(onsets);
        violations.extend(self.check_streaks(onsets, model));
        violations
    }

    fn check_ghosts(&self, onsets: &[GrooveOnset]) -> Vec<StickingViolation> {
        let mut ghosts_by_bar: BTreeMap<u32, Vec<&GrooveOnset>> = BTreeMap::new();
        for onset in onsets.iter().filter(|o| o.strength == Strength::Ghost) {
            ghosts_by_bar.entry(onset.bar_number).or_default().push(onset);
        }
        ghosts_by_bar
            .into_iter()
            .filter(|(_, ghosts)| ghosts.len() > self.max_ghosts_per_bar)
            .map(|(bar_number, mut ghosts)| {
                ghosts.sort_by_key(|o| (o.beat, o.role.clone()));
                StickingViolation {
                    rule_id: RULE_MAX_GHOSTS.to_string(),
                    message: format!("{} ghost notes (max {})", ghosts.len(), self.max_ghosts_per_bar),
                    candidate_ids: ghosts.iter().map(|o| o.candidate_id().to_string()).collect(),
                    bar_number,
                    beat: None,
                    limb_involved: None,
                }
            })
            .collect()
    }

    fn check_streaks(&self, onsets: &[GrooveOnset], model: &LimbModel) -> Vec<StickingViolation> {
        let mut by_limb: BTreeMap<Limb, Vec<(u64, &GrooveOnset)>> = BTreeMap::new();
        for onset in onsets {
            if let Some(limb) = model.required_limb(&onset.role) {
                by_limb.entry(limb).or_default().push((self.timing.onset_tick(onset), onset));
            }
        }

        let gap = self.min_gap_between_fast_hits as u64;
        let mut violations = Vec::new();
        for (limb, mut hits) in by_limb {
            hits.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.candidate_id().cmp(b.1.candidate_id())));
            let mut streak = 1usize;
            for pair in hits.windows(2) {
                let (prev_tick, prev) = pair[0];
                let (tick, onset) = pair[1];
                if tick - prev_tick <= gap {
                    streak += 1;
                } else {
                    streak = 1;
                }
                if streak > self.max_consecutive_same_limb {
                    violations.push(StickingViolation {
                        rule_id: RULE_MAX_CONSECUTIVE.to_string(),
                        message: format!(
                            "{streak} fast hits in a row on the {limb} (max {})",
                            self.max_consecutive_same_limb
                        ),
                        candidate_ids: vec![prev.candidate_id().to_string(), onset.candidate_id().to_string()],
                        bar_number: onset.bar_number,
                        beat: Some(onset.beat),
                        limb_involved: Some(limb),
                    });
                }
            }
        }
        violations
    }
}
