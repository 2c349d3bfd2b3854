// Data-driven generator configuration.
//
// Every tunable the pipeline reads lives in `GrooveConfig`, loadable from
// JSON. Fields are `#[serde(default)]` so a config file only needs the
// values it changes. `validate()` runs at generator construction so a bad
// threshold is a construction-time error, never a mid-song surprise.
//
// See also: `pipeline.rs` (owns the config), `physicality/sticking.rs`
// (reads `StickingConfig`), `collection.rs` (reads `FailurePolicy` and
// the per-family group caps).

use crate::bar::Role;
use crate::error::{GrooveError, Result};
use crate::operator::OperatorFamily;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// What collection does when an operator fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Record a diagnostic and keep going with the other operators.
    #[default]
    Continue,
    /// Abort generation of the bar with `GrooveError::OperatorFailed`.
    Strict,
}

/// Which side of the kit the player leads with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    #[default]
    Right,
    Left,
}

/// Thresholds for `StickingRules`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickingConfig {
    /// Longest allowed run of fast hits on one limb.
    pub max_consecutive_same_limb: usize,
    pub max_ghosts_per_bar: usize,
    /// Gap (ticks) at or below which consecutive same-limb hits count as
    /// fast. `None` means one sixteenth note at the configured resolution.
    pub min_gap_between_fast_hits: Option<u32>,
}

impl Default for StickingConfig {
    fn default() -> Self {
        StickingConfig {
            max_consecutive_same_limb: 4,
            max_ghosts_per_bar: 4,
            min_gap_between_fast_hits: None,
        }
    }
}

/// Complete generator configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrooveConfig {
    /// Tick resolution for absolute time and MIDI output (pulses per quarter).
    pub ticks_per_beat: u32,
    pub tempo_bpm: u16,
    pub failure_policy: FailurePolicy,
    pub sticking: StickingConfig,
    /// Per-family cap on operator additions per bar.
    pub group_caps: BTreeMap<OperatorFamily, usize>,
    /// Cap applied when a family is missing from `group_caps`.
    pub default_group_cap: usize,
    /// Per-role hard cap on onsets per bar (anchors included). Roles not
    /// listed are uncapped.
    pub max_hits_per_bar: BTreeMap<Role, usize>,
    pub handedness: Handedness,
    /// Drop the weaker of two same-limb, same-instant hits.
    pub resolve_limb_conflicts: bool,
}

impl Default for GrooveConfig {
    fn default() -> Self {
        GrooveConfig {
            ticks_per_beat: 480,
            tempo_bpm: 110,
            failure_policy: FailurePolicy::Continue,
            sticking: StickingConfig::default(),
            group_caps: [
                (OperatorFamily::MicroAddition, 2),
                (OperatorFamily::SubdivisionTransform, 12),
                (OperatorFamily::PatternSubstitution, 4),
                (OperatorFamily::PhrasePunctuation, 8),
            ]
            .into_iter()
            .collect(),
            default_group_cap: 4,
            max_hits_per_bar: [
                (Role::Kick, 8),
                (Role::Snare, 10),
                (Role::ClosedHat, 16),
                (Role::OpenHat, 3),
                (Role::Crash, 2),
            ]
            .into_iter()
            .collect(),
            handedness: Handedness::Right,
            resolve_limb_conflicts: true,
        }
    }
}

impl GrooveConfig {
    /// Load from a JSON file and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        GrooveConfig::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: GrooveConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ticks_per_beat == 0 || self.ticks_per_beat > i16::MAX as u32 {
            return Err(GrooveError::Config(format!(
                "ticks_per_beat must be in 1..={}, got {}",
                i16::MAX,
                self.ticks_per_beat
            )));
        }
        if self.tempo_bpm == 0 {
            return Err(GrooveError::Config("tempo_bpm must be positive".into()));
        }
        if self.sticking.max_consecutive_same_limb == 0 {
            return Err(GrooveError::Config(
                "sticking.max_consecutive_same_limb must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn group_cap(&self, family: OperatorFamily) -> usize {
        self.group_caps
            .get(&family)
            .copied()
            .unwrap_or(self.default_group_cap)
    }

    pub fn hit_cap(&self, role: &Role) -> Option<usize> {
        self.max_hits_per_bar.get(role).copied()
    }

    /// Resolved fast-hit gap in ticks.
    pub fn fast_hit_gap(&self) -> u32 {
        self.sticking
            .min_gap_between_fast_hits
            .unwrap_or(self.ticks_per_beat / 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = GrooveConfig::default();
        config.validate().unwrap();
        assert_eq!(config.fast_hit_gap(), 120);
        assert_eq!(config.group_cap(OperatorFamily::MicroAddition), 2);
        assert_eq!(config.hit_cap(&Role::Crash), Some(2));
        assert_eq!(config.hit_cap(&Role::Ride), None);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = GrooveConfig::from_json(
            r#"{
                "ticks_per_beat": 960,
                "failure_policy": "Strict",
                "sticking": { "max_ghosts_per_bar": 6 },
                "max_hits_per_bar": { "Ride": 8, "Shaker": 16 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.ticks_per_beat, 960);
        assert_eq!(config.failure_policy, FailurePolicy::Strict);
        assert_eq!(config.sticking.max_ghosts_per_bar, 6);
        assert_eq!(config.sticking.max_consecutive_same_limb, 4);
        assert_eq!(config.fast_hit_gap(), 240);
        assert_eq!(config.hit_cap(&Role::Ride), Some(8));
        assert_eq!(config.hit_cap(&Role::Custom("Shaker".into())), Some(16));
        assert_eq!(config.tempo_bpm, 110);
    }

    #[test]
    fn json_roundtrip() {
        let config = GrooveConfig {
            handedness: Handedness::Left,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(GrooveConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(matches!(
            GrooveConfig::from_json(r#"{ "ticks_per_beat": 0 }"#),
            Err(GrooveError::Config(_))
        ));
        assert!(matches!(
            GrooveConfig::from_json(r#"{ "sticking": { "max_consecutive_same_limb": 0 } }"#),
            Err(GrooveError::Config(_))
        ));
        assert!(matches!(GrooveConfig::from_json("{ not json"), Err(GrooveError::Json(_))));
    }
}
