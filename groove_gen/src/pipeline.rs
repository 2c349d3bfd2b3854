// The generation pipeline: registry + config + limb model in, onsets out.
//
// Per (bar, role):
//   1. collect candidates from every eligible operator (collection.rs)
//   2. select until anchors + selected reach the density target
//      (selection.rs)
//   3. merge with the anchors, anchors first (onset.rs)
//   4. prune to the role's hit cap, protected onsets always kept
//      (physicality/filter.rs)
//
// Per bar, after every active role: one cross-role limb-conflict pass.
// Per song, after every bar: sticking validation over the whole
// time-ordered sequence. Violations ride alongside the onsets; they never
// replace them.
//
// `GrooveGenerator` is read-only after construction, so one instance can
// serve many songs (and many threads, since everything it owns is
// `Send + Sync`).

use crate::bar::{Bar, Role};
use crate::collection::{CandidateCollector, CollectionDiagnostics};
use crate::config::GrooveConfig;
use crate::density::{DensityCalculator, EnergyDensity};
use crate::error::Result;
use crate::events::EventTiming;
use crate::onset::{GrooveOnset, merge_onsets};
use crate::physicality::{LimbModel, PhysicalityFilter, StickingRules, StickingViolation};
use crate::preset::GroovePreset;
use crate::registry::OperatorRegistry;
use crate::selection::{SelectionDiagnostics, select_until_target_reached};
use crate::song::SongPlan;
use tracing::{debug, info};

/// Output of `generate_role`.
#[derive(Clone, Debug, PartialEq)]
pub struct RoleResult {
    pub role: Role,
    /// Final onsets for the role, ordered by beat.
    pub onsets: Vec<GrooveOnset>,
    /// Onsets removed by the hit cap.
    pub pruned: Vec<GrooveOnset>,
    /// Protected onsets alone reached the cap.
    pub protected_over_cap: bool,
    pub collection: CollectionDiagnostics,
    pub selection: SelectionDiagnostics,
}

/// Output of `generate_bar`.
#[derive(Clone, Debug, PartialEq)]
pub struct BarResult {
    pub bar: Bar,
    /// Every surviving onset in the bar, ordered by absolute tick, then
    /// role and candidate id.
    pub onsets: Vec<GrooveOnset>,
    pub roles: Vec<RoleResult>,
    /// Losers of the limb-conflict pass.
    pub conflicts_dropped: Vec<GrooveOnset>,
    pub violations: Vec<StickingViolation>,
}

impl BarResult {
    pub fn role(&self, role: &Role) -> Option<&RoleResult> {
        self.roles.iter().find(|r| &r.role == role)
    }

    /// Collection diagnostics summed over every role.
    pub fn collection_diagnostics(&self) -> CollectionDiagnostics {
        let mut total = CollectionDiagnostics::default();
        for role in &self.roles {
            total.merge(role.collection.clone());
        }
        total
    }
}

/// Output of `generate_song`.
#[derive(Clone, Debug, PartialEq)]
pub struct SongResult {
    pub bars: Vec<BarResult>,
    /// Limb-conflict findings from every bar followed by the song-wide
    /// sticking findings.
    pub violations: Vec<StickingViolation>,
    pub timing: EventTiming,
}

impl SongResult {
    /// Every onset in the song, in tick order. A hit pushed ahead of a
    /// downbeat can land before the tail of the previous bar.
    pub fn onsets(&self) -> Vec<GrooveOnset> {
        let mut all: Vec<GrooveOnset> = self.bars.iter().flat_map(|b| b.onsets.iter().cloned()).collect();
        self.timing.sort_onsets(&mut all);
        all
    }

    pub fn onset_count(&self) -> usize {
        self.bars.iter().map(|b| b.onsets.len()).sum()
    }
}

pub struct GrooveGenerator {
    registry: OperatorRegistry,
    config: GrooveConfig,
    filter: PhysicalityFilter,
    preset: GroovePreset,
    density: Box<dyn DensityCalculator>,
}

impl GrooveGenerator {
    /// Stock registry, `Rock` preset, `EnergyDensity`. Fails if the config
    /// does not validate.
    pub fn new(config: GrooveConfig) -> Result<Self> {
        GrooveGenerator::with_registry(OperatorRegistry::standard()?, config)
    }

    pub fn with_registry(registry: OperatorRegistry, config: GrooveConfig) -> Result<Self> {
        config.validate()?;
        let mut filter = PhysicalityFilter::new(LimbModel::for_handedness(config.handedness))
            .with_conflict_resolution(config.resolve_limb_conflicts);
        for (role, &cap) in &config.max_hits_per_bar {
            filter = filter.with_cap(role.clone(), cap);
        }
        Ok(GrooveGenerator {
            registry,
            config,
            filter,
            preset: GroovePreset::default(),
            density: Box::new(EnergyDensity::default()),
        })
    }

    pub fn with_preset(mut self, preset: GroovePreset) -> Self {
        self.preset = preset;
        self
    }

    pub fn with_density(mut self, density: impl DensityCalculator + 'static) -> Self {
        self.density = Box::new(density);
        self
    }

    /// Replace the limb model (e.g. a custom kit layout).
    pub fn with_limb_model(mut self, model: LimbModel) -> Self {
        self.filter.model = model;
        self
    }

    pub fn config(&self) -> &GrooveConfig {
        &self.config
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    pub fn limb_model(&self) -> &LimbModel {
        &self.filter.model
    }

    pub fn preset(&self) -> GroovePreset {
        self.preset
    }

    /// Generate one role. `anchors` may hold anchors for any role in the
    /// bar; only the ones for `role` are used.
    pub fn generate_role(&self, bar: &Bar, role: &Role, anchors: &[GrooveOnset]) -> Result<RoleResult> {
        let mut result = RoleResult {
            role: role.clone(),
            onsets: Vec::new(),
            pruned: Vec::new(),
            protected_over_cap: false,
            collection: CollectionDiagnostics::default(),
            selection: SelectionDiagnostics::default(),
        };
        if !bar.has_role(role) {
            return Ok(result);
        }

        let collection = CandidateCollector::new(&self.registry, &self.config).collect(bar, role)?;
        let target = self.density.target(bar, role);
        let selected =
            select_until_target_reached(bar, role, &collection.groups, target, anchors, &mut result.selection);
        result.collection = collection.diagnostics;

        let role_anchors: Vec<GrooveOnset> = anchors
            .iter()
            .filter(|a| a.bar_number == bar.bar_number && &a.role == role)
            .cloned()
            .collect();
        let chosen: Vec<GrooveOnset> = selected.iter().map(|s| s.to_onset(bar)).collect();
        let merged = merge_onsets(&role_anchors, &chosen);

        let outcome = self.filter.apply_role(role, merged);
        result.onsets = outcome.kept;
        result.pruned = outcome.pruned;
        result.protected_over_cap = outcome.cap_exceeded_by_protected;
        Ok(result)
    }

    /// Generate every active role in `bar`, then resolve limb conflicts
    /// across roles.
    pub fn generate_bar(&self, bar: &Bar) -> Result<BarResult> {
        let anchors = self.preset.anchors_for_bar(bar);
        let mut roles = Vec::with_capacity(bar.active_roles.len());
        for role in &bar.active_roles {
            roles.push(self.generate_role(bar, role, &anchors)?);
        }

        // Roles are already within their caps, so this pass only resolves
        // limb conflicts.
        let combined: Vec<GrooveOnset> = roles.iter().flat_map(|r| r.onsets.iter().cloned()).collect();
        let (mut onsets, report) = self.filter.apply_bar(combined);
        EventTiming::new(self.config.ticks_per_beat, bar.beats_per_bar).sort_onsets(&mut onsets);

        debug!(
            bar = bar.bar_number,
            section = ?bar.section_type,
            onsets = onsets.len(),
            conflicts = report.conflicts_dropped.len(),
            "bar generated"
        );
        Ok(BarResult {
            bar: bar.clone(),
            onsets,
            roles,
            conflicts_dropped: report.conflicts_dropped,
            violations: report.violations,
        })
    }

    /// Generate a whole song and run sticking validation over it.
    pub fn generate_song(&self, plan: &SongPlan) -> Result<SongResult> {
        let bars = plan.bars();
        let mut results = Vec::with_capacity(bars.len());
        for bar in &bars {
            let result = self.generate_bar(bar)?;
            info!(
                bar = bar.bar_number,
                section = ?bar.section_type,
                energy = bar.energy_level,
                onsets = result.onsets.len(),
                failures = result.collection_diagnostics().failures.len(),
                "bar"
            );
            results.push(result);
        }

        let mut violations: Vec<StickingViolation> =
            results.iter().flat_map(|r| r.violations.iter().cloned()).collect();
        let song = SongResult {
            bars: results,
            violations: Vec::new(),
            timing: EventTiming::new(self.config.ticks_per_beat, plan.beats_per_bar),
        };
        let all = song.onsets();
        let rules = StickingRules::from_config(&self.config, plan.beats_per_bar);
        violations.extend(rules.validate(&all, &self.filter.model));

        info!(
            bars = song.bars.len(),
            onsets = all.len(),
            violations = violations.len(),
            preset = self.preset.name(),
            "song generated"
        );
        Ok(SongResult { violations, ..song })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::{Beat, SectionType};
    use crate::config::FailurePolicy;
    use crate::density::FixedDensity;
    use crate::error::GrooveError;
    use std::collections::BTreeSet;

    fn generator() -> GrooveGenerator {
        GrooveGenerator::new(GrooveConfig::default()).unwrap()
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        let config = GrooveConfig {
            ticks_per_beat: 0,
            ..GrooveConfig::default()
        };
        assert!(matches!(GrooveGenerator::new(config), Err(GrooveError::Config(_))));
    }

    #[test]
    fn role_keeps_all_anchors() {
        let generator = generator();
        let bar = Bar::new(3, 4, 11).with_energy(0.7);
        let anchors = generator.preset().anchors_for_bar(&bar);
        let result = generator.generate_role(&bar, &Role::Kick, &anchors).unwrap();
        for anchor in anchors.iter().filter(|a| a.role == Role::Kick) {
            assert!(result.onsets.contains(anchor), "missing anchor at {}", anchor.beat);
        }
        assert!(result.onsets.iter().all(|o| o.role == Role::Kick));
    }

    #[test]
    fn inactive_role_is_empty() {
        let generator = generator();
        let bar = Bar::new(1, 4, 1).with_active_roles([Role::Kick]);
        let result = generator.generate_role(&bar, &Role::Snare, &[]).unwrap();
        assert!(result.onsets.is_empty());
        assert_eq!(result.collection.operators_run, 0);
    }

    #[test]
    fn density_target_bounds_selection() {
        let generator = generator().with_density(FixedDensity(2));
        let bar = Bar::new(1, 4, 5).with_energy(0.9);
        let result = generator.generate_role(&bar, &Role::Kick, &[]).unwrap();
        assert!(result.onsets.len() <= 2);
        assert_eq!(result.selection.target_count, 2);
    }

    #[test]
    fn bar_output_is_sorted_and_unique() {
        let generator = generator();
        let bar = Bar::new(4, 4, 99).with_energy(0.8).with_fill_window(true);
        let result = generator.generate_bar(&bar).unwrap();
        let timing = EventTiming::new(480, 4);
        let ticks: Vec<u64> = result.onsets.iter().map(|o| timing.onset_tick(o)).collect();
        assert!(ticks.windows(2).all(|w| w[0] <= w[1]));
        let keys: BTreeSet<_> = result.onsets.iter().map(GrooveOnset::key).collect();
        assert_eq!(keys.len(), result.onsets.len());
        assert!(result.onsets.iter().all(|o| bar.contains(o.beat)));
    }

    #[test]
    fn song_covers_every_bar() {
        let generator = generator();
        let plan = SongPlan::standard(2, 3);
        let song = generator.generate_song(&plan).unwrap();
        assert_eq!(song.bars.len(), 8);
        assert_eq!(song.onset_count(), song.onsets().len());
        assert!(song.bars.iter().all(|b| !b.onsets.is_empty()));
        assert_eq!(song.bars[2].bar.section_type, SectionType::Chorus);
    }

    #[test]
    fn crash_lands_on_section_start() {
        let generator = generator();
        let bar = Bar::new(5, 4, 8).with_section(SectionType::Chorus).with_section_boundary(true);
        let result = generator.generate_bar(&bar).unwrap();
        assert!(
            result
                .onsets
                .iter()
                .any(|o| o.role == Role::Crash && o.beat == Beat::DOWNBEAT)
        );
    }

    #[test]
    fn strict_policy_still_succeeds_without_failures() {
        let config = GrooveConfig {
            failure_policy: FailurePolicy::Strict,
            ..GrooveConfig::default()
        };
        let generator = GrooveGenerator::new(config).unwrap();
        assert!(generator.generate_song(&SongPlan::standard(1, 1)).is_ok());
    }
}
