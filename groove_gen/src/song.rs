// Song planning: sections in, bars out.
//
// The arrangement layer is outside the generator proper; this is the
// minimal version the CLI, tests and benches need. A `SongPlan` is a list
// of sections, each with a type, a length in bars, an energy level and an
// active-role set. `bars()` flattens it into `Bar`s with the boundary
// flags filled in:
//
// - first bar of a section: `is_at_section_boundary`
// - last bar of a section: `is_fill_window`, `bars_until_section_end == 1`
//
// Each bar gets its own seed, `OnsetHasher(song_seed).absorb(bar_number)`,
// so any bar can be regenerated alone.

use crate::bar::{Bar, Role, SectionType};
use groove_prng::OnsetHasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectionPlan {
    pub section_type: SectionType,
    pub bars: u32,
    pub energy: f64,
    /// `None` uses the stock kit for the section type.
    pub active_roles: Option<BTreeSet<Role>>,
}

impl SectionPlan {
    pub fn new(section_type: SectionType, bars: u32, energy: f64) -> Self {
        SectionPlan {
            section_type,
            bars,
            energy,
            active_roles: None,
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.active_roles = Some(roles.into_iter().collect());
        self
    }

    pub fn roles(&self) -> BTreeSet<Role> {
        self.active_roles
            .clone()
            .unwrap_or_else(|| default_roles(self.section_type))
    }
}

/// Stock kit per section type: ride in the big sections, hats elsewhere.
pub fn default_roles(section_type: SectionType) -> BTreeSet<Role> {
    let cymbals = match section_type {
        SectionType::Chorus | SectionType::Outro => vec![Role::Ride],
        _ => vec![Role::ClosedHat, Role::OpenHat],
    };
    [Role::Kick, Role::Snare, Role::Crash, Role::HighTom, Role::MidTom, Role::FloorTom]
        .into_iter()
        .chain(cymbals)
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SongPlan {
    pub beats_per_bar: u32,
    pub seed: u64,
    pub sections: Vec<SectionPlan>,
}

impl SongPlan {
    pub fn new(beats_per_bar: u32, seed: u64) -> Self {
        SongPlan {
            beats_per_bar: beats_per_bar.max(1),
            seed,
            sections: Vec::new(),
        }
    }

    pub fn section(mut self, section: SectionPlan) -> Self {
        self.sections.push(section);
        self
    }

    /// Verse, chorus, bridge, chorus in 4/4.
    pub fn standard(bars_per_section: u32, seed: u64) -> Self {
        SongPlan::new(4, seed)
            .section(SectionPlan::new(SectionType::Verse, bars_per_section, 0.5))
            .section(SectionPlan::new(SectionType::Chorus, bars_per_section, 0.8))
            .section(SectionPlan::new(SectionType::Bridge, bars_per_section, 0.4))
            .section(SectionPlan::new(SectionType::Chorus, bars_per_section, 0.9))
    }

    pub fn total_bars(&self) -> u32 {
        self.sections.iter().map(|s| s.bars).sum()
    }

    pub fn bar_seed(&self, bar_number: u32) -> u64 {
        OnsetHasher::new(self.seed).absorb(bar_number as u64).finish()
    }

    /// Every bar of the song, in order. Empty sections contribute nothing.
    pub fn bars(&self) -> Vec<Bar> {
        let mut bars = Vec::with_capacity(self.total_bars() as usize);
        let mut bar_number = 1;
        for section in &self.sections {
            let roles = section.roles();
            for i in 0..section.bars {
                bars.push(
                    Bar::new(bar_number, self.beats_per_bar, self.bar_seed(bar_number))
                        .with_section(section.section_type)
                        .with_energy(section.energy)
                        .with_section_boundary(i == 0)
                        .with_fill_window(i + 1 == section.bars)
                        .with_bars_until_section_end(section.bars - i)
                        .with_active_roles(roles.iter().cloned()),
                );
                bar_number += 1;
            }
        }
        bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_mark_section_edges() {
        let bars = SongPlan::standard(4, 1).bars();
        assert_eq!(bars.len(), 16);
        let numbers: Vec<u32> = bars.iter().map(|b| b.bar_number).collect();
        assert_eq!(numbers, (1..=16).collect::<Vec<_>>());

        let starts: Vec<u32> = bars.iter().filter(|b| b.is_at_section_boundary).map(|b| b.bar_number).collect();
        assert_eq!(starts, vec![1, 5, 9, 13]);
        let fills: Vec<u32> = bars.iter().filter(|b| b.is_fill_window).map(|b| b.bar_number).collect();
        assert_eq!(fills, vec![4, 8, 12, 16]);
        assert!(bars.iter().filter(|b| b.is_fill_window).all(|b| b.is_phrase_end()));
        assert_eq!(bars[0].bars_until_section_end, 4);
        assert_eq!(bars[4].section_type, SectionType::Chorus);
        assert_eq!(bars[4].energy_level, 0.8);
    }

    #[test]
    fn chorus_swaps_hats_for_ride() {
        let bars = SongPlan::standard(2, 1).bars();
        assert!(bars[0].has_role(&Role::ClosedHat) && !bars[0].has_role(&Role::Ride));
        assert!(bars[2].has_role(&Role::Ride) && !bars[2].has_role(&Role::ClosedHat));
    }

    #[test]
    fn one_bar_section_is_both_start_and_fill() {
        let plan = SongPlan::new(3, 9).section(SectionPlan::new(SectionType::Intro, 1, 0.3).with_roles([Role::Kick]));
        let bars = plan.bars();
        assert_eq!(bars.len(), 1);
        assert!(bars[0].is_at_section_boundary && bars[0].is_fill_window);
        assert_eq!(bars[0].beats_per_bar, 3);
        assert_eq!(bars[0].active_roles.len(), 1);
    }

    #[test]
    fn bar_seeds_are_stable_and_distinct() {
        let plan = SongPlan::standard(8, 77);
        let seeds: BTreeSet<u64> = plan.bars().iter().map(|b| b.seed).collect();
        assert_eq!(seeds.len(), 32);
        assert_eq!(plan.bar_seed(5), SongPlan::standard(1, 77).bar_seed(5));
        assert_ne!(plan.bar_seed(5), SongPlan::standard(8, 78).bar_seed(5));
    }
}
