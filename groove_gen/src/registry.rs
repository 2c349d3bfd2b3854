// The operator registry: the closed set of operators a generator runs.
//
// Built once, then shared read-only (it is `Send + Sync`, so bars may be
// generated in parallel against the same registry). Iteration follows
// insertion order, which together with family-ordered grouping makes the
// candidate pool independent of anything but the registry contents.
//
// `OperatorRegistry::standard()` assembles the stock catalogue from the
// four family modules.

use crate::bar::Role;
use crate::error::{GrooveError, Result};
use crate::operator::micro_addition::{GhostAroundBackbeat, KickOffbeatDouble, KickPickup, OpenHatBark};
use crate::operator::punctuation::{CrashSectionStart, KickSetupPush, SnareFill, TomFill};
use crate::operator::subdivision::{HatSixteenths, HatTripletShuffle, RideEighths};
use crate::operator::substitution::{KickFourOnFloor, RideBellQuarters, SnareHalfTime};
use crate::operator::{Operator, OperatorFamily};
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct OperatorRegistry {
    operators: Vec<Box<dyn Operator>>,
    by_id: BTreeMap<String, usize>,
}

impl OperatorRegistry {
    /// Build a registry, rejecting empty or duplicate operator ids.
    pub fn new(operators: Vec<Box<dyn Operator>>) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for (index, op) in operators.iter().enumerate() {
            if op.id().trim().is_empty() {
                return Err(GrooveError::Config(format!("operator #{index} has an empty id")));
            }
            if by_id.insert(op.id().to_string(), index).is_some() {
                return Err(GrooveError::Config(format!("duplicate operator id '{}'", op.id())));
            }
        }
        Ok(OperatorRegistry { operators, by_id })
    }

    /// The stock catalogue, grouped by family.
    pub fn standard() -> Result<Self> {
        let operators: Vec<Box<dyn Operator>> = vec![
            // MicroAddition
            Box::new(GhostAroundBackbeat::before()),
            Box::new(GhostAroundBackbeat::after()),
            Box::new(KickPickup::default()),
            Box::new(KickOffbeatDouble::default()),
            Box::new(OpenHatBark::default()),
            // SubdivisionTransform
            Box::new(HatSixteenths::default()),
            Box::new(HatTripletShuffle::default()),
            Box::new(RideEighths::default()),
            // PatternSubstitution
            Box::new(KickFourOnFloor::default()),
            Box::new(SnareHalfTime::default()),
            Box::new(RideBellQuarters::default()),
            // PhrasePunctuation
            Box::new(CrashSectionStart::default()),
            Box::new(KickSetupPush::default()),
            Box::new(SnareFill::default()),
            Box::new(TomFill::high()),
            Box::new(TomFill::mid()),
            Box::new(TomFill::floor()),
        ];
        OperatorRegistry::new(operators)
    }

    pub fn get(&self, id: &str) -> Option<&dyn Operator> {
        self.by_id.get(id).map(|&i| self.operators[i].as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Operator> + '_ {
        self.operators.iter().map(|op| op.as_ref())
    }

    /// Operators targeting `role`, in registry order.
    pub fn for_role<'a>(&'a self, role: &'a Role) -> impl Iterator<Item = &'a dyn Operator> + 'a {
        self.iter().filter(move |op| op.role() == role)
    }

    pub fn in_family(&self, family: OperatorFamily) -> impl Iterator<Item = &dyn Operator> + '_ {
        self.iter().filter(move |op| op.family() == family)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::{Bar, SectionType};
    use crate::onset::GrooveOnset;
    use crate::operator::{CandidateStream, OperatorMeta};
    use crate::preset::GroovePreset;
    use std::collections::BTreeSet;

    #[derive(Debug)]
    struct Silent(OperatorMeta);

    impl Operator for Silent {
        fn meta(&self) -> &OperatorMeta {
            &self.0
        }

        fn propose<'a>(&'a self, _bar: &'a Bar, _seed: u64) -> CandidateStream<'a> {
            Box::new(std::iter::empty())
        }
    }

    fn silent(id: &str) -> Box<dyn Operator> {
        Box::new(Silent(OperatorMeta::new(id, Role::Kick, OperatorFamily::MicroAddition)))
    }

    #[test]
    fn standard_catalogue_covers_every_family() {
        let registry = OperatorRegistry::standard().unwrap();
        assert_eq!(registry.len(), 17);
        for family in OperatorFamily::ALL {
            assert!(registry.in_family(family).count() >= 3, "{family} is thin");
        }
        assert_eq!(registry.get("snare-fill").map(|op| op.role()), Some(&Role::Snare));
        assert!(registry.get("no-such-operator").is_none());
    }

    // Anchors always win their slot, so an operator whose every proposal
    // lands on an anchor can never add a hit.
    #[test]
    fn every_stock_operator_can_land_off_the_anchors() {
        let registry = OperatorRegistry::standard().unwrap();
        let mut bars = Vec::new();
        for section in SectionType::ALL {
            for energy in [0.1, 0.3, 0.5, 0.7, 0.9] {
                for (fill, boundary) in [(false, false), (true, false), (false, true), (true, true)] {
                    bars.push(
                        Bar::new(3, 4, 77)
                            .with_section(section)
                            .with_energy(energy)
                            .with_fill_window(fill)
                            .with_section_boundary(boundary),
                    );
                }
            }
        }

        for op in registry.iter() {
            let useful = GroovePreset::ALL.into_iter().any(|preset| {
                bars.iter().any(|bar| {
                    let anchors: BTreeSet<_> = preset.anchors_for_bar(bar).iter().map(GrooveOnset::key).collect();
                    op.generate_candidates(bar, bar.seed)
                        .flatten()
                        .any(|c| !anchors.contains(&(bar.bar_number, c.onset_beat, c.role.clone())))
                })
            });
            assert!(useful, "{} only ever proposes anchor positions", op.id());
        }
    }

    #[test]
    fn iteration_keeps_insertion_order() {
        let registry = OperatorRegistry::new(vec![silent("b"), silent("a"), silent("c")]).unwrap();
        let ids: Vec<&str> = registry.iter().map(|op| op.id()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let err = OperatorRegistry::new(vec![silent("x"), silent("x")]).unwrap_err();
        assert!(matches!(err, GrooveError::Config(_)));
        assert!(OperatorRegistry::new(vec![silent(" ")]).is_err());
    }

    #[test]
    fn role_filter() {
        let registry = OperatorRegistry::standard().unwrap();
        let kick: Vec<&str> = registry.for_role(&Role::Kick).map(|op| op.id()).collect();
        assert_eq!(
            kick,
            vec!["kick-pickup", "kick-offbeat-double", "kick-four-on-floor", "kick-setup-push"]
        );
    }
}
