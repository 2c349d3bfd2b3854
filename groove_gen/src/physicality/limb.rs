// Limbs and the role-to-limb table.
//
// A `LimbModel` is a plain lookup: which of the four limbs plays each kit
// piece. Roles with no entry (custom lanes, or kit pieces a model leaves
// out) are "unmapped" and every physicality check skips them.
//
// Two stock tables ship: right-handed (hats and cymbals on the right hand,
// snare on the left, kick on the right foot) and its mirror image.

use crate::bar::{Beat, Role};
use crate::config::Handedness;
use crate::error::{GrooveError, Result};
use crate::onset::GrooveOnset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Limb {
    RightHand,
    LeftHand,
    RightFoot,
    LeftFoot,
}

impl Limb {
    pub fn mirrored(self) -> Limb {
        match self {
            Limb::RightHand => Limb::LeftHand,
            Limb::LeftHand => Limb::RightHand,
            Limb::RightFoot => Limb::LeftFoot,
            Limb::LeftFoot => Limb::RightFoot,
        }
    }
}

impl fmt::Display for Limb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Limb::RightHand => "right hand",
            Limb::LeftHand => "left hand",
            Limb::RightFoot => "right foot",
            Limb::LeftFoot => "left foot",
        };
        f.write_str(name)
    }
}

/// Roles every limb model must map. A kit without these cannot be
/// checked meaningfully, so a table missing one is a configuration error.
pub const REQUIRED_ROLES: [Role; 3] = [Role::Kick, Role::Snare, Role::ClosedHat];

/// Immutable role-to-limb table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LimbModel {
    limbs: BTreeMap<Role, Limb>,
}

impl LimbModel {
    /// Build from an explicit table.
    pub fn new(limbs: BTreeMap<Role, Limb>) -> Result<Self> {
        if let Some(missing) = REQUIRED_ROLES.iter().find(|r| !limbs.contains_key(*r)) {
            return Err(GrooveError::Config(format!("limb model has no mapping for required role {missing}")));
        }
        Ok(LimbModel { limbs })
    }

    pub fn right_handed() -> Self {
        LimbModel {
            limbs: [
                (Role::Kick, Limb::RightFoot),
                (Role::PedalHat, Limb::LeftFoot),
                (Role::Snare, Limb::LeftHand),
                (Role::ClosedHat, Limb::RightHand),
                (Role::OpenHat, Limb::RightHand),
                (Role::Ride, Limb::RightHand),
                (Role::Crash, Limb::RightHand),
                (Role::HighTom, Limb::LeftHand),
                (Role::MidTom, Limb::RightHand),
                (Role::FloorTom, Limb::RightHand),
            ]
            .into_iter()
            .collect(),
        }
    }

    /// Mirror image of the right-handed table.
    pub fn left_handed() -> Self {
        LimbModel::right_handed().mirrored()
    }

    pub fn for_handedness(handedness: Handedness) -> Self {
        match handedness {
            Handedness::Right => LimbModel::right_handed(),
            Handedness::Left => LimbModel::left_handed(),
        }
    }

    pub fn mirrored(&self) -> Self {
        LimbModel {
            limbs: self.limbs.iter().map(|(role, limb)| (role.clone(), limb.mirrored())).collect(),
        }
    }

    /// The limb that plays `role`, or `None` when the role is unmapped.
    pub fn required_limb(&self, role: &Role) -> Option<Limb> {
        self.limbs.get(role).copied()
    }

    /// Pair an onset with its limb. Unmapped roles yield `None`.
    pub fn assign(&self, onset: &GrooveOnset) -> Option<LimbAssignment> {
        Some(LimbAssignment {
            limb: self.required_limb(&onset.role)?,
            bar_number: onset.bar_number,
            beat: onset.beat,
            role: onset.role.clone(),
            candidate_id: onset.candidate_id().to_string(),
        })
    }
}

impl Default for LimbModel {
    fn default() -> Self {
        LimbModel::right_handed()
    }
}

/// An onset placed on a limb.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LimbAssignment {
    pub limb: Limb,
    pub bar_number: u32,
    pub beat: Beat,
    pub role: Role,
    pub candidate_id: String,
}

impl LimbAssignment {
    /// Same instant, same limb: physically impossible.
    pub fn conflicts_with(&self, other: &LimbAssignment) -> bool {
        self.bar_number == other.bar_number && self.beat == other.beat && self.limb == other.limb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;
    use groove_prng::GrooveRng;

    #[test]
    fn right_handed_table() {
        let model = LimbModel::right_handed();
        assert_eq!(model.required_limb(&Role::Kick), Some(Limb::RightFoot));
        assert_eq!(model.required_limb(&Role::Snare), Some(Limb::LeftHand));
        assert_eq!(model.required_limb(&Role::ClosedHat), Some(Limb::RightHand));
        assert_eq!(model.required_limb(&Role::Custom("Shaker".into())), None);
    }

    #[test]
    fn left_handed_is_the_mirror() {
        let right = LimbModel::right_handed();
        let left = LimbModel::left_handed();
        for role in Role::KIT {
            assert_eq!(left.required_limb(&role), right.required_limb(&role).map(Limb::mirrored));
        }
        assert_eq!(left.mirrored(), right);
    }

    #[test]
    fn missing_required_mapping_is_a_config_error() {
        let mut limbs: BTreeMap<Role, Limb> = [(Role::Kick, Limb::RightFoot), (Role::Snare, Limb::LeftHand)].into_iter().collect();
        assert!(matches!(LimbModel::new(limbs.clone()), Err(GrooveError::Config(_))));
        limbs.insert(Role::ClosedHat, Limb::RightHand);
        let model = LimbModel::new(limbs).unwrap();
        assert_eq!(model.required_limb(&Role::Ride), None);
    }

    #[test]
    fn unmapped_roles_get_no_assignment() {
        let bar = Bar::new(1, 4, 0);
        let onset = GrooveOnset::anchor(&bar, Role::Custom("Clap".into()), Beat::whole(2), 90);
        assert!(LimbModel::right_handed().assign(&onset).is_none());
    }

    #[test]
    fn hat_and_crash_together_conflict() {
        let bar = Bar::new(1, 4, 0);
        let model = LimbModel::right_handed();
        let hat = model.assign(&GrooveOnset::anchor(&bar, Role::ClosedHat, Beat::DOWNBEAT, 90)).unwrap();
        let crash = model.assign(&GrooveOnset::anchor(&bar, Role::Crash, Beat::DOWNBEAT, 120)).unwrap();
        let kick = model.assign(&GrooveOnset::anchor(&bar, Role::Kick, Beat::DOWNBEAT, 110)).unwrap();
        assert!(hat.conflicts_with(&crash));
        assert!(!hat.conflicts_with(&kick));
    }

    #[test]
    fn conflict_is_symmetric() {
        let mut rng = GrooveRng::new(11);
        let model = LimbModel::right_handed();
        let random_assignment = |rng: &mut GrooveRng| {
            let bar = Bar::new(rng.range_u64(1, 3) as u32, 4, 0);
            let role = Role::KIT[rng.range_usize(0, Role::KIT.len())].clone();
            let beat = Beat::from_units(rng.range_u64(0, 8) as i64 * 240);
            model.assign(&GrooveOnset::anchor(&bar, role, beat, 80)).unwrap()
        };
        for _ in 0..2000 {
            let a = random_assignment(&mut rng);
            let b = random_assignment(&mut rng);
            assert_eq!(a.conflicts_with(&b), b.conflicts_with(&a));
            assert!(a.conflicts_with(&a));
        }
    }
}
