// Physicality: can a drummer actually play this?
//
// - `limb.rs`: the role-to-limb table and same-instant conflict test.
// - `sticking.rs`: report-only rate checks (same-limb streaks, ghost
//   density) over a time-ordered onset sequence.
// - `filter.rs`: the two repair passes, overcrowding pruning per role and
//   limb-conflict resolution across roles, bundled as `PhysicalityFilter`.
//
// Findings are `StickingViolation` values returned next to the onsets.
// Nothing in here fails; a caller that wants a hard failure checks the
// violation list itself.

pub mod filter;
pub mod limb;
pub mod sticking;

pub use filter::{
    ConflictResolution, OvercrowdingOutcome, PhysicalityFilter, PhysicalityReport, prevent_overcrowding,
    resolve_limb_conflicts,
};
pub use limb::{Limb, LimbAssignment, LimbModel};
pub use sticking::{StickingRules, StickingViolation};
