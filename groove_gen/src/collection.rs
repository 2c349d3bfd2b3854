// Candidate collection: run every eligible operator for one (bar, role).
//
// For each operator in registry order that targets the role and passes
// `can_apply`, the candidate stream is drained into a scratch buffer. Each
// yielded candidate is validated; malformed ones are dropped and counted.
// If the stream yields an `OperatorError`, that operator's scratch buffer
// is discarded as a unit and a failure record is written. Candidates from
// operators that already finished are never touched. Under
// `FailurePolicy::Strict` the first failure aborts the bar instead.
//
// Surviving candidates are grouped by family in `OperatorFamily::ALL`
// order, one `CandidateGroup` per non-empty family, with the family's cap
// from `GrooveConfig`.
//
// Consumed by `pipeline.rs`; the groups feed `selection.rs`.

use crate::bar::{Bar, Role};
use crate::candidate::{CandidateDefect, CandidateGroup, OnsetCandidate};
use crate::config::{FailurePolicy, GrooveConfig};
use crate::error::{GrooveError, OperatorError, Result};
use crate::operator::{Operator, OperatorFamily};
use crate::registry::OperatorRegistry;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A candidate dropped during validation.
#[derive(Clone, Debug, PartialEq)]
pub struct InvalidCandidate {
    pub operator_id: String,
    pub candidate_id: String,
    pub defect: CandidateDefect,
}

/// An operator whose run was aborted by an error.
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorFailure {
    pub operator_id: String,
    pub family: OperatorFamily,
    pub bar_number: u32,
    pub error: OperatorError,
    /// Valid candidates the operator had produced before failing; discarded.
    pub discarded: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollectionDiagnostics {
    /// Operators for the role that passed `can_apply`.
    pub operators_run: usize,
    /// Operators for the role that were gated out.
    pub operators_skipped: usize,
    pub candidates_accepted: usize,
    pub invalid: Vec<InvalidCandidate>,
    pub failures: Vec<OperatorFailure>,
}

impl CollectionDiagnostics {
    pub fn merge(&mut self, other: CollectionDiagnostics) {
        self.operators_run += other.operators_run;
        self.operators_skipped += other.operators_skipped;
        self.candidates_accepted += other.candidates_accepted;
        self.invalid.extend(other.invalid);
        self.failures.extend(other.failures);
    }
}

/// The output of one collection pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CandidateCollection {
    /// Non-empty groups in family order.
    pub groups: Vec<CandidateGroup>,
    pub diagnostics: CollectionDiagnostics,
}

impl CandidateCollection {
    pub fn candidate_count(&self) -> usize {
        self.groups.iter().map(CandidateGroup::len).sum()
    }
}

/// Runs a registry against bars under one configuration.
#[derive(Debug, Clone, Copy)]
pub struct CandidateCollector<'a> {
    registry: &'a OperatorRegistry,
    config: &'a GrooveConfig,
}

enum OperatorRun {
    Finished(Vec<OnsetCandidate>),
    Failed { error: OperatorError, discarded: usize },
}

impl<'a> CandidateCollector<'a> {
    pub fn new(registry: &'a OperatorRegistry, config: &'a GrooveConfig) -> Self {
        CandidateCollector { registry, config }
    }

    /// Collect and group candidates for `role` in `bar`.
    ///
    /// Returns `Err(GrooveError::OperatorFailed)` only under the strict
    /// policy; otherwise failures are recorded in the diagnostics.
    pub fn collect(&self, bar: &Bar, role: &Role) -> Result<CandidateCollection> {
        let mut diagnostics = CollectionDiagnostics::default();
        let mut by_family: BTreeMap<OperatorFamily, Vec<OnsetCandidate>> = BTreeMap::new();

        for op in self.registry.for_role(role) {
            if !op.can_apply(bar) {
                diagnostics.operators_skipped += 1;
                continue;
            }
            diagnostics.operators_run += 1;

            match run_operator(op, bar, role, &mut diagnostics) {
                OperatorRun::Finished(candidates) => {
                    debug!(
                        operator = op.id(),
                        bar = bar.bar_number,
                        count = candidates.len(),
                        "operator produced candidates"
                    );
                    diagnostics.candidates_accepted += candidates.len();
                    by_family.entry(op.family()).or_default().extend(candidates);
                }
                OperatorRun::Failed { error, discarded } => {
                    if self.config.failure_policy == FailurePolicy::Strict {
                        return Err(GrooveError::OperatorFailed {
                            operator_id: op.id().to_string(),
                            bar_number: bar.bar_number,
                            source: error,
                        });
                    }
                    warn!(
                        operator = op.id(),
                        bar = bar.bar_number,
                        discarded,
                        %error,
                        "operator failed; continuing without it"
                    );
                    diagnostics.failures.push(OperatorFailure {
                        operator_id: op.id().to_string(),
                        family: op.family(),
                        bar_number: bar.bar_number,
                        error,
                        discarded,
                    });
                }
            }
        }

        let groups = OperatorFamily::ALL
            .into_iter()
            .filter_map(|family| {
                let candidates = by_family.remove(&family)?;
                (!candidates.is_empty())
                    .then(|| CandidateGroup::new(family, self.config.group_cap(family), candidates))
            })
            .collect();

        Ok(CandidateCollection { groups, diagnostics })
    }
}

/// Drain one operator's stream, validating as we go.
fn run_operator(op: &dyn Operator, bar: &Bar, role: &Role, diagnostics: &mut CollectionDiagnostics) -> OperatorRun {
    let mut produced = Vec::new();
    for item in op.generate_candidates(bar, bar.seed) {
        let candidate = match item {
            Ok(c) => c,
            Err(error) => {
                return OperatorRun::Failed {
                    error,
                    discarded: produced.len(),
                };
            }
        };
        let check = if &candidate.role != role && !candidate.role.is_blank() {
            Err(CandidateDefect::WrongRole(candidate.role.clone()))
        } else {
            candidate.validate(bar)
        };
        match check {
            Ok(()) => produced.push(candidate),
            Err(defect) => {
                warn!(
                    operator = op.id(),
                    candidate = %candidate.candidate_id,
                    %defect,
                    "dropping invalid candidate"
                );
                diagnostics.invalid.push(InvalidCandidate {
                    operator_id: op.id().to_string(),
                    candidate_id: candidate.candidate_id,
                    defect,
                });
            }
        }
    }
    OperatorRun::Finished(produced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::{Beat, FillRole, SectionType, Strength};
    use crate::operator::{CandidateStream, OperatorMeta};

    /// Test operator that yields a scripted list of items.
    #[derive(Debug)]
    struct Scripted {
        meta: OperatorMeta,
        script: Vec<Step>,
    }

    #[derive(Debug, Clone)]
    enum Step {
        Hit(f64, f64),
        BadBeat,
        Blank,
        Other(Role),
        Fail,
    }

    impl Operator for Scripted {
        fn meta(&self) -> &OperatorMeta {
            &self.meta
        }

        fn propose<'a>(&'a self, bar: &'a Bar, _seed: u64) -> CandidateStream<'a> {
            let id = self.meta.id.as_str();
            let role = self.meta.role.clone();
            Box::new(self.script.iter().map(move |step| {
                let make = |role: Role, beat: Beat, score: f64| {
                    OnsetCandidate::new(id, bar, role, beat, Strength::Offbeat, score, 70, FillRole::None)
                };
                match step {
                    Step::Hit(beat, score) => Ok(make(role.clone(), Beat::from_f64(*beat), *score)),
                    Step::BadBeat => Ok(make(role.clone(), Beat::from_f64(0.5), 0.5)),
                    Step::Blank => Ok(make(Role::Custom(String::new()), Beat::whole(2), 0.5)),
                    Step::Other(r) => Ok(make(r.clone(), Beat::whole(2), 0.5)),
                    Step::Fail => Err(OperatorError::Failed("boom".into())),
                }
            }))
        }
    }

    fn scripted(id: &str, family: OperatorFamily, script: Vec<Step>) -> Box<dyn Operator> {
        Box::new(Scripted {
            meta: OperatorMeta::new(id, Role::Kick, family),
            script,
        })
    }

    fn collect_with(registry: &OperatorRegistry, config: &GrooveConfig) -> Result<CandidateCollection> {
        CandidateCollector::new(registry, config).collect(&Bar::new(3, 4, 99), &Role::Kick)
    }

    #[test]
    fn groups_follow_family_order_and_skip_empty_families() {
        let registry = OperatorRegistry::new(vec![
            scripted("punct", OperatorFamily::PhrasePunctuation, vec![Step::Hit(4.5, 0.9)]),
            scripted("micro", OperatorFamily::MicroAddition, vec![Step::Hit(2.5, 0.4), Step::Hit(3.5, 0.6)]),
            scripted("empty", OperatorFamily::PatternSubstitution, vec![]),
        ])
        .unwrap();
        let collection = collect_with(&registry, &GrooveConfig::default()).unwrap();
        let ids: Vec<&str> = collection.groups.iter().map(|g| g.group_id.as_str()).collect();
        assert_eq!(ids, vec!["MicroAddition", "PhrasePunctuation"]);
        assert_eq!(collection.groups[0].max_adds_per_bar, 2);
        assert!((collection.groups[0].base_probability_bias - 0.5).abs() < 1e-12);
        assert_eq!(collection.candidate_count(), 3);
        assert_eq!(collection.diagnostics.operators_run, 3);
    }

    #[test]
    fn invalid_candidates_are_dropped_and_counted() {
        let registry = OperatorRegistry::new(vec![scripted(
            "mixed",
            OperatorFamily::MicroAddition,
            vec![
                Step::Hit(2.0, 0.5),
                Step::BadBeat,
                Step::Blank,
                Step::Other(Role::Snare),
                Step::Hit(9.0, 0.5),
                Step::Hit(3.0, f64::NAN),
            ],
        )])
        .unwrap();
        let collection = collect_with(&registry, &GrooveConfig::default()).unwrap();
        assert_eq!(collection.candidate_count(), 1);
        let defects: Vec<&CandidateDefect> = collection.diagnostics.invalid.iter().map(|i| &i.defect).collect();
        assert_eq!(defects.len(), 5);
        assert!(matches!(defects[0], CandidateDefect::BeforeBarStart(_)));
        assert_eq!(defects[1], &CandidateDefect::EmptyRole);
        assert_eq!(defects[2], &CandidateDefect::WrongRole(Role::Snare));
        assert!(matches!(defects[3], CandidateDefect::PastBarEnd(_)));
        assert_eq!(defects[4], &CandidateDefect::NonFiniteScore);
    }

    #[test]
    fn failure_discards_only_the_failing_operator() {
        let registry = OperatorRegistry::new(vec![
            scripted("good", OperatorFamily::MicroAddition, vec![Step::Hit(2.0, 0.5)]),
            scripted("bad", OperatorFamily::MicroAddition, vec![Step::Hit(3.0, 0.5), Step::Fail, Step::Hit(4.0, 0.5)]),
            scripted("later", OperatorFamily::PhrasePunctuation, vec![Step::Hit(4.0, 0.7)]),
        ])
        .unwrap();
        let collection = collect_with(&registry, &GrooveConfig::default()).unwrap();
        let ids: Vec<&str> = collection
            .groups
            .iter()
            .flat_map(|g| g.candidates.iter().map(|c| c.operator_id.as_str()))
            .collect();
        assert_eq!(ids, vec!["good", "later"]);
        let failure = &collection.diagnostics.failures[0];
        assert_eq!(failure.operator_id, "bad");
        assert_eq!(failure.discarded, 1);
        assert_eq!(failure.bar_number, 3);
    }

    #[test]
    fn strict_policy_escalates() {
        let registry = OperatorRegistry::new(vec![scripted("bad", OperatorFamily::MicroAddition, vec![Step::Fail])]).unwrap();
        let config = GrooveConfig {
            failure_policy: FailurePolicy::Strict,
            ..Default::default()
        };
        match collect_with(&registry, &config) {
            Err(GrooveError::OperatorFailed { operator_id, bar_number, .. }) => {
                assert_eq!(operator_id, "bad");
                assert_eq!(bar_number, 3);
            }
            other => panic!("expected OperatorFailed, got {other:?}"),
        }
    }

    #[test]
    fn gated_operators_are_skipped() {
        let registry = OperatorRegistry::standard().unwrap();
        let config = GrooveConfig::default();
        let bar = Bar::new(1, 4, 5).with_section(SectionType::Verse).with_bars_until_section_end(4);
        let collection = CandidateCollector::new(&registry, &config).collect(&bar, &Role::Crash).unwrap();
        assert_eq!(collection.candidate_count(), 0);
        assert_eq!(collection.diagnostics.operators_skipped, 1);
        assert!(collection.groups.is_empty());
    }

    #[test]
    fn standard_registry_collection_is_deterministic() {
        let registry = OperatorRegistry::standard().unwrap();
        let config = GrooveConfig::default();
        let collector = CandidateCollector::new(&registry, &config);
        for n in 1..40 {
            let bar = Bar::new(n, 4, 0xfeed)
                .with_energy((n % 10) as f64 / 10.0)
                .with_fill_window(n % 4 == 0)
                .with_bars_until_section_end(4 - n % 4);
            for role in Role::KIT {
                let a = collector.collect(&bar, &role).unwrap();
                let b = collector.collect(&bar, &role).unwrap();
                assert_eq!(a, b);
                assert!(a.diagnostics.invalid.is_empty(), "stock operators produced invalid candidates");
                assert!(a.diagnostics.failures.is_empty());
            }
        }
    }
}
