// PatternSubstitution family: alternative groove shapes for a voice.
//
// A substitution proposes the full alternate pattern. Positions already
// held by anchors are dropped by selection, so what actually lands is the
// difference between the preset groove and the substitute.

use super::{CandidateStream, FillWindowRule, Gate, Operator, OperatorFamily, OperatorMeta, ScoreShaping};
use crate::bar::{Articulation, Bar, Beat, FillRole, Role, SectionType, Strength};
use crate::candidate::OnsetCandidate;

/// Kick on every beat.
#[derive(Debug)]
pub struct KickFourOnFloor {
    meta: OperatorMeta,
}

impl Default for KickFourOnFloor {
    fn default() -> Self {
        KickFourOnFloor {
            meta: OperatorMeta::new("kick-four-on-floor", Role::Kick, OperatorFamily::PatternSubstitution)
                .gate(
                    Gate::default()
                        .energy(0.65, 1.0)
                        .sections([SectionType::PreChorus, SectionType::Chorus])
                        .fill_window(FillWindowRule::Suppressed),
                )
                .shaping(ScoreShaping::base(0.7).boundary(0.15).energy(0.3))
                .velocity(95, 115),
        }
    }
}

impl Operator for KickFourOnFloor {
    fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    fn propose<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a> {
        let meta = &self.meta;
        Box::new((1..=bar.beats_per_bar).map(Beat::whole).map(move |beat| {
            let weight = if beat == Beat::DOWNBEAT { 1.0 } else { 0.9 };
            Ok(OnsetCandidate::new(
                &meta.id,
                bar,
                meta.role.clone(),
                beat,
                Strength::classify(beat, bar),
                meta.score_at(bar, weight),
                meta.velocity_at(bar, beat, seed),
                FillRole::None,
            ))
        }))
    }
}

/// Snare moved to the middle of the bar, the half-time feel.
#[derive(Debug)]
pub struct SnareHalfTime {
    meta: OperatorMeta,
}

impl Default for SnareHalfTime {
    fn default() -> Self {
        SnareHalfTime {
            meta: OperatorMeta::new("snare-half-time", Role::Snare, OperatorFamily::PatternSubstitution)
                .gate(
                    Gate::default()
                        .energy(0.0, 0.5)
                        .sections([SectionType::Intro, SectionType::Bridge, SectionType::Breakdown])
                        .min_beats(2),
                )
                .shaping(ScoreShaping::base(0.7).energy(-0.4))
                .velocity(96, 118),
        }
    }
}

impl Operator for SnareHalfTime {
    fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    /// Odd meters have no middle beat to land on.
    fn applies_to(&self, bar: &Bar) -> bool {
        bar.beats_per_bar % 2 == 0
    }

    fn propose<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a> {
        let meta = &self.meta;
        let beat = Beat::whole(bar.beats_per_bar / 2 + 1);
        Box::new(std::iter::once(Ok(OnsetCandidate::new(
            &meta.id,
            bar,
            meta.role.clone(),
            beat,
            Strength::Backbeat,
            meta.score_at(bar, 1.0),
            meta.velocity_at(bar, beat, seed),
            FillRole::None,
        )
        .with_articulation(Articulation::Rimshot))))
    }
}

/// Ride bell on every beat, replacing the hats' time-keeping in big choruses.
#[derive(Debug)]
pub struct RideBellQuarters {
    meta: OperatorMeta,
}

impl Default for RideBellQuarters {
    fn default() -> Self {
        RideBellQuarters {
            meta: OperatorMeta::new("ride-bell-quarters", Role::Ride, OperatorFamily::PatternSubstitution)
                .gate(
                    Gate::default()
                        .energy(0.7, 1.0)
                        .sections([SectionType::Chorus, SectionType::Outro]),
                )
                .shaping(ScoreShaping::base(0.6).boundary(0.2).energy(0.4))
                .velocity(85, 105),
        }
    }
}

impl Operator for RideBellQuarters {
    fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    fn propose<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a> {
        let meta = &self.meta;
        Box::new((1..=bar.beats_per_bar).map(Beat::whole).map(move |beat| {
            Ok(OnsetCandidate::new(
                &meta.id,
                bar,
                meta.role.clone(),
                beat,
                Strength::classify(beat, bar),
                meta.score_at(bar, 1.0),
                meta.velocity_at(bar, beat, seed),
                FillRole::None,
            )
            .with_articulation(Articulation::Bell))
        }))
    }
}
