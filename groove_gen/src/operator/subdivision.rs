// SubdivisionTransform family: re-grid a time-keeping voice.
//
// These operators offer a full grid for their role; the density target and
// group cap decide how much of it survives selection. Positional weights
// favour beats over offbeats over sixteenths, so a low target yields the
// musically important subset first.

use super::{CandidateStream, Gate, Operator, OperatorFamily, OperatorMeta, ScoreShaping, VelocityRange};
use crate::bar::{
    Articulation, Bar, Beat, EIGHTH, FillRole, Role, SIXTEENTH, SectionType, Strength, TRIPLET,
};
use crate::candidate::OnsetCandidate;

/// Positional weight and accent range for a grid position.
fn accent(beat: Beat, bar: &Bar) -> (f64, VelocityRange) {
    if beat.is_whole() {
        (1.0, VelocityRange::new(88, 108))
    } else if beat.fraction_units() == EIGHTH {
        (0.85, VelocityRange::new(70, 86))
    } else if bar.energy_level > 0.8 {
        (0.7, VelocityRange::new(55, 70))
    } else {
        (0.6, VelocityRange::new(48, 62))
    }
}

/// Emit one candidate per grid position, accenting by position.
fn grid_candidates<'a>(
    meta: &'a OperatorMeta,
    bar: &'a Bar,
    seed: u64,
    positions: impl Iterator<Item = Beat> + 'a,
) -> CandidateStream<'a> {
    Box::new(positions.map(move |beat| {
        let (weight, range) = accent(beat, bar);
        Ok(OnsetCandidate::new(
            &meta.id,
            bar,
            meta.role.clone(),
            beat,
            Strength::classify(beat, bar),
            meta.score_at(bar, weight),
            range.pick(meta.hash(bar, beat, seed)),
            FillRole::None,
        ))
    }))
}

#[derive(Debug)]
pub struct HatSixteenths {
    meta: OperatorMeta,
}

impl Default for HatSixteenths {
    fn default() -> Self {
        HatSixteenths {
            meta: OperatorMeta::new("hat-sixteenths", Role::ClosedHat, OperatorFamily::SubdivisionTransform)
                .gate(Gate::default().energy(0.6, 1.0))
                .shaping(ScoreShaping::base(0.6).energy(0.5)),
        }
    }
}

impl Operator for HatSixteenths {
    fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    fn propose<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a> {
        grid_candidates(&self.meta, bar, seed, bar.grid(SIXTEENTH))
    }
}

/// Swung hats on the first and third triplet partial of each beat.
#[derive(Debug)]
pub struct HatTripletShuffle {
    meta: OperatorMeta,
}

impl Default for HatTripletShuffle {
    fn default() -> Self {
        HatTripletShuffle {
            meta: OperatorMeta::new("hat-triplet-shuffle", Role::ClosedHat, OperatorFamily::SubdivisionTransform)
                .gate(
                    Gate::default()
                        .energy(0.3, 0.8)
                        .sections([SectionType::Verse, SectionType::Bridge]),
                )
                .shaping(ScoreShaping::base(0.5))
                .velocity(60, 84),
        }
    }
}

impl Operator for HatTripletShuffle {
    fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    fn propose<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a> {
        let meta = &self.meta;
        Box::new(
            (1..=bar.beats_per_bar)
                .flat_map(|n| [Beat::whole(n), Beat::at(n, 2 * TRIPLET)])
                .map(move |beat| {
                    let (weight, strength) = if beat.is_whole() {
                        (1.0, Strength::classify(beat, bar))
                    } else {
                        (0.8, Strength::Offbeat)
                    };
                    Ok(OnsetCandidate::new(
                        &meta.id,
                        bar,
                        meta.role.clone(),
                        beat,
                        strength,
                        meta.score_at(bar, weight),
                        meta.velocity_at(bar, beat, seed),
                        FillRole::None,
                    )
                    .with_tag("swing"))
                }),
        )
    }
}

/// Ride cymbal eighths with the bell on the downbeat.
#[derive(Debug)]
pub struct RideEighths {
    meta: OperatorMeta,
}

impl Default for RideEighths {
    fn default() -> Self {
        RideEighths {
            meta: OperatorMeta::new("ride-eighths", Role::Ride, OperatorFamily::SubdivisionTransform)
                .gate(Gate::default().energy(0.5, 1.0).sections([
                    SectionType::Chorus,
                    SectionType::Bridge,
                    SectionType::Outro,
                ]))
                .shaping(ScoreShaping::base(0.55).boundary(0.1).energy(0.4)),
        }
    }
}

impl Operator for RideEighths {
    fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    fn propose<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a> {
        Box::new(grid_candidates(&self.meta, bar, seed, bar.grid(EIGHTH)).map(|item| {
            item.map(|c| {
                if c.onset_beat == Beat::DOWNBEAT {
                    c.with_articulation(Articulation::Bell)
                } else {
                    c
                }
            })
        }))
    }
}
