// MicroAddition family: single ornamental hits layered onto the groove.
//
// - `GhostAroundBackbeat`: soft snare strokes a sixteenth before or after
//   each backbeat, laid back by a few ticks.
// - `KickPickup`: kick on the last "and"/"a" of the bar, pushing into the
//   next downbeat. Stronger at phrase ends.
// - `KickOffbeatDouble`: kick on the "and" after each non-backbeat beat,
//   the classic doubled-kick variation.
// - `OpenHatBark`: an open hi-hat on the final offbeat (and, at high
//   energy, the offbeat before each backbeat). Barks substitute for the
//   closed hat the right hand would otherwise play there.

use super::{
    CandidateStream, FillWindowRule, Gate, Operator, OperatorFamily, OperatorMeta, ScoreShaping,
};
use crate::bar::{Articulation, Bar, Beat, EIGHTH, FillRole, Role, SectionType, SIXTEENTH, Strength};
use crate::candidate::{OnsetCandidate, TAG_SUBSTITUTE};

/// Maximum lay-back applied to ghost notes, in ticks.
const GHOST_LAYBACK_TICKS: i32 = 12;

#[derive(Debug)]
pub struct GhostAroundBackbeat {
    meta: OperatorMeta,
    /// Offset from the backbeat in beat units (negative = before).
    offset: i64,
}

impl GhostAroundBackbeat {
    pub fn before() -> Self {
        GhostAroundBackbeat {
            meta: OperatorMeta::new("snare-ghost-before-backbeat", Role::Snare, OperatorFamily::MicroAddition)
                .gate(Gate::default().energy(0.25, 1.0).min_beats(2))
                .shaping(ScoreShaping::base(0.55).energy(0.4))
                .velocity(28, 45),
            offset: -SIXTEENTH,
        }
    }

    pub fn after() -> Self {
        GhostAroundBackbeat {
            meta: OperatorMeta::new("snare-ghost-after-backbeat", Role::Snare, OperatorFamily::MicroAddition)
                .gate(Gate::default().energy(0.4, 1.0).min_beats(2))
                .shaping(ScoreShaping::base(0.45).energy(0.6))
                .velocity(25, 40),
            offset: SIXTEENTH,
        }
    }
}

impl Operator for GhostAroundBackbeat {
    fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    fn propose<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a> {
        let meta = &self.meta;
        Box::new(
            bar.backbeat_beats
                .iter()
                .map(move |&b| Beat::whole(b).offset(self.offset))
                .filter(move |beat| bar.contains(*beat))
                .map(move |beat| {
                    // Per-position variation so not every ghost scores alike.
                    let weight = 0.8 + 0.2 * meta.coin(bar, beat, seed);
                    let layback = meta.timing_nudge(bar, beat, seed, GHOST_LAYBACK_TICKS).abs();
                    Ok(OnsetCandidate::new(
                        &meta.id,
                        bar,
                        meta.role.clone(),
                        beat,
                        Strength::Ghost,
                        meta.score_at(bar, weight),
                        meta.velocity_at(bar, beat, seed),
                        FillRole::None,
                    )
                    .with_timing(layback)
                    .with_tag("ghost"))
                }),
        )
    }
}

#[derive(Debug)]
pub struct KickPickup {
    meta: OperatorMeta,
}

impl Default for KickPickup {
    fn default() -> Self {
        KickPickup {
            meta: OperatorMeta::new("kick-pickup", Role::Kick, OperatorFamily::MicroAddition)
                .gate(
                    Gate::default()
                        .energy(0.35, 1.0)
                        .sections([
                            SectionType::Verse,
                            SectionType::PreChorus,
                            SectionType::Chorus,
                            SectionType::Bridge,
                            SectionType::Outro,
                        ])
                        .min_beats(2),
                )
                .shaping(ScoreShaping::base(0.5).phrase_end(0.4).energy(0.3))
                .velocity(70, 95),
        }
    }
}

impl Operator for KickPickup {
    fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    fn propose<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a> {
        let meta = &self.meta;
        let last = bar.last_beat();
        // The "a" pushes harder than the "and"; both are offered.
        let spots = [(last.offset(EIGHTH), 0.85), (last.offset(3 * SIXTEENTH), 1.0)];
        Box::new(spots.into_iter().map(move |(beat, weight)| {
            Ok(OnsetCandidate::new(
                &meta.id,
                bar,
                meta.role.clone(),
                beat,
                Strength::Pickup,
                meta.score_at(bar, weight),
                meta.velocity_at(bar, beat, seed),
                FillRole::None,
            ))
        }))
    }
}

#[derive(Debug)]
pub struct KickOffbeatDouble {
    meta: OperatorMeta,
}

impl Default for KickOffbeatDouble {
    fn default() -> Self {
        KickOffbeatDouble {
            meta: OperatorMeta::new("kick-offbeat-double", Role::Kick, OperatorFamily::MicroAddition)
                .gate(Gate::default().energy(0.3, 1.0).fill_window(FillWindowRule::Suppressed).min_beats(2))
                .shaping(ScoreShaping::base(0.45).energy(0.6))
                .velocity(65, 90),
        }
    }
}

impl Operator for KickOffbeatDouble {
    fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    fn propose<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a> {
        let meta = &self.meta;
        Box::new(
            (1..=bar.beats_per_bar)
                .map(Beat::whole)
                .filter(move |beat| !bar.is_backbeat(*beat))
                .map(|beat| beat.offset(EIGHTH))
                .map(move |beat| {
                    // Earlier doubles sit better than ones crowding the turnaround.
                    let position = beat.whole_beat() as f64 / bar.beats_per_bar as f64;
                    let weight = 1.0 - 0.25 * position + 0.1 * meta.coin(bar, beat, seed);
                    Ok(OnsetCandidate::new(
                        &meta.id,
                        bar,
                        meta.role.clone(),
                        beat,
                        Strength::Offbeat,
                        meta.score_at(bar, weight),
                        meta.velocity_at(bar, beat, seed),
                        FillRole::None,
                    ))
                }),
        )
    }
}

#[derive(Debug)]
pub struct OpenHatBark {
    meta: OperatorMeta,
    /// Energy above which the pre-backbeat barks are offered as well.
    busy_energy: f64,
}

impl Default for OpenHatBark {
    fn default() -> Self {
        OpenHatBark {
            meta: OperatorMeta::new("open-hat-bark", Role::OpenHat, OperatorFamily::MicroAddition)
                .gate(Gate::default().energy(0.3, 1.0).fill_window(FillWindowRule::Suppressed).min_beats(2))
                .shaping(ScoreShaping::base(0.4).boundary(0.2).energy(0.5))
                .velocity(75, 100),
            busy_energy: 0.7,
        }
    }
}

impl Operator for OpenHatBark {
    fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    fn propose<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a> {
        let meta = &self.meta;
        let mut spots = vec![(bar.last_beat().offset(EIGHTH), 1.0)];
        if bar.energy_level > self.busy_energy {
            spots.extend(
                bar.backbeat_beats
                    .iter()
                    .filter(|&&b| b > 1)
                    .map(|&b| (Beat::whole(b - 1).offset(EIGHTH), 0.7)),
            );
        }
        spots.sort_by_key(|(beat, _)| *beat);
        spots.dedup_by_key(|(beat, _)| *beat);
        Box::new(spots.into_iter().map(move |(beat, weight)| {
            Ok(OnsetCandidate::new(
                &meta.id,
                bar,
                meta.role.clone(),
                beat,
                Strength::Offbeat,
                meta.score_at(bar, weight),
                meta.velocity_at(bar, beat, seed),
                FillRole::None,
            )
            .with_articulation(Articulation::OpenHat)
            .with_tag(TAG_SUBSTITUTE))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(op: &dyn Operator, bar: &Bar) -> Vec<OnsetCandidate> {
        op.generate_candidates(bar, bar.seed).map(|c| c.unwrap()).collect()
    }

    #[test]
    fn ghosts_flank_backbeats() {
        let bar = Bar::new(3, 4, 11).with_energy(0.6);
        let before = collect(&GhostAroundBackbeat::before(), &bar);
        let beats: Vec<Beat> = before.iter().map(|c| c.onset_beat).collect();
        assert_eq!(beats, vec![Beat::at(1, 3 * SIXTEENTH), Beat::at(3, 3 * SIXTEENTH)]);
        assert!(before.iter().all(|c| c.strength == Strength::Ghost));
        assert!(before.iter().all(|c| (28..=45).contains(&c.velocity_hint)));
        assert!(before.iter().all(|c| c.timing_hint.unwrap_or(0) >= 0));

        let after = collect(&GhostAroundBackbeat::after(), &bar);
        // The ghost after beat 4 would fall at 4.25, still inside the bar.
        assert_eq!(after.last().map(|c| c.onset_beat), Some(Beat::at(4, SIXTEENTH)));
    }

    #[test]
    fn ghosts_silent_at_low_energy() {
        let bar = Bar::new(3, 4, 11).with_energy(0.1);
        assert!(collect(&GhostAroundBackbeat::before(), &bar).is_empty());
    }

    #[test]
    fn kick_pickup_targets_last_beat() {
        let bar = Bar::new(8, 4, 2).with_energy(0.6);
        let c = collect(&KickPickup::default(), &bar);
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].onset_beat, Beat::at(4, EIGHTH));
        assert_eq!(c[1].onset_beat, Beat::at(4, 3 * SIXTEENTH));
        assert!(c[1].score > c[0].score);
    }

    #[test]
    fn kick_pickup_skips_intro() {
        let bar = Bar::new(1, 4, 2).with_energy(0.6).with_section(SectionType::Intro);
        assert!(collect(&KickPickup::default(), &bar).is_empty());
    }

    #[test]
    fn offbeat_doubles_avoid_backbeats() {
        let bar = Bar::new(2, 4, 5).with_energy(0.7).with_bars_until_section_end(3);
        let c = collect(&KickOffbeatDouble::default(), &bar);
        let beats: Vec<Beat> = c.iter().map(|c| c.onset_beat).collect();
        assert_eq!(beats, vec![Beat::at(1, EIGHTH), Beat::at(3, EIGHTH)]);
    }

    #[test]
    fn barks_grow_with_energy() {
        let calm = Bar::new(2, 4, 5).with_energy(0.5);
        let busy = Bar::new(2, 4, 5).with_energy(0.9);
        assert_eq!(collect(&OpenHatBark::default(), &calm).len(), 1);
        let c = collect(&OpenHatBark::default(), &busy);
        assert_eq!(c.len(), 3);
        assert!(c.iter().all(|c| c.articulation_hint == Some(Articulation::OpenHat) && c.is_substitute()));
        assert!(c.windows(2).all(|w| w[0].onset_beat < w[1].onset_beat));
    }
}
