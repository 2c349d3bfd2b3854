// PhrasePunctuation family: gestures that mark section edges.
//
// - `CrashSectionStart`: crash on the downbeat of a section's first bar,
//   protected so it takes the right hand from the hat on that downbeat.
// - `KickSetupPush`: a kick "setup" on the last offbeat of a section.
// - `SnareFill`: sixteenth-note snare fill over the end of a fill-window
//   bar, thinned at low energy, crescendoing into a protected FillEnd.
// - `TomFill`: a high-to-floor tom run. One operator per tom; each covers
//   its segment of the same fill span so the three together descend the kit.
//   Tom strokes substitute for the cymbal pattern on the same hand.
//
// Fill gestures tag their last stroke `FillEnd`, which makes it protected:
// overcrowding pruning keeps it no matter the hit cap.

use super::{
    CandidateStream, FillWindowRule, Gate, Operator, OperatorFamily, OperatorMeta, ScoreShaping, VelocityRange,
};
use crate::bar::{Articulation, Bar, Beat, BEAT_DIVISIONS, EIGHTH, FillRole, Role, SIXTEENTH, Strength};
use crate::candidate::{OnsetCandidate, TAG_PROTECTED, TAG_SUBSTITUTE};
use crate::error::OperatorError;

/// Energy at which fills move from the snare to the toms.
const TOM_FILL_ENERGY: f64 = 0.6;

/// Sixteenth positions covering the last `span` beats of the bar.
fn fill_positions(bar: &Bar, span: u32) -> Vec<Beat> {
    let span = span.clamp(1, bar.beats_per_bar) as i64;
    let start = (bar.beats_per_bar as i64 - span) * BEAT_DIVISIONS;
    let end = bar.beats_per_bar as i64 * BEAT_DIVISIONS;
    (start..end).step_by(SIXTEENTH as usize).map(Beat::from_units).collect()
}

fn fill_role_at(index: usize, len: usize) -> FillRole {
    if index + 1 == len {
        FillRole::FillEnd
    } else if index == 0 {
        FillRole::FillStart
    } else {
        FillRole::FillBody
    }
}

#[derive(Debug)]
pub struct CrashSectionStart {
    meta: OperatorMeta,
}

impl Default for CrashSectionStart {
    fn default() -> Self {
        CrashSectionStart {
            meta: OperatorMeta::new("crash-section-start", Role::Crash, OperatorFamily::PhrasePunctuation)
                .gate(Gate::default().energy(0.3, 1.0).at_section_start())
                .shaping(ScoreShaping::base(0.8).boundary(0.2).energy(0.2))
                .velocity(100, 122),
        }
    }
}

impl Operator for CrashSectionStart {
    fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    fn propose<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a> {
        let meta = &self.meta;
        let beat = Beat::DOWNBEAT;
        Box::new(std::iter::once(Ok(OnsetCandidate::new(
            &meta.id,
            bar,
            meta.role.clone(),
            beat,
            Strength::Downbeat,
            meta.score_at(bar, 1.0),
            meta.velocity_at(bar, beat, seed),
            FillRole::None,
        )
        .with_tag("section-start")
        .with_tag(TAG_PROTECTED))))
    }
}

#[derive(Debug)]
pub struct KickSetupPush {
    meta: OperatorMeta,
}

impl Default for KickSetupPush {
    fn default() -> Self {
        KickSetupPush {
            meta: OperatorMeta::new("kick-setup-push", Role::Kick, OperatorFamily::PhrasePunctuation)
                .gate(Gate::default().energy(0.4, 1.0).min_beats(2).at_phrase_end())
                .shaping(ScoreShaping::base(0.6).phrase_end(0.3).energy(0.2))
                .velocity(90, 112),
        }
    }
}

impl Operator for KickSetupPush {
    fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    fn propose<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a> {
        let meta = &self.meta;
        let beat = bar.last_beat().offset(EIGHTH);
        Box::new(std::iter::once(Ok(OnsetCandidate::new(
            &meta.id,
            bar,
            meta.role.clone(),
            beat,
            Strength::Pickup,
            meta.score_at(bar, 1.0),
            meta.velocity_at(bar, beat, seed),
            FillRole::Setup,
        ))))
    }
}

#[derive(Debug)]
pub struct SnareFill {
    meta: OperatorMeta,
    ramp: VelocityRange,
}

impl Default for SnareFill {
    fn default() -> Self {
        SnareFill {
            meta: OperatorMeta::new("snare-fill", Role::Snare, OperatorFamily::PhrasePunctuation)
                .gate(
                    Gate::default()
                        .energy(0.0, TOM_FILL_ENERGY - 0.01)
                        .fill_window(FillWindowRule::Required),
                )
                .shaping(ScoreShaping::base(0.75).phrase_end(0.2).energy(0.3)),
            ramp: VelocityRange::new(55, 112),
        }
    }
}

impl Operator for SnareFill {
    fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    fn propose<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a> {
        let meta = &self.meta;
        let span = if bar.energy_level < 0.3 { 1 } else { 2 };
        let positions = fill_positions(bar, span);
        let len = positions.len();
        let keep_body = 0.55 + bar.energy_level * 0.5;
        Box::new(
            positions
                .into_iter()
                .enumerate()
                .filter(move |&(i, beat)| {
                    fill_role_at(i, len) != FillRole::FillBody || meta.coin(bar, beat, seed) < keep_body
                })
                .map(move |(i, beat)| {
                    let role = fill_role_at(i, len);
                    let t = if len > 1 { i as f64 / (len - 1) as f64 } else { 1.0 };
                    let velocity = self.ramp.ramp(t, meta.hash(bar, beat, seed), 4);
                    let weight = if role == FillRole::FillBody { 0.85 } else { 1.0 };
                    let candidate = OnsetCandidate::new(
                        &meta.id,
                        bar,
                        meta.role.clone(),
                        beat,
                        Strength::classify(beat, bar),
                        meta.score_at(bar, weight),
                        velocity,
                        role,
                    )
                    .with_tag("fill");
                    Ok(if role == FillRole::FillEnd {
                        candidate.with_articulation(Articulation::Flam)
                    } else {
                        candidate
                    })
                }),
        )
    }
}

/// One tom's share of a descending tom fill.
#[derive(Debug)]
pub struct TomFill {
    meta: OperatorMeta,
    /// Which slice of the fill this tom plays, 0-based.
    segment: usize,
    segments: usize,
    span_beats: u32,
    ramp: VelocityRange,
}

impl TomFill {
    pub fn new(id: &str, role: Role, segment: usize, segments: usize) -> Self {
        TomFill {
            meta: OperatorMeta::new(id, role, OperatorFamily::PhrasePunctuation)
                .gate(
                    Gate::default()
                        .energy(TOM_FILL_ENERGY, 1.0)
                        .fill_window(FillWindowRule::Required),
                )
                .shaping(ScoreShaping::base(0.8).phrase_end(0.2).energy(0.2)),
            segment,
            segments,
            span_beats: 2,
            ramp: VelocityRange::new(78, 120),
        }
    }

    pub fn high() -> Self {
        TomFill::new("tom-fill-high", Role::HighTom, 0, 3)
    }

    pub fn mid() -> Self {
        TomFill::new("tom-fill-mid", Role::MidTom, 1, 3)
    }

    pub fn floor() -> Self {
        TomFill::new("tom-fill-floor", Role::FloorTom, 2, 3)
    }
}

impl Operator for TomFill {
    fn meta(&self) -> &OperatorMeta {
        &self.meta
    }

    fn propose<'a>(&'a self, bar: &'a Bar, seed: u64) -> CandidateStream<'a> {
        if self.segment >= self.segments {
            return Box::new(std::iter::once(Err(OperatorError::Unplaceable(format!(
                "segment {} of a {}-part tom fill",
                self.segment, self.segments
            )))));
        }
        let meta = &self.meta;
        let positions = fill_positions(bar, self.span_beats);
        let len = positions.len();
        let from = self.segment * len / self.segments;
        let to = (self.segment + 1) * len / self.segments;
        Box::new(
            positions
                .into_iter()
                .enumerate()
                .skip(from)
                .take(to.saturating_sub(from))
                .map(move |(i, beat)| {
                    let role = fill_role_at(i, len);
                    let t = if len > 1 { i as f64 / (len - 1) as f64 } else { 1.0 };
                    Ok(OnsetCandidate::new(
                        &meta.id,
                        bar,
                        meta.role.clone(),
                        beat,
                        Strength::classify(beat, bar),
                        meta.score_at(bar, 1.0),
                        self.ramp.ramp(t, meta.hash(bar, beat, seed), 5),
                        role,
                    )
                    .with_tag("fill")
                    .with_tag(TAG_SUBSTITUTE))
                }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(op: &dyn Operator, bar: &Bar) -> Vec<OnsetCandidate> {
        op.generate_candidates(bar, bar.seed).map(|c| c.unwrap()).collect()
    }

    fn fill_bar(energy: f64) -> Bar {
        Bar::new(8, 4, 4242).with_energy(energy).with_fill_window(true)
    }

    #[test]
    fn crash_only_on_section_start() {
        let start = Bar::new(9, 4, 1).with_section_boundary(true);
        let middle = Bar::new(10, 4, 1);
        let c = collect(&CrashSectionStart::default(), &start);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].onset_beat, Beat::DOWNBEAT);
        assert!(c[0].is_protected());
        assert!(collect(&CrashSectionStart::default(), &middle).is_empty());
    }

    #[test]
    fn setup_push_only_at_phrase_end() {
        let last = Bar::new(8, 4, 1).with_bars_until_section_end(1);
        let early = Bar::new(6, 4, 1).with_bars_until_section_end(3);
        let c = collect(&KickSetupPush::default(), &last);
        assert_eq!(c[0].fill_role, FillRole::Setup);
        assert_eq!(c[0].onset_beat, Beat::at(4, EIGHTH));
        assert!(collect(&KickSetupPush::default(), &early).is_empty());
    }

    #[test]
    fn snare_fill_ends_protected_and_crescendos() {
        let c = collect(&SnareFill::default(), &fill_bar(0.5));
        let first = c.first().unwrap();
        let last = c.last().unwrap();
        assert_eq!(first.fill_role, FillRole::FillStart);
        assert_eq!(first.onset_beat, Beat::whole(3));
        assert_eq!(last.fill_role, FillRole::FillEnd);
        assert_eq!(last.onset_beat, Beat::at(4, 3 * SIXTEENTH));
        assert!(last.is_protected());
        assert!(last.velocity_hint > first.velocity_hint);
        assert_eq!(c.iter().filter(|c| c.is_protected()).count(), 1);
    }

    #[test]
    fn snare_fill_needs_fill_window_and_low_energy() {
        assert!(collect(&SnareFill::default(), &Bar::new(8, 4, 1)).is_empty());
        assert!(collect(&SnareFill::default(), &fill_bar(0.8)).is_empty());
    }

    #[test]
    fn short_fill_at_low_energy() {
        let c = collect(&SnareFill::default(), &fill_bar(0.1));
        assert!(c.iter().all(|c| c.onset_beat >= Beat::whole(4)));
    }

    #[test]
    fn tom_segments_tile_the_fill() {
        let bar = fill_bar(0.8);
        let high = collect(&TomFill::high(), &bar);
        let mid = collect(&TomFill::mid(), &bar);
        let floor = collect(&TomFill::floor(), &bar);
        assert_eq!(high.len() + mid.len() + floor.len(), 8);
        assert_eq!(high[0].fill_role, FillRole::FillStart);
        assert!(high.last().unwrap().onset_beat < mid[0].onset_beat);
        assert!(mid.last().unwrap().onset_beat < floor[0].onset_beat);
        assert_eq!(floor.last().unwrap().fill_role, FillRole::FillEnd);
        assert!(floor.last().unwrap().is_protected());
    }

    #[test]
    fn misconfigured_tom_fill_reports_error() {
        let broken = TomFill::new("tom-fill-broken", Role::HighTom, 3, 3);
        let items: Vec<_> = broken.generate_candidates(&fill_bar(0.8), 1).collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(OperatorError::Unplaceable(_))));
    }
}
