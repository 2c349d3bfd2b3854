// Onset-to-event conversion.
//
// Turns final `GrooveOnset`s (bar, beat, role) into absolute-time note
// events the MIDI writer consumes. Absolute time is
//
//   tick = (bar - 1) * beats_per_bar * tpb + (beat - 1) * tpb + timing_offset
//
// clamped at 0 (a lay-back on the very first downbeat cannot go negative).
// `Beat` is fixed point, so `(beat - 1) * tpb` is `units * tpb / 480`,
// rounded to nearest.
//
// `DrumKit` maps roles to General MIDI percussion notes, with a few
// articulation overrides (cross-stick, ride bell, open hat). Flams and
// drags add soft grace notes just ahead of the main stroke.

use crate::bar::{Articulation, BEAT_DIVISIONS, Beat, Role};
use crate::onset::GrooveOnset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tick resolution and meter for absolute-time conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTiming {
    pub ticks_per_beat: u32,
    pub beats_per_bar: u32,
}

impl EventTiming {
    pub fn new(ticks_per_beat: u32, beats_per_bar: u32) -> Self {
        EventTiming {
            ticks_per_beat: ticks_per_beat.max(1),
            beats_per_bar: beats_per_bar.max(1),
        }
    }

    /// Start of `bar_number` (1-based) in ticks.
    pub fn bar_start(&self, bar_number: u32) -> i64 {
        bar_number.saturating_sub(1) as i64 * self.beats_per_bar as i64 * self.ticks_per_beat as i64
    }

    /// Offset of `beat` from the start of its bar, in ticks.
    pub fn beat_offset(&self, beat: Beat) -> i64 {
        let scaled = beat.units() * self.ticks_per_beat as i64;
        // Round half away from zero.
        let half = BEAT_DIVISIONS / 2;
        if scaled >= 0 {
            (scaled + half) / BEAT_DIVISIONS
        } else {
            (scaled - half) / BEAT_DIVISIONS
        }
    }

    /// Absolute tick of a position plus a signed offset, clamped at 0.
    pub fn absolute_tick(&self, bar_number: u32, beat: Beat, offset_ticks: i32) -> u64 {
        let tick = self.bar_start(bar_number) + self.beat_offset(beat) + offset_ticks as i64;
        tick.max(0) as u64
    }

    pub fn onset_tick(&self, onset: &GrooveOnset) -> u64 {
        self.absolute_tick(onset.bar_number, onset.beat, onset.timing_offset_ticks)
    }

    /// Sort by absolute tick; ties by role, then candidate id.
    pub fn sort_onsets(&self, onsets: &mut [GrooveOnset]) {
        onsets.sort_by_cached_key(|o| (self.onset_tick(o), o.role.clone(), o.candidate_id().to_string()));
    }
}

// ---------------------------------------------------------------------------
// Drum kit
// ---------------------------------------------------------------------------

/// Role to General MIDI percussion note (channel 10).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrumKit {
    pub notes: BTreeMap<Role, u8>,
    /// Note for roles not in `notes`. `None` skips them.
    pub fallback: Option<u8>,
}

impl DrumKit {
    pub fn general_midi() -> Self {
        DrumKit {
            notes: [
                (Role::Kick, 36),
                (Role::Snare, 38),
                (Role::ClosedHat, 42),
                (Role::PedalHat, 44),
                (Role::OpenHat, 46),
                (Role::Ride, 51),
                (Role::Crash, 49),
                (Role::HighTom, 50),
                (Role::MidTom, 47),
                (Role::FloorTom, 43),
            ]
            .into_iter()
            .collect(),
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, note: u8) -> Self {
        self.fallback = Some(note.min(127));
        self
    }

    /// Note for `role` played with `articulation`.
    pub fn note_for(&self, role: &Role, articulation: Option<Articulation>) -> Option<u8> {
        let base = self.notes.get(role).copied().or(self.fallback)?;
        let note = match (role, articulation) {
            (Role::Snare, Some(Articulation::CrossStick)) => 37,
            (Role::Snare, Some(Articulation::Rimshot)) => 40,
            (Role::Ride, Some(Articulation::Bell)) => 53,
            (Role::ClosedHat, Some(Articulation::OpenHat)) => 46,
            _ => base,
        };
        Some(note)
    }
}

impl Default for DrumKit {
    fn default() -> Self {
        DrumKit::general_midi()
    }
}

// ---------------------------------------------------------------------------
// Note events
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub tick: u64,
    pub role: Role,
    pub note: u8,
    pub velocity: u8,
    pub duration_ticks: u32,
    /// Candidate id of the onset this came from. Grace notes share it.
    pub source: String,
    pub is_grace: bool,
}

/// Convert onsets to note events ordered by tick, then role, then note.
/// Onsets whose role has no note in `kit` are skipped.
pub fn onsets_to_events(onsets: &[GrooveOnset], timing: &EventTiming, kit: &DrumKit) -> Vec<NoteEvent> {
    let duration = (timing.ticks_per_beat / 8).max(1);
    let grace_gap = (timing.ticks_per_beat / 32).max(1) as u64;
    let mut events = Vec::with_capacity(onsets.len());

    for onset in onsets {
        let Some(note) = kit.note_for(&onset.role, onset.articulation) else {
            continue;
        };
        let tick = timing.onset_tick(onset);
        let graces = match onset.articulation {
            Some(Articulation::Flam) => 1,
            Some(Articulation::Drag) => 2,
            _ => 0,
        };
        for g in (1..=graces).rev() {
            events.push(NoteEvent {
                tick: tick.saturating_sub(grace_gap * g),
                role: onset.role.clone(),
                note,
                velocity: (onset.velocity / 2).max(1),
                duration_ticks: grace_gap as u32,
                source: onset.candidate_id().to_string(),
                is_grace: true,
            });
        }
        events.push(NoteEvent {
            tick,
            role: onset.role.clone(),
            note,
            velocity: onset.velocity.clamp(1, 127),
            duration_ticks: duration,
            source: onset.candidate_id().to_string(),
            is_grace: false,
        });
    }

    events.sort_by(|a, b| {
        a.tick
            .cmp(&b.tick)
            .then_with(|| a.role.cmp(&b.role))
            .then_with(|| a.note.cmp(&b.note))
            .then_with(|| b.is_grace.cmp(&a.is_grace))
    });
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::{Bar, EIGHTH, TRIPLET};

    fn onset(bar: u32, role: Role, beat: Beat, offset: i32) -> GrooveOnset {
        let mut o = GrooveOnset::anchor(&Bar::new(bar, 4, 0), role, beat, 100);
        o.timing_offset_ticks = offset;
        o
    }

    #[test]
    fn absolute_ticks() {
        let timing = EventTiming::new(480, 4);
        assert_eq!(timing.absolute_tick(1, Beat::DOWNBEAT, 0), 0);
        assert_eq!(timing.absolute_tick(1, Beat::whole(2), 0), 480);
        assert_eq!(timing.absolute_tick(3, Beat::at(2, EIGHTH), 6), 2 * 1920 + 480 + 240 + 6);
        assert_eq!(timing.absolute_tick(1, Beat::DOWNBEAT, -12), 0);
    }

    #[test]
    fn ticks_rescale_to_other_resolutions() {
        let timing = EventTiming::new(96, 3);
        assert_eq!(timing.absolute_tick(2, Beat::at(1, TRIPLET), 0), 3 * 96 + 32);
        assert_eq!(timing.absolute_tick(2, Beat::at(1, EIGHTH), 0), 3 * 96 + 48);
    }

    #[test]
    fn events_are_time_ordered() {
        let timing = EventTiming::new(480, 4);
        let onsets = vec![
            onset(2, Role::Snare, Beat::whole(2), 0),
            onset(1, Role::ClosedHat, Beat::DOWNBEAT, 0),
            onset(1, Role::Kick, Beat::DOWNBEAT, 0),
            onset(1, Role::Snare, Beat::whole(2), -10),
        ];
        let events = onsets_to_events(&onsets, &timing, &DrumKit::general_midi());
        let notes: Vec<(u64, u8)> = events.iter().map(|e| (e.tick, e.note)).collect();
        assert_eq!(notes, vec![(0, 36), (0, 42), (470, 38), (2400, 38)]);
    }

    #[test]
    fn sort_follows_ticks_not_grid_position() {
        let timing = EventTiming::new(480, 4);
        let late_snare = onset(8, Role::Snare, Beat::at(3, 360), 3);
        let tom = onset(8, Role::HighTom, Beat::at(3, 360), 0);
        let pushed = onset(9, Role::Kick, Beat::DOWNBEAT, -20);
        let last_hat = onset(8, Role::ClosedHat, Beat::at(4, 360), 0);
        let mut onsets = vec![pushed.clone(), late_snare.clone(), last_hat.clone(), tom.clone()];
        timing.sort_onsets(&mut onsets);
        assert_eq!(onsets, vec![tom, late_snare, last_hat, pushed]);
    }

    #[test]
    fn articulations_change_notes_and_add_graces() {
        let timing = EventTiming::new(480, 4);
        let kit = DrumKit::general_midi();
        assert_eq!(kit.note_for(&Role::Ride, Some(Articulation::Bell)), Some(53));
        assert_eq!(kit.note_for(&Role::Snare, Some(Articulation::CrossStick)), Some(37));
        assert_eq!(kit.note_for(&Role::Kick, Some(Articulation::Bell)), Some(36));

        let flam = onset(1, Role::Snare, Beat::whole(4), 0).with_articulation(Articulation::Flam);
        let events = onsets_to_events(&[flam], &timing, &kit);
        assert_eq!(events.len(), 2);
        assert!(events[0].is_grace);
        assert_eq!(events[0].tick, 1440 - 15);
        assert_eq!(events[0].velocity, 50);
        assert_eq!(events[1].tick, 1440);
    }

    #[test]
    fn custom_roles_use_fallback_or_skip() {
        let timing = EventTiming::new(480, 4);
        let clap = vec![onset(1, Role::Custom("Clap".into()), Beat::whole(2), 0)];
        assert!(onsets_to_events(&clap, &timing, &DrumKit::general_midi()).is_empty());
        let events = onsets_to_events(&clap, &timing, &DrumKit::general_midi().with_fallback(39));
        assert_eq!(events[0].note, 39);
    }
}
