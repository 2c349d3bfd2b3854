// MIDI output from note events.
//
// Writes a Standard MIDI File, Format 1: track 0 carries tempo and time
// signature, track 1 carries every drum hit on channel 10 (index 9, the
// General MIDI percussion channel). Note-offs are emitted explicitly so
// the file plays the same in sequencers that ignore percussion duration.
//
// Uses the `midly` crate for MIDI writing.

use crate::error::{GrooveError, Result};
use crate::events::NoteEvent;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

/// General MIDI percussion channel (10, zero-based 9).
const DRUM_CHANNEL: u8 = 9;

/// Largest delta a single track event can carry.
const MAX_DELTA: u64 = (1 << 28) - 1;

/// Header and tempo information for a drum file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiSettings {
    pub ticks_per_beat: u32,
    pub tempo_bpm: u16,
    pub beats_per_bar: u32,
}

/// Convert events to MIDI and write to a file.
pub fn write_midi(events: &[NoteEvent], settings: &MidiSettings, path: &Path) -> Result<()> {
    let bytes = events_to_bytes(events, settings)?;
    std::fs::write(path, &bytes)?;
    Ok(())
}

/// Serialize events to an in-memory SMF.
pub fn events_to_bytes(events: &[NoteEvent], settings: &MidiSettings) -> Result<Vec<u8>> {
    let smf = events_to_smf(events, settings)?;
    let mut buf = Vec::new();
    smf.write_std(&mut buf).map_err(|e| GrooveError::Midi(e.to_string()))?;
    Ok(buf)
}

fn events_to_smf(events: &[NoteEvent], settings: &MidiSettings) -> Result<Smf<'static>> {
    let tpb = u16::try_from(settings.ticks_per_beat)
        .ok()
        .filter(|&t| t > 0 && t <= 0x7fff)
        .ok_or_else(|| GrooveError::Midi(format!("ticks per beat {} out of range", settings.ticks_per_beat)))?;
    if settings.tempo_bpm == 0 {
        return Err(GrooveError::Midi("tempo must be positive".into()));
    }

    let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::new(tpb))));

    // Track 0: tempo and meter
    let tempo_microseconds = 60_000_000 / settings.tempo_bpm as u32;
    let numerator = u8::try_from(settings.beats_per_bar).unwrap_or(4).max(1);
    let tempo_track: Track<'static> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, 2, 24, 8)),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ];
    smf.tracks.push(tempo_track);

    // Track 1: drums. Build (tick, is_on, key, vel) then sort so note-offs
    // at a tick precede note-ons at the same tick.
    let mut timeline: Vec<(u64, bool, u8, u8)> = Vec::with_capacity(events.len() * 2);
    for event in events {
        let key = event.note.min(127);
        timeline.push((event.tick, true, key, event.velocity.clamp(1, 127)));
        timeline.push((event.tick + event.duration_ticks.max(1) as u64, false, key, 0));
    }
    timeline.sort_by_key(|&(tick, is_on, key, _)| (tick, is_on, key));

    let channel = u4::new(DRUM_CHANNEL);
    let mut track: Track<'static> = vec![TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(b"Drums")),
    }];
    let mut last_tick = 0u64;
    for (tick, is_on, key, vel) in timeline {
        let delta = tick - last_tick;
        if delta > MAX_DELTA {
            return Err(GrooveError::Midi(format!("gap of {delta} ticks exceeds the SMF delta limit")));
        }
        let message = if is_on {
            MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            }
        };
        track.push(TrackEvent {
            delta: u28::new(delta as u32),
            kind: TrackEventKind::Midi { channel, message },
        });
        last_tick = tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    Ok(smf)
}
