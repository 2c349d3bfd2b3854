// Groove generator: deterministic per-bar drum rhythm generation.
//
// Given a bar's musical context (meter, section, energy, active roles,
// seed), a preset's anchor onsets and a density target per role, the
// generator asks a registry of operators for candidate onsets, picks the
// best of them up to the target, and makes the result playable by one
// drummer with four limbs.
//
// Architecture:
// - bar.rs: Bar context, fixed-point beat positions, roles, strengths
// - candidate.rs: Operator proposals and per-family candidate groups
// - operator/: The `Operator` trait and the four operator families
//   (micro additions, subdivision transforms, pattern substitutions,
//   phrase punctuation)
// - registry.rs: The closed, ordered operator set
// - collection.rs: Running operators with per-operator failure isolation
// - selection.rs: Score-ranked selection up to the density target
// - onset.rs: Final onsets with provenance, anchor merge
// - physicality/: Limb model, sticking rules, overcrowding and limb-conflict
//   filtering
// - density.rs, preset.rs, song.rs: Stock density targets, anchor presets
//   and song plans feeding the pipeline
// - pipeline.rs: `GrooveGenerator`, the role -> bar -> song driver
// - events.rs: Onsets to absolute-tick note events
// - midi.rs: Standard MIDI File output
// - config.rs, error.rs: Configuration and the crate error type
//
// All randomness is hash-derived from (bar, beat, seed, salt) via
// `groove_prng`, so the same inputs give bit-identical output.

pub mod bar;
pub mod candidate;
pub mod collection;
pub mod config;
pub mod density;
pub mod error;
pub mod events;
pub mod midi;
pub mod onset;
pub mod operator;
pub mod physicality;
pub mod pipeline;
pub mod preset;
pub mod registry;
pub mod selection;
pub mod song;

pub use error::{GrooveError, OperatorError, Result};
pub use pipeline::{BarResult, GrooveGenerator, RoleResult, SongResult};
