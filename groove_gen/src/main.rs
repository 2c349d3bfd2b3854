// Groove generator CLI entry point.
//
// Plans a verse/chorus/bridge/chorus song, generates every bar, logs the
// diagnostics and writes a General MIDI drum track.
//
// Usage:
//   cargo run -p groove_gen --bin generate -- [output.mid] [--bars-per-section N]
//     [--seed N] [--preset NAME] [--tempo BPM] [--config PATH]
//     [--left-handed] [--strict]
//
// Presets: rock, half-time, four-on-floor
//
// Logging goes to stderr; set RUST_LOG (e.g. `RUST_LOG=groove_gen=debug`)
// to see per-operator detail.

use groove_gen::config::{FailurePolicy, GrooveConfig, Handedness};
use groove_gen::events::{DrumKit, EventTiming, onsets_to_events};
use groove_gen::midi::{MidiSettings, write_midi};
use groove_gen::pipeline::GrooveGenerator;
use groove_gen::preset::GroovePreset;
use groove_gen::song::SongPlan;
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

fn main() {
    init_logging();
    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = run(&args) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> groove_gen::Result<()> {
    let output_path = args
        .get(1)
        .filter(|s| !s.starts_with("--"))
        .map(|s| s.as_str())
        .unwrap_or("groove.mid");
    let bars_per_section: u32 = parse_flag(args, "--bars-per-section").unwrap_or(4);
    let seed: u64 = parse_flag(args, "--seed").unwrap_or(1);
    let preset_name: String = parse_flag(args, "--preset").unwrap_or_else(|| "rock".to_string());
    let config_path: Option<String> = parse_flag(args, "--config");

    let mut config = match &config_path {
        Some(path) => GrooveConfig::load(Path::new(path))?,
        None => GrooveConfig::default(),
    };
    if let Some(tempo) = parse_flag(args, "--tempo") {
        config.tempo_bpm = tempo;
    }
    if has_flag(args, "--left-handed") {
        config.handedness = Handedness::Left;
    }
    if has_flag(args, "--strict") {
        config.failure_policy = FailurePolicy::Strict;
    }

    let preset = GroovePreset::parse(&preset_name).unwrap_or_else(|| {
        warn!(preset = %preset_name, "unknown preset, using rock");
        GroovePreset::Rock
    });

    info!(
        output = output_path,
        seed,
        bars_per_section,
        preset = preset.name(),
        tempo = config.tempo_bpm,
        handedness = ?config.handedness,
        "generating"
    );

    let generator = GrooveGenerator::new(config)?.with_preset(preset);
    let plan = SongPlan::standard(bars_per_section, seed);
    let song = generator.generate_song(&plan)?;

    for violation in &song.violations {
        warn!(%violation, "sticking");
    }
    let failures: usize = song
        .bars
        .iter()
        .map(|b| b.collection_diagnostics().failures.len())
        .sum();
    let pruned: usize = song
        .bars
        .iter()
        .flat_map(|b| &b.roles)
        .map(|r| r.pruned.len())
        .sum();

    let config = generator.config();
    let timing = EventTiming::new(config.ticks_per_beat, plan.beats_per_bar);
    let events = onsets_to_events(&song.onsets(), &timing, &DrumKit::general_midi());
    let settings = MidiSettings {
        ticks_per_beat: config.ticks_per_beat,
        tempo_bpm: config.tempo_bpm,
        beats_per_bar: plan.beats_per_bar,
    };
    write_midi(&events, &settings, Path::new(output_path))?;

    let seconds = plan.total_bars() as f64 * plan.beats_per_bar as f64 * 60.0 / config.tempo_bpm as f64;
    info!(
        bars = plan.total_bars(),
        onsets = song.onset_count(),
        events = events.len(),
        pruned,
        operator_failures = failures,
        violations = song.violations.len(),
        duration_secs = seconds.round(),
        "wrote {output_path}"
    );
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}
