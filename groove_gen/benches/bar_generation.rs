// Benchmarks for bar and song generation.
//
// Run:
// - cargo bench -p groove_gen

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use groove_gen::bar::{Bar, SectionType};
use groove_gen::config::GrooveConfig;
use groove_gen::pipeline::GrooveGenerator;
use groove_gen::preset::GroovePreset;
use groove_gen::song::SongPlan;
use std::hint::black_box;

const ENERGIES: [f64; 3] = [0.2, 0.5, 0.9];

fn bench_bar(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_bar");
    for preset in GroovePreset::ALL {
        let generator = GrooveGenerator::new(GrooveConfig::default())
            .expect("default config")
            .with_preset(preset);
        for energy in ENERGIES {
            let bar = Bar::new(8, 4, 0xdead_beef)
                .with_section(SectionType::Chorus)
                .with_energy(energy)
                .with_fill_window(true);
            let id = BenchmarkId::new(preset.name(), format!("energy={energy}"));
            group.bench_with_input(id, &bar, |b, bar| {
                b.iter(|| generator.generate_bar(black_box(bar)).expect("bar"));
            });
        }
    }
    group.finish();
}

fn bench_song(c: &mut Criterion) {
    let generator = GrooveGenerator::new(GrooveConfig::default()).expect("default config");
    let mut group = c.benchmark_group("generate_song");
    group.sample_size(20);
    for bars_per_section in [4, 16] {
        let plan = SongPlan::standard(bars_per_section, 42);
        group.bench_with_input(BenchmarkId::from_parameter(plan.total_bars()), &plan, |b, plan| {
            b.iter(|| generator.generate_song(black_box(plan)).expect("song"));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_bar, bench_song);
criterion_main!(benches);
