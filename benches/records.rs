//! Criterion benchmarks for batch ingestion.
//!
//! Run with:
//!   cargo bench
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use mmr_watch::protocol::{Batch, TrainingEpoch, TrainingMessage};
use mmr_watch::record::{biggest_miss_index, build_records};
use mmr_watch::store::ViewState;

fn make_batch(games: usize, players: usize, epoch: f64) -> Batch {
    let row = |g: usize, offset: f64| -> Vec<f64> {
        (0..players)
            .map(|p| 1000.0 + ((g * 31 + p * 17) % 700) as f64 + offset)
            .collect()
    };
    Batch {
        epoch,
        uuids: (0..games).map(|g| format!("game-{:06}", g)).collect(),
        tracker_suffixes: (0..games)
            .map(|g| (0..players).map(|p| format!("steam/{}{}", g, p)).collect())
            .collect(),
        y: (0..games).map(|g| row(g, 0.0)).collect(),
        y_pred: (0..games).map(|g| row(g + 3, 25.0)).collect(),
        mask: (0..games)
            .map(|g| (0..players).map(|p| if (g + p) % 7 == 0 { 0.0 } else { 1.0 }).collect())
            .collect(),
        y_loss: (0..games)
            .map(|g| (0..players).map(|p| ((g + p) % 11) as f64 * 0.01).collect())
            .collect(),
    }
}

fn bench_build_records(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_records");

    for games in [32usize, 256, 2048].iter() {
        group.throughput(Throughput::Elements(*games as u64));
        let batch = make_batch(*games, 6, 1.0);
        group.bench_with_input(BenchmarkId::from_parameter(games), &batch, |b, batch| {
            b.iter(|| black_box(build_records(batch).map(|r| r.records.len())))
        });
    }

    group.finish();
}

fn bench_biggest_miss(c: &mut Criterion) {
    let y: Vec<f64> = (0..64).map(|i| 1000.0 + i as f64).collect();
    let y_pred: Vec<f64> = (0..64).map(|i| 1000.0 + ((i * 37) % 64) as f64).collect();
    let mask = vec![1.0; 64];
    c.bench_function("biggest_miss_64", |b| {
        b.iter(|| black_box(biggest_miss_index(&y, &y_pred, &mask)))
    });
}

fn bench_epoch_ingest(c: &mut Criterion) {
    c.bench_function("apply_epoch_256x6", |b| {
        let mut state = ViewState::default();
        let mut epoch = 0.0;
        b.iter(|| {
            epoch += 1.0;
            let msg = TrainingMessage::TrainingEpoch(TrainingEpoch {
                loss: 1.0 / epoch,
                batch: make_batch(256, 6, epoch),
            });
            black_box(state.apply(msg))
        });
    });
}

criterion_group!(benches, bench_build_records, bench_biggest_miss, bench_epoch_ingest);
criterion_main!(benches);
