use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use dinerdb::{run_trial, IsolationLevel, MenuStore, Scenario, TrialSpec};

const CONTENTION_LEVELS: &[usize] = &[1, 4, 8];

fn bench_data_dir() -> PathBuf {
    PathBuf::from("target/bench-data-contention")
}

fn seeded_store() -> MenuStore {
    let store = MenuStore::new();
    store.insert_item(1, "Cheeseburger", 8.5);
    store
}

fn write_lock_stats(store: &MenuStore, label: &str) {
    let path = bench_data_dir().join(format!("lock-stats-{label}.json"));
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if let Ok(bytes) = serde_json::to_vec_pretty(&store.lock_stats()) {
        let _ = fs::write(path, bytes);
    }
}

async fn run_trial_batch(
    store: &MenuStore,
    scenario: Scenario,
    isolation: IsolationLevel,
    pairs: usize,
) {
    let mut tasks = Vec::with_capacity(pairs * 2);
    for _ in 0..pairs * 2 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let spec = TrialSpec::new(scenario, 1).with_isolation(isolation);
            // Concurrency-control failures come back as failed reports, so
            // the batch keeps its shape under contention.
            let _ = run_trial(&store, spec).await.expect("trial run failed");
        }));
    }
    for task in tasks {
        task.await.expect("trial task panicked");
    }
}

fn bench_single_trial_by_isolation(c: &mut Criterion) {
    let rt = Runtime::new().expect("failed to build runtime");
    let mut group = c.benchmark_group("single_trial");
    group.sample_size(20);

    for isolation in IsolationLevel::ALL {
        let store = seeded_store();
        group.bench_with_input(
            BenchmarkId::from_parameter(isolation),
            &isolation,
            |b, &isolation| {
                let spec =
                    TrialSpec::new(Scenario::NonRepeatableRead, 1).with_isolation(isolation);
                b.iter(|| {
                    let _ = rt.block_on(run_trial(&store, spec)).expect("trial run failed");
                });
            },
        );
    }

    group.finish();
}

fn bench_contended_lost_update(c: &mut Criterion) {
    let _ = fs::remove_dir_all(bench_data_dir());
    let rt = Runtime::new().expect("failed to build runtime");
    let mut group = c.benchmark_group("contended_lost_update");
    group.sample_size(10);
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(6));

    for &pairs in CONTENTION_LEVELS {
        let store = seeded_store();
        group.throughput(Throughput::Elements((pairs * 2) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("p{pairs}")),
            &pairs,
            |b, &pairs| {
                b.iter(|| {
                    rt.block_on(run_trial_batch(
                        &store,
                        Scenario::LostUpdate,
                        IsolationLevel::ReadCommitted,
                        pairs,
                    ))
                });
            },
        );
        write_lock_stats(&store, &format!("lost_update_p{pairs}"));
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_trial_by_isolation,
    bench_contended_lost_update
);
criterion_main!(benches);
